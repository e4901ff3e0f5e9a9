//! Measurement checks run by the monitor.
//!
//! A connectivity probe, the large-transfer throughput sampler, the
//! small-request fallback estimate, and the engine sequencing them into a
//! speed test.

pub mod connectivity;
pub mod engine;
pub mod fallback;
pub mod throughput;

pub use connectivity::{ConnectivityProbe, ProbeResult};
pub use engine::{
    Measurement, SpeedTestConfig, SpeedTestEngine, SpeedTestReport, Strategy,
};
pub use fallback::{FallbackEstimate, FallbackSampler};
pub use throughput::{ThroughputSampler, TransferPhase, TransferUpdate};
