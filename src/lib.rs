//! netpulse: internet connectivity and throughput monitor.
//!
//! [`monitor::NetworkMonitor`] is the entry point. It runs connectivity
//! checks and speed tests over a [`network::Transport`], gates them through
//! a single status state machine and reports to a
//! [`status::MonitorListener`].

pub mod checks;
pub mod config;
pub mod errors;
pub mod measurements;
pub mod monitor;
pub mod network;
pub mod output;
pub mod platform;
pub mod results;
pub mod status;
