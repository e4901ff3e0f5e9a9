//! Monitor configuration.

use crate::checks::connectivity::DEFAULT_PROBE_TIMEOUT_MS;
use crate::checks::engine::SpeedTestConfig;
use crate::network::ProbeTarget;

/// Configuration for a [`NetworkMonitor`](crate::monitor::NetworkMonitor).
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Targets tried in order by the connectivity check.
    pub probe_targets: Vec<ProbeTarget>,

    /// Time budget for each probe attempt in ms.
    /// Default: 5000ms
    pub probe_timeout_ms: u64,

    /// Pause after reporting a check result before the next check may
    /// start, in ms.
    /// Default: 1000ms
    pub check_settle_ms: u64,

    /// Speed test settings.
    pub speed: SpeedTestConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_targets: ProbeTarget::defaults(),
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            check_settle_ms: 1000,
            speed: SpeedTestConfig::default(),
        }
    }
}
