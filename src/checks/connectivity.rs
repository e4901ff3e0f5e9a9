//! Reachability probe over an ordered list of targets.

use crate::errors::ProbeError;
use crate::network::{ProbeTarget, Transport, TransportError};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::{timeout, Instant};
use url::Url;

/// Default time budget for a single probe attempt.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5000;

/// Outcome of one probe run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub succeeded: bool,
    /// Time from the start of the probe sequence until the first success
    pub elapsed: Option<Duration>,
    pub failure_reason: Option<String>,
    /// Target that answered
    pub reached: Option<Url>,
    /// Number of targets contacted
    pub attempts: usize,
}

impl ProbeResult {
    pub fn reached(target: &ProbeTarget, elapsed: Duration, attempts: usize) -> Self {
        Self {
            succeeded: true,
            elapsed: Some(elapsed),
            failure_reason: None,
            reached: Some(target.url.clone()),
            attempts,
        }
    }

    pub fn failed(error: &ProbeError, attempts: usize) -> Self {
        Self {
            succeeded: false,
            elapsed: None,
            failure_reason: Some(error.to_string()),
            reached: None,
            attempts,
        }
    }
}

/// Issues lightweight requests against targets until one answers.
pub struct ConnectivityProbe<T> {
    transport: T,
    attempt_timeout: Duration,
}

impl<T: Transport> ConnectivityProbe<T> {
    pub fn new(transport: T, attempt_timeout: Duration) -> Self {
        Self { transport, attempt_timeout }
    }

    /// Probe `targets` in order and stop at the first one that answers.
    ///
    /// The elapsed time is measured from the start of the sequence, so it
    /// includes the time spent on targets that failed before the winner.
    pub async fn probe(&self, targets: &[ProbeTarget]) -> ProbeResult {
        let started = Instant::now();
        info!("Probing connectivity against {} targets", targets.len());

        for (i, target) in targets.iter().enumerate() {
            debug!("Probe {}/{}: {}", i + 1, targets.len(), target);

            match self.attempt(target).await {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    info!(
                        "Reached {} after {:.0} ms",
                        target,
                        elapsed.as_secs_f64() * 1000.0
                    );
                    return ProbeResult::reached(target, elapsed, i + 1);
                }
                Err(e) => {
                    let unreachable = ProbeError::TargetUnreachable {
                        url: target.to_string(),
                        reason: e.message,
                    };
                    warn!("{}", unreachable);
                }
            }
        }

        let error = ProbeError::AllTargetsFailed { attempts: targets.len() };
        warn!("{}", error);

        ProbeResult::failed(&error, targets.len())
    }

    async fn attempt(&self, target: &ProbeTarget) -> Result<(), TransportError> {
        match timeout(self.attempt_timeout, self.transport.probe(&target.url)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::new(
                &target.url,
                format!(
                    "timed out after {} ms",
                    self.attempt_timeout.as_millis()
                ),
            )),
        }
    }
}
