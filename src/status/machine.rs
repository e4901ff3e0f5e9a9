//! Status state machine.
//!
//! Holds the single piece of mutable monitor state: the current status,
//! the two in-flight flags gating re-entrancy, and the figures shown
//! alongside the status. Transitions are plain synchronous methods; the
//! caller owns the timing (settling delays) and the event delivery.

use super::events::{Status, StatusEvent};
use crate::checks::connectivity::ProbeResult;
use crate::checks::engine::SpeedTestReport;
use crate::errors::{Activity, ProbeError};
use chrono::{DateTime, Local};
use log::debug;
use std::time::Duration;

pub(crate) const READY: &str = "Ready to check";
pub(crate) const CHECKING: &str = "Checking connection...";
pub(crate) const CONNECTED: &str = "Connected to internet";
pub(crate) const NO_CONNECTION: &str = "No internet connection";
pub(crate) const TESTING: &str = "Running speed test...";
pub(crate) const TEST_COMPLETE: &str = "Speed test complete";
pub(crate) const TEST_FAILED: &str = "Speed test failed";
pub(crate) const RESTORED: &str = "Connection restored";
pub(crate) const LOST: &str = "Connection lost";

#[derive(Debug, Clone)]
pub struct StatusMachine {
    current: StatusEvent,
    is_checking: bool,
    is_speed_testing: bool,
    /// Round trip of the last successful check
    last_rtt: Option<Duration>,
    /// When the last check or external notification landed
    last_check: Option<DateTime<Local>>,
}

impl StatusMachine {
    /// Create the machine from the platform's link state.
    pub fn new(online: bool) -> Self {
        let current = if online {
            StatusEvent::new(Status::Idle, READY)
        } else {
            StatusEvent::new(Status::Disconnected, NO_CONNECTION)
        };

        Self {
            current,
            is_checking: false,
            is_speed_testing: false,
            last_rtt: None,
            last_check: None,
        }
    }

    pub fn current(&self) -> &StatusEvent {
        &self.current
    }

    pub fn status(&self) -> Status {
        self.current.status
    }

    pub fn is_checking(&self) -> bool {
        self.is_checking
    }

    pub fn is_speed_testing(&self) -> bool {
        self.is_speed_testing
    }

    /// True while either lock is held.
    pub fn is_locked(&self) -> bool {
        self.is_checking || self.is_speed_testing
    }

    pub fn last_rtt(&self) -> Option<Duration> {
        self.last_rtt
    }

    pub fn last_check(&self) -> Option<DateTime<Local>> {
        self.last_check
    }

    /// Take the check lock and enter `Checking`.
    pub fn begin_check(&mut self) -> Result<StatusEvent, ProbeError> {
        self.ensure_unlocked()?;
        self.is_checking = true;
        Ok(self.transition(Status::Checking, CHECKING))
    }

    /// Record a probe outcome. The lock stays held until [`release`].
    ///
    /// [`release`]: StatusMachine::release
    pub fn finish_check(&mut self, result: &ProbeResult) -> StatusEvent {
        self.last_check = Some(Local::now());

        if result.succeeded {
            self.last_rtt = result.elapsed;
            self.transition(Status::Connected, CONNECTED)
        } else {
            self.last_rtt = None;
            self.transition(Status::Disconnected, NO_CONNECTION)
        }
    }

    /// Take the speed-test lock and enter `Testing`.
    pub fn begin_speed_test(&mut self) -> Result<StatusEvent, ProbeError> {
        self.ensure_unlocked()?;
        self.is_speed_testing = true;
        Ok(self.transition(Status::Testing, TESTING))
    }

    /// Record a speed-test outcome. The lock stays held until [`release`].
    ///
    /// [`release`]: StatusMachine::release
    pub fn finish_speed_test(&mut self, report: &SpeedTestReport) -> StatusEvent {
        if report.is_failure() {
            self.transition(Status::Disconnected, TEST_FAILED)
        } else {
            self.transition(Status::Connected, TEST_COMPLETE)
        }
    }

    /// Drop the lock for `activity` and return to `Idle`.
    ///
    /// Returns `None` when that lock was not held.
    pub fn release(&mut self, activity: Activity) -> Option<StatusEvent> {
        let held = match activity {
            Activity::ConnectivityCheck => &mut self.is_checking,
            Activity::SpeedTest => &mut self.is_speed_testing,
        };

        if !*held {
            return None;
        }
        *held = false;

        debug!("Released {} lock", activity);
        Some(self.transition(Status::Idle, READY))
    }

    /// Apply an online/offline notification from the platform.
    ///
    /// Ignored while a measurement is in flight; its own result wins.
    pub fn external(&mut self, online: bool) -> Option<StatusEvent> {
        if self.is_locked() {
            debug!(
                "Ignoring external {} notification while busy",
                if online { "online" } else { "offline" }
            );
            return None;
        }

        self.last_check = Some(Local::now());
        self.last_rtt = None;

        Some(if online {
            self.transition(Status::Connected, RESTORED)
        } else {
            self.transition(Status::Disconnected, LOST)
        })
    }

    fn ensure_unlocked(&self) -> Result<(), ProbeError> {
        let active = if self.is_checking {
            Activity::ConnectivityCheck
        } else if self.is_speed_testing {
            Activity::SpeedTest
        } else {
            return Ok(());
        };

        Err(ProbeError::AlreadyRunning { active })
    }

    fn transition(&mut self, status: Status, detail: &str) -> StatusEvent {
        debug!("Status {} -> {}: {}", self.current.status, status, detail);
        self.current = StatusEvent::new(status, detail);
        self.current.clone()
    }
}
