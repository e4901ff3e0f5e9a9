//! Status and monitor event types and the listener interface.
//!
//! Defines what the monitor emits to the view layer and the callback
//! trait for receiving it.

use crate::checks::throughput::TransferPhase;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

/// Connection status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Nothing in flight
    Idle,
    /// Connectivity probe running
    Checking,
    /// Last measurement reached the internet
    Connected,
    /// Last measurement could not reach the internet
    Disconnected,
    /// Speed test running
    Testing,
}

impl Status {
    /// True while a measurement is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, Status::Checking | Status::Testing)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Idle => "idle",
            Status::Checking => "checking",
            Status::Connected => "connected",
            Status::Disconnected => "disconnected",
            Status::Testing => "testing",
        };
        f.write_str(label)
    }
}

/// A status transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub status: Status,
    /// Human readable text accompanying the status
    pub detail: String,
    /// Local time of the transition
    pub at: DateTime<Local>,
}

impl StatusEvent {
    pub fn new(status: Status, detail: impl Into<String>) -> Self {
        Self { status, detail: detail.into(), at: Local::now() }
    }
}

/// Events emitted by the monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// Status changed
    Status(StatusEvent),
    /// Interim or final throughput reading during a speed test
    Progress {
        /// Direction being measured
        phase: TransferPhase,
        /// Speed in Mbps
        mbps: f64,
    },
    /// Transient error message for the user
    Alert(String),
}

/// Callback interface for monitor events.
///
/// Implementations must be non-blocking to avoid affecting
/// measurement accuracy.
pub trait MonitorListener: Send + Sync {
    /// Called when the monitor emits an event.
    fn on_event(&self, event: MonitorEvent);
}

impl MonitorListener for UnboundedSender<MonitorEvent> {
    fn on_event(&self, event: MonitorEvent) {
        // Receiver gone means nobody is watching any more.
        let _ = self.send(event);
    }
}
