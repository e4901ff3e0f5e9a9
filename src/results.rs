//! Result data structures for JSON output.
//!
//! The engine types carry `Duration`s and typed failures; these mirror
//! them in a flat, serializable shape with millisecond figures and a
//! timestamp.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::Duration;

use crate::checks::connectivity::ProbeResult;
use crate::checks::engine::{
    Measurement as EngineMeasurement, SpeedTestReport, Strategy,
};

/// Outcome of a connectivity check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResults {
    /// When the check completed
    pub timestamp: DateTime<Local>,
    /// Whether any target answered
    pub connected: bool,
    /// Time until the first answer, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    /// Target that answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reached: Option<String>,
    /// Number of targets contacted
    pub attempts: usize,
    /// Why the check failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResults {
    /// Create CheckResults from a probe outcome.
    pub fn from_probe(probe: &ProbeResult, checked_at: DateTime<Local>) -> Self {
        Self {
            timestamp: checked_at,
            connected: probe.succeeded,
            response_time_ms: probe.elapsed.map(millis),
            reached: probe.reached.as_ref().map(|url| url.to_string()),
            attempts: probe.attempts,
            error: probe.failure_reason.clone(),
        }
    }
}

/// Complete results from a speed test run.
#[derive(Debug, Clone, Serialize)]
pub struct SpeedTestResults {
    /// When the test completed
    pub timestamp: DateTime<Local>,
    /// "primary" or "fallback"
    pub strategy: String,
    pub download: DirectionResults,
    pub upload: DirectionResults,
    /// Wall time of the whole run in milliseconds
    pub total_duration_ms: f64,
    /// Why the primary strategy was abandoned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_error: Option<String>,
}

impl SpeedTestResults {
    /// Create SpeedTestResults from engine output.
    pub fn from_engine(report: &SpeedTestReport) -> Self {
        Self {
            timestamp: Local::now(),
            strategy: strategy_to_string(report.strategy),
            download: DirectionResults::from_engine(&report.download),
            upload: DirectionResults::from_engine(&report.upload),
            total_duration_ms: millis(report.total_duration),
            primary_error: report.primary_error.clone(),
        }
    }
}

/// Download or upload result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionResults {
    /// Speed in Mbps, absent when the direction failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_mbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DirectionResults {
    /// Create DirectionResults from engine output.
    pub fn from_engine(engine: &EngineMeasurement) -> Self {
        match engine {
            EngineMeasurement::Measured(sample) => Self {
                speed_mbps: Some(sample.speed_mbps),
                bytes: Some(sample.bytes_transferred),
                elapsed_ms: Some(sample.elapsed_seconds * 1000.0),
                error: None,
            },
            EngineMeasurement::Failed { reason } => Self {
                speed_mbps: None,
                bytes: None,
                elapsed_ms: None,
                error: Some(reason.clone()),
            },
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}

fn strategy_to_string(strategy: Strategy) -> String {
    match strategy {
        Strategy::Primary => "primary".to_string(),
        Strategy::Fallback => "fallback".to_string(),
    }
}
