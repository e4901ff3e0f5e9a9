//! Error types for connectivity probes and throughput measurements.
//!
//! Failures inside a probe loop or fallback batch are logged and swallowed
//! by the caller. The types here describe the ones that escape: an
//! exhausted probe, a failed transfer, an exhausted fallback, or a rejected
//! re-entrant call.

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Exit codes for the application.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Network error (host offline, every strategy failed, etc.).
    pub const NETWORK_ERROR: i32 = 1;
    /// A measurement of the same kind is already running.
    pub const BUSY: i32 = 2;
    /// Configuration error (invalid arguments or targets).
    pub const CONFIG_ERROR: i32 = 3;
    /// Unknown/unexpected error.
    pub const UNKNOWN_ERROR: i32 = 99;
}

/// Categories of errors that can occur while probing the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network connectivity issues.
    Network,
    /// DNS resolution failures.
    Dns,
    /// Request or transfer timeout.
    Timeout,
    /// TLS/SSL handshake failures.
    Tls,
    /// Server returned an error response.
    Api,
    /// Invalid configuration or arguments.
    Config,
    /// Another measurement holds the lock.
    Busy,
    /// Unknown or unexpected errors.
    Unknown,
}

impl ErrorKind {
    /// Get the exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Network => exit_codes::NETWORK_ERROR,
            ErrorKind::Dns => exit_codes::NETWORK_ERROR,
            ErrorKind::Timeout => exit_codes::NETWORK_ERROR,
            ErrorKind::Tls => exit_codes::NETWORK_ERROR,
            ErrorKind::Api => exit_codes::NETWORK_ERROR,
            ErrorKind::Config => exit_codes::CONFIG_ERROR,
            ErrorKind::Busy => exit_codes::BUSY,
            ErrorKind::Unknown => exit_codes::UNKNOWN_ERROR,
        }
    }

    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Network error",
            ErrorKind::Dns => "DNS resolution error",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Tls => "TLS/SSL error",
            ErrorKind::Api => "Server error",
            ErrorKind::Config => "Configuration error",
            ErrorKind::Busy => "Busy",
            ErrorKind::Unknown => "Unknown error",
        }
    }
}

/// Which kind of measurement a lock or a transfer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// A connectivity probe.
    ConnectivityCheck,
    /// A download/upload speed test.
    SpeedTest,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::ConnectivityCheck => f.write_str("connectivity check"),
            Activity::SpeedTest => f.write_str("speed test"),
        }
    }
}

/// Errors surfaced by the measurement engine.
#[derive(Debug)]
pub enum ProbeError {
    /// A single probe target could not be reached. Non-fatal: the probe
    /// moves on to the next target.
    TargetUnreachable {
        /// The target that failed.
        url: String,
        /// Why it failed.
        reason: String,
    },
    /// Every probe target failed.
    AllTargetsFailed {
        /// Number of targets contacted.
        attempts: usize,
    },
    /// A throughput transfer failed before completing.
    TransferFailed {
        /// Error reported by the transport.
        source: Box<dyn Error + Send + Sync>,
    },
    /// A throughput transfer exceeded its time budget.
    TransferTimeout {
        /// The budget that was exceeded.
        limit: Duration,
    },
    /// The fallback strategy could not reach anything either.
    FallbackFailed {
        /// Number of fallback requests attempted.
        attempts: usize,
    },
    /// A measurement is already in flight.
    AlreadyRunning {
        /// The measurement that currently holds the lock.
        active: Activity,
    },
    /// A configured target is not a valid URL.
    InvalidTarget {
        /// The rejected input.
        input: String,
        /// Parser message.
        reason: String,
    },
}

impl ProbeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProbeError::TargetUnreachable { .. }
            | ProbeError::AllTargetsFailed { .. }
            | ProbeError::FallbackFailed { .. } => ErrorKind::Network,
            ProbeError::TransferFailed { source } => {
                match classify_error(source.as_ref()) {
                    ErrorKind::Unknown => ErrorKind::Network,
                    kind => kind,
                }
            }
            ProbeError::TransferTimeout { .. } => ErrorKind::Timeout,
            ProbeError::AlreadyRunning { .. } => ErrorKind::Busy,
            ProbeError::InvalidTarget { .. } => ErrorKind::Config,
        }
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    /// Wrap a transport error as a failed transfer.
    pub fn transfer(source: impl Error + Send + Sync + 'static) -> Self {
        ProbeError::TransferFailed { source: Box::new(source) }
    }

    /// Optional hint shown to the user next to the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::Network => {
                Some("Check your internet connection and try again.")
            }
            ErrorKind::Dns => Some(
                "Check your DNS settings or try using a different DNS server.",
            ),
            ErrorKind::Timeout => Some(
                "The server may be slow or unreachable. Try again later.",
            ),
            ErrorKind::Tls => Some(
                "There may be a certificate issue. Check your system time.",
            ),
            ErrorKind::Busy => Some("Wait for the running measurement to finish."),
            _ => None,
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::TargetUnreachable { url, reason } => {
                write!(f, "Failed to reach {}: {}", url, reason)
            }
            ProbeError::AllTargetsFailed { attempts } => {
                write!(f, "All {} connection attempts failed", attempts)
            }
            ProbeError::TransferFailed { source } => {
                write!(f, "Transfer failed: {}", source)
            }
            ProbeError::TransferTimeout { limit } => {
                write!(f, "Transfer timed out after {} ms", limit.as_millis())
            }
            ProbeError::FallbackFailed { attempts } => write!(
                f,
                "Speed test failed: none of the {} fallback requests succeeded",
                attempts
            ),
            ProbeError::AlreadyRunning { active } => {
                write!(f, "A {} is already running", active)
            }
            ProbeError::InvalidTarget { input, reason } => {
                write!(f, "Invalid target '{}': {}", input, reason)
            }
        }
    }
}

impl Error for ProbeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProbeError::TransferFailed { source } => {
                Some(source.as_ref() as &(dyn Error + 'static))
            }
            _ => None,
        }
    }
}

/// Classify an error into an ErrorKind based on its message.
pub fn classify_error(error: &dyn Error) -> ErrorKind {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("dns")
        || error_str.contains("resolve")
        || error_str.contains("no such host")
    {
        return ErrorKind::Dns;
    }

    if error_str.contains("timeout")
        || error_str.contains("timed out")
        || error_str.contains("deadline")
    {
        return ErrorKind::Timeout;
    }

    if error_str.contains("tls")
        || error_str.contains("ssl")
        || error_str.contains("certificate")
        || error_str.contains("handshake")
    {
        return ErrorKind::Tls;
    }

    if error_str.contains("connection refused")
        || error_str.contains("connection reset")
        || error_str.contains("network unreachable")
        || error_str.contains("host unreachable")
        || error_str.contains("no route")
        || error_str.contains("broken pipe")
        || error_str.contains("error sending request")
    {
        return ErrorKind::Network;
    }

    if error_str.contains("status: 4")
        || error_str.contains("status: 5")
        || error_str.contains("server error")
    {
        return ErrorKind::Api;
    }

    ErrorKind::Unknown
}

/// Format an error for user display.
pub fn format_error_for_display(error: &ProbeError) -> String {
    let mut output = format!("{}: {}", error.kind().description(), error);

    if let Some(suggestion) = error.suggestion() {
        output.push_str(&format!("\n\nSuggestion: {}", suggestion));
    }

    output
}
