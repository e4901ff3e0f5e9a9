//! Terminal output.
//!
//! Chooses between live, plain and JSON output and formats monitor events
//! and results for the terminal with `colored`.

use crate::checks::throughput::TransferPhase;
use crate::results::{CheckResults, DirectionResults, SpeedTestResults};
use crate::status::{MonitorEvent, Status, StatusEvent};
use colored::{Color, ColoredString, Colorize};
use serde::Serialize;
use std::io::{self, Write};

/// The display mode for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Status transitions and live throughput on stderr, summary on stdout
    Live,
    /// Summary only
    Plain,
    /// Structured output only
    Json,
}

impl DisplayMode {
    /// Determine display mode from CLI flags and environment.
    ///
    /// # Arguments
    /// * `json_flag` - Whether the `--json` flag was provided
    /// * `is_tty` - Whether stderr is an interactive terminal
    ///
    /// # Returns
    /// * `Json` when json_flag is true (regardless of is_tty)
    /// * `Live` when json_flag is false AND is_tty is true
    /// * `Plain` when json_flag is false AND is_tty is false
    pub fn detect(json_flag: bool, is_tty: bool) -> Self {
        if json_flag {
            DisplayMode::Json
        } else if is_tty {
            DisplayMode::Live
        } else {
            DisplayMode::Plain
        }
    }
}

/// Get color for speed value based on thresholds.
///
/// - Green: >= 100 Mbps (fast)
/// - Yellow: 25-100 Mbps (moderate)
/// - Red: < 25 Mbps (slow)
pub fn speed_color(speed_mbps: f64) -> Color {
    if speed_mbps >= 100.0 {
        Color::Green
    } else if speed_mbps >= 25.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

/// Format speed value with 2 decimal places.
pub fn format_speed(speed_mbps: f64) -> String {
    format!("{:.2} Mbps", speed_mbps)
}

fn status_color(status: Status) -> Color {
    match status {
        Status::Connected => Color::Green,
        Status::Disconnected => Color::Red,
        Status::Checking | Status::Testing => Color::Yellow,
        Status::Idle => Color::BrightBlue,
    }
}

/// Colored status dot followed by the status text.
pub fn format_status(event: &StatusEvent) -> String {
    format!(
        "{} {} {}",
        "●".color(status_color(event.status)),
        event.detail.bold(),
        format!("({})", event.at.format("%H:%M:%S")).dimmed()
    )
}

pub fn format_progress(phase: TransferPhase, mbps: f64) -> String {
    let label = match phase {
        TransferPhase::Download => "Download:",
        TransferPhase::Upload => "Upload:",
    };
    format!(
        "{} {}",
        label.bold().white(),
        format_speed(mbps).color(speed_color(mbps))
    )
}

/// Render a monitor event as it happens. Only the live mode shows anything.
pub fn render_event(mode: DisplayMode, event: &MonitorEvent) {
    if mode != DisplayMode::Live {
        return;
    }

    let mut stderr = io::stderr().lock();
    // Progress lines overwrite themselves; anything else ends the line.
    let _ = match event {
        MonitorEvent::Progress { phase, mbps } => {
            write!(stderr, "\r\x1b[2K{}", format_progress(*phase, *mbps))
        }
        MonitorEvent::Status(status) => {
            writeln!(stderr, "\r\x1b[2K{}", format_status(status))
        }
        MonitorEvent::Alert(message) => {
            writeln!(stderr, "\r\x1b[2K{} {}", "Error:".bold().red(), message)
        }
    };
    let _ = stderr.flush();
}

fn label(text: &str) -> ColoredString {
    text.bold().white()
}

/// Human readable summary of a connectivity check.
pub fn check_summary(results: &CheckResults) -> Vec<String> {
    let connection = if results.connected {
        "Connected".green()
    } else {
        "Disconnected".red()
    };

    let response_time = match results.response_time_ms {
        Some(ms) => format!("{:.0} ms", ms),
        None => "N/A".to_string(),
    };

    let mut lines = vec![
        format!("{} {}", label("Status:"), connection),
        format!("{} {}", label("Response Time:"), response_time),
        format!(
            "{} {}",
            label("Last Check:"),
            results.timestamp.format("%H:%M:%S")
        ),
    ];

    if let Some(reached) = &results.reached {
        lines.push(format!("{} {}", label("Reached:"), reached.bright_blue()));
    }
    if let Some(error) = &results.error {
        lines.push(format!("{} {}", label("Error:"), error.red()));
    }

    lines
}

fn direction_line(name: &str, direction: &DirectionResults) -> String {
    match (direction.speed_mbps, &direction.error) {
        (Some(mbps), _) => format!(
            "{} {}",
            label(name),
            format_speed(mbps).color(speed_color(mbps))
        ),
        (None, Some(error)) => {
            format!("{} {} ({})", label(name), "failed".red(), error)
        }
        (None, None) => format!("{} {}", label(name), "failed".red()),
    }
}

/// Human readable summary of a speed test.
pub fn speed_summary(results: &SpeedTestResults) -> Vec<String> {
    let mut lines = vec![
        direction_line("Download speed:", &results.download),
        direction_line("Upload speed:", &results.upload),
        format!("{} {}", label("Strategy:"), results.strategy),
        format!(
            "{} {:.1} s",
            label("Duration:"),
            results.total_duration_ms / 1000.0
        ),
    ];

    if let Some(error) = &results.primary_error {
        lines.push(format!(
            "{} {}",
            label("Primary test failed:"),
            error.yellow()
        ));
    }

    lines
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print summary lines on stdout.
pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}
