use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{ErrorLevel, Verbosity};
use colored::Colorize;
use log::{debug, info};
use netpulse::checks::connectivity::DEFAULT_PROBE_TIMEOUT_MS;
use netpulse::config::MonitorConfig;
use netpulse::errors::{classify_error, exit_codes, format_error_for_display, ProbeError};
use netpulse::monitor::NetworkMonitor;
use netpulse::network::{HttpClient, ProbeTarget};
use netpulse::output::{self, DisplayMode};
use netpulse::platform::{self, LinkWatcher};
use netpulse::results::{CheckResults, SpeedTestResults};
use netpulse::status::MonitorEvent;
use std::error::Error;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (rev ",
    env!("NETPULSE_BUILD_GIT_HASH"),
    ")"
);

#[derive(Parser)]
#[command(author, version = VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    verbose: Verbosity<ErrorLevel>,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether the internet is reachable
    Check(CheckArgs),
    /// Measure download and upload throughput
    Speed(SpeedArgs),
    /// Follow link state and check periodically until interrupted
    Watch(WatchArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Probe target, tried in the order given (repeatable)
    #[arg(long = "target", value_name = "URL")]
    targets: Vec<String>,

    /// Time budget for each probe attempt
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_PROBE_TIMEOUT_MS)]
    timeout_ms: u64,
}

#[derive(Args)]
struct SpeedArgs {
    /// Size of the download payload
    #[arg(long, value_name = "BYTES")]
    download_bytes: Option<u64>,

    /// Size of the upload payload
    #[arg(long, value_name = "BYTES")]
    upload_bytes: Option<u64>,

    /// Time budget for each transfer
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,
}

#[derive(Args)]
struct WatchArgs {
    /// Seconds between connectivity checks
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    interval_secs: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(cli.verbose.log_level_filter())
        .format_timestamp_millis()
        .init();

    let mode = DisplayMode::detect(cli.json, std::io::stderr().is_terminal());
    debug!("Display mode: {:?}", mode);

    let code = match run(cli.command, mode).await {
        Ok(code) => code,
        Err(e) => {
            let (message, code) = match e.downcast_ref::<ProbeError>() {
                Some(probe_error) => {
                    (format_error_for_display(probe_error), probe_error.exit_code())
                }
                None => (e.to_string(), classify_error(e.as_ref()).exit_code()),
            };
            eprintln!("{} {}", "Error:".bold().red(), message);
            code
        }
    };

    std::process::exit(code);
}

async fn run(command: Command, mode: DisplayMode) -> Result<i32, Box<dyn Error>> {
    let mut config = MonitorConfig::default();

    // A one-shot run exits right after the result, so there is nothing to
    // settle for.
    match &command {
        Command::Check(args) => {
            if !args.targets.is_empty() {
                config.probe_targets = ProbeTarget::parse_all(&args.targets)?;
            }
            config.probe_timeout_ms = args.timeout_ms;
            config.check_settle_ms = 0;
        }
        Command::Speed(args) => {
            if let Some(bytes) = args.download_bytes {
                config.speed.download_bytes = bytes;
            }
            if let Some(bytes) = args.upload_bytes {
                config.speed.upload_bytes = bytes;
            }
            if let Some(ms) = args.timeout_ms {
                config.speed.transfer_timeout_ms = ms;
            }
            config.speed.settle_delay_ms = 0;
        }
        Command::Watch(_) => {}
    }

    let online = platform::link_available().await;
    let (tx, mut rx) = mpsc::unbounded_channel::<MonitorEvent>();
    let renderer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            output::render_event(mode, &event);
        }
    });

    let monitor = NetworkMonitor::new(HttpClient::new()?, config, Arc::new(tx), online);

    let result = match command {
        Command::Check(_) => check(&monitor, mode).await,
        Command::Speed(_) => speed(&monitor, mode).await,
        Command::Watch(args) => {
            watch(&monitor, mode, online, Duration::from_secs(args.interval_secs)).await
        }
    };

    // Closing the channel lets the renderer drain and finish before the
    // summary is printed.
    drop(monitor);
    let _ = renderer.await;

    let (summary, code) = result?;
    output::print_lines(&summary);
    Ok(code)
}

type Outcome = Result<(Vec<String>, i32), Box<dyn Error>>;

async fn check(monitor: &NetworkMonitor<HttpClient>, mode: DisplayMode) -> Outcome {
    let probe = monitor.check_connectivity().await?;
    let checked_at = monitor
        .snapshot()
        .last_check()
        .unwrap_or_else(chrono::Local::now);
    let results = CheckResults::from_probe(&probe, checked_at);

    let code = if probe.succeeded {
        exit_codes::SUCCESS
    } else {
        exit_codes::NETWORK_ERROR
    };

    Ok((render(mode, &results, output::check_summary)?, code))
}

async fn speed(monitor: &NetworkMonitor<HttpClient>, mode: DisplayMode) -> Outcome {
    let report = monitor.run_speed_test().await?;
    let results = SpeedTestResults::from_engine(&report);

    let code = if report.is_failure() {
        exit_codes::NETWORK_ERROR
    } else {
        exit_codes::SUCCESS
    };

    Ok((render(mode, &results, output::speed_summary)?, code))
}

async fn watch(
    monitor: &NetworkMonitor<HttpClient>,
    mode: DisplayMode,
    online: bool,
    interval: Duration,
) -> Outcome {
    info!("Watching connectivity, checking every {:?}", interval);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping watch");
        }
        result = watch_loop(monitor, mode, online, interval) => {
            result?;
        }
    }

    Ok((Vec::new(), exit_codes::SUCCESS))
}

async fn watch_loop(
    monitor: &NetworkMonitor<HttpClient>,
    mode: DisplayMode,
    online: bool,
    interval: Duration,
) -> Result<(), Box<dyn Error>> {
    let mut link = LinkWatcher::new(online);
    let mut poll = tokio::time::interval(Duration::from_secs(1));
    let mut checks = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = poll.tick() => {
                if let Some(online) = link.observe(platform::link_available().await) {
                    monitor.notify_connectivity(online);
                }
            }
            _ = checks.tick() => {
                match monitor.check_connectivity().await {
                    Ok(probe) => {
                        let results = CheckResults::from_probe(&probe, chrono::Local::now());
                        output::print_lines(&render(mode, &results, output::check_summary)?);
                    }
                    Err(e) => debug!("Skipped scheduled check: {}", e),
                }
            }
        }
    }
}

/// Summary lines for the text modes; JSON is printed directly.
fn render<T: serde::Serialize>(
    mode: DisplayMode,
    results: &T,
    summary: fn(&T) -> Vec<String>,
) -> Result<Vec<String>, serde_json::Error> {
    match mode {
        DisplayMode::Json => {
            output::print_json(results)?;
            Ok(Vec::new())
        }
        DisplayMode::Live | DisplayMode::Plain => Ok(summary(results)),
    }
}
