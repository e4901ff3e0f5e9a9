//! The network monitor.
//!
//! Owns the transport, the configuration and the status machine, and runs
//! connectivity checks and speed tests on behalf of the view layer. At
//! most one measurement is in flight at a time; a request made while one
//! runs is rejected with [`ProbeError::AlreadyRunning`] without touching
//! the network.

use crate::checks::connectivity::{ConnectivityProbe, ProbeResult};
use crate::checks::engine::{Measurement, SpeedTestEngine, SpeedTestReport};
use crate::config::MonitorConfig;
use crate::errors::{Activity, ProbeError};
use crate::network::Transport;
use crate::status::{MonitorEvent, MonitorListener, StatusEvent, StatusMachine};
use log::{info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub struct NetworkMonitor<T> {
    transport: T,
    config: MonitorConfig,
    machine: Mutex<StatusMachine>,
    listener: Arc<dyn MonitorListener>,
}

impl<T> NetworkMonitor<T> {
    /// Create a monitor. `online` is the platform's current link state and
    /// decides the initial status, which is published right away.
    pub fn new(
        transport: T,
        config: MonitorConfig,
        listener: Arc<dyn MonitorListener>,
        online: bool,
    ) -> Self {
        let machine = StatusMachine::new(online);
        listener.on_event(MonitorEvent::Status(machine.current().clone()));

        Self { transport, config, machine: Mutex::new(machine), listener }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Current status.
    pub fn status(&self) -> StatusEvent {
        self.machine().current().clone()
    }

    /// Copy of the full monitor state.
    pub fn snapshot(&self) -> StatusMachine {
        self.machine().clone()
    }

    /// Forward an online/offline notification from the platform.
    ///
    /// Suppressed while a check or speed test is in flight.
    pub fn notify_connectivity(&self, online: bool) -> Option<StatusEvent> {
        let event = self.machine().external(online)?;
        info!("Link state changed: {}", event.detail);
        self.emit(event.clone());
        Some(event)
    }

    fn machine(&self) -> MutexGuard<'_, StatusMachine> {
        // Transitions never panic halfway, so a poisoned state is still whole.
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StatusEvent) {
        self.listener.on_event(MonitorEvent::Status(event));
    }

    fn release(&self, activity: Activity) {
        let released = self.machine().release(activity);
        if let Some(event) = released {
            self.emit(event);
        }
    }
}

impl<T: Transport> NetworkMonitor<T> {
    /// Probe the configured targets and publish the outcome.
    ///
    /// The lock is held for a settling delay after the result is
    /// published, then the status returns to idle.
    pub async fn check_connectivity(&self) -> Result<ProbeResult, ProbeError> {
        let started = self.machine().begin_check()?;
        self.emit(started);
        let lock = ReleaseOnDrop { monitor: self, activity: Activity::ConnectivityCheck };

        let probe = ConnectivityProbe::new(
            &self.transport,
            Duration::from_millis(self.config.probe_timeout_ms),
        );
        let result = probe.probe(&self.config.probe_targets).await;

        let finished = self.machine().finish_check(&result);
        self.emit(finished);

        lock.settle(Duration::from_millis(self.config.check_settle_ms)).await;
        Ok(result)
    }

    /// Run a speed test and publish progress and the outcome.
    ///
    /// Interim readings arrive as [`MonitorEvent::Progress`]. When every
    /// strategy fails an [`MonitorEvent::Alert`] is published as well.
    pub async fn run_speed_test(&self) -> Result<SpeedTestReport, ProbeError> {
        let started = self.machine().begin_speed_test()?;
        self.emit(started);
        let lock = ReleaseOnDrop { monitor: self, activity: Activity::SpeedTest };

        let engine = SpeedTestEngine::new(&self.transport, self.config.speed.clone());
        let report = engine
            .run(|phase, sample| {
                self.listener.on_event(MonitorEvent::Progress {
                    phase,
                    mbps: sample.speed_mbps,
                })
            })
            .await;

        if report.is_failure() {
            if let Measurement::Failed { reason } = &report.download {
                warn!("Speed test failed: {}", reason);
                self.listener.on_event(MonitorEvent::Alert(reason.clone()));
            }
        }

        let finished = self.machine().finish_speed_test(&report);
        self.emit(finished);

        lock.settle(Duration::from_millis(self.config.speed.settle_delay_ms))
            .await;
        Ok(report)
    }
}

/// Releases a measurement lock when dropped, including when the owning
/// future is dropped mid-run.
struct ReleaseOnDrop<'a, T> {
    monitor: &'a NetworkMonitor<T>,
    activity: Activity,
}

impl<T> ReleaseOnDrop<'_, T> {
    async fn settle(self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

impl<T> Drop for ReleaseOnDrop<'_, T> {
    fn drop(&mut self) {
        self.monitor.release(self.activity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::engine::tests::{healthy, test_config, DOWN, UP};
    use crate::checks::engine::Strategy;
    use crate::network::testing::{Script, ScriptedTransport};
    use crate::network::ProbeTarget;
    use crate::status::Status;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use tokio::time::{sleep, timeout, Instant};

    const PING: &str = "https://ping.example/favicon.ico";

    fn config() -> MonitorConfig {
        MonitorConfig {
            probe_targets: ProbeTarget::parse_all(&[PING]).unwrap(),
            speed: test_config(),
            ..MonitorConfig::default()
        }
    }

    fn monitor(
        transport: ScriptedTransport,
    ) -> (NetworkMonitor<ScriptedTransport>, UnboundedReceiver<MonitorEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let monitor = NetworkMonitor::new(transport, config(), Arc::new(tx), true);
        // Initial status
        assert!(matches!(rx.try_recv(), Ok(MonitorEvent::Status(_))));
        (monitor, rx)
    }

    fn statuses(rx: &mut UnboundedReceiver<MonitorEvent>) -> Vec<Status> {
        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let MonitorEvent::Status(event) = event {
                seen.push(event.status);
            }
        }
        seen
    }

    #[test]
    fn test_initial_status_is_published() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let monitor =
            NetworkMonitor::new(ScriptedTransport::new(), config(), Arc::new(tx), false);

        assert_eq!(monitor.status().status, Status::Disconnected);
        assert!(matches!(
            rx.try_recv(),
            Ok(MonitorEvent::Status(StatusEvent { status: Status::Disconnected, .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_cycle_publishes_transitions() {
        let transport = ScriptedTransport::new()
            .script(PING, Script::reach(Duration::from_millis(40)));
        let (monitor, mut rx) = monitor(transport);

        let started = Instant::now();
        let result = monitor.check_connectivity().await.unwrap();

        assert!(result.succeeded);
        assert!(started.elapsed() >= Duration::from_millis(1040));
        assert_eq!(
            statuses(&mut rx),
            vec![Status::Checking, Status::Connected, Status::Idle]
        );
        let state = monitor.snapshot();
        assert!(!state.is_locked());
        assert_eq!(state.last_rtt(), Some(Duration::from_millis(40)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_check_disconnects_then_idles() {
        let (monitor, mut rx) = monitor(ScriptedTransport::new());

        let result = monitor.check_connectivity().await.unwrap();

        assert!(!result.succeeded);
        assert_eq!(
            statuses(&mut rx),
            vec![Status::Checking, Status::Disconnected, Status::Idle]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentrant_speed_test_is_noop() {
        let (monitor, mut rx) = monitor(healthy());

        let (first, second) =
            tokio::join!(monitor.run_speed_test(), monitor.run_speed_test());

        assert_eq!(first.unwrap().strategy, Strategy::Primary);
        assert!(matches!(
            second,
            Err(ProbeError::AlreadyRunning { active: Activity::SpeedTest })
        ));
        // One download and one upload, nothing from the rejected call
        let contacted = monitor.transport.contacted();
        assert_eq!(contacted.len(), 2);
        assert!(contacted[0].starts_with(DOWN));
        assert_eq!(contacted[1], UP);
        assert_eq!(
            statuses(&mut rx),
            vec![Status::Testing, Status::Connected, Status::Idle]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_rejected_during_speed_test() {
        let transport = healthy().script(PING, Script::reach(Duration::ZERO));
        let (monitor, _rx) = monitor(transport);

        let (report, check) = tokio::join!(monitor.run_speed_test(), async {
            sleep(Duration::from_millis(100)).await;
            monitor.check_connectivity().await
        });

        assert!(report.is_ok());
        assert!(matches!(
            check,
            Err(ProbeError::AlreadyRunning { active: Activity::SpeedTest })
        ));
        assert!(!monitor.transport.contacted().contains(&PING.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_notification_during_check_is_ignored() {
        let transport = ScriptedTransport::new()
            .script(PING, Script::reach(Duration::from_millis(500)));
        let (monitor, mut rx) = monitor(transport);

        let (result, ignored) = tokio::join!(monitor.check_connectivity(), async {
            sleep(Duration::from_millis(100)).await;
            let ignored = monitor.notify_connectivity(false).is_none();
            assert_eq!(monitor.status().status, Status::Checking);
            ignored
        });

        assert!(ignored);
        assert!(result.unwrap().succeeded);
        assert_eq!(
            statuses(&mut rx),
            vec![Status::Checking, Status::Connected, Status::Idle]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_apply_when_idle() {
        let (monitor, mut rx) = monitor(ScriptedTransport::new());

        let lost = monitor.notify_connectivity(false).unwrap();
        assert_eq!(lost.status, Status::Disconnected);
        monitor.notify_connectivity(true).unwrap();

        assert_eq!(
            statuses(&mut rx),
            vec![Status::Disconnected, Status::Connected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_check_releases_lock() {
        let transport = ScriptedTransport::new()
            .script(PING, Script::reach(Duration::from_secs(3)));
        let (monitor, mut rx) = monitor(transport);

        let cut = timeout(Duration::from_millis(200), monitor.check_connectivity()).await;

        assert!(cut.is_err());
        assert!(!monitor.snapshot().is_locked());
        assert_eq!(statuses(&mut rx), vec![Status::Checking, Status::Idle]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_failure_alerts_and_disconnects() {
        let (monitor, mut rx) = monitor(ScriptedTransport::new());

        let report = monitor.run_speed_test().await.unwrap();

        assert!(report.is_failure());
        let events: Vec<MonitorEvent> =
            std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(events
            .iter()
            .any(|event| matches!(event, MonitorEvent::Alert(message) if message.contains("fallback"))));
        let last_status = events.iter().rev().find_map(|event| match event {
            MonitorEvent::Status(status) => Some(status.status),
            _ => None,
        });
        assert_eq!(last_status, Some(Status::Idle));
        assert!(events.iter().any(|event| matches!(
            event,
            MonitorEvent::Status(StatusEvent { status: Status::Disconnected, .. })
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_test_forwards_progress() {
        let (monitor, mut rx) = monitor(healthy());

        monitor.run_speed_test().await.unwrap();

        let progress: Vec<MonitorEvent> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|event| matches!(event, MonitorEvent::Progress { .. }))
            .collect();
        assert!(!progress.is_empty());
    }
}
