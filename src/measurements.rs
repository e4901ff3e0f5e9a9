//! Bitrate arithmetic and the throttled progress meter used during transfers.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Bits per megabit (decimal).
const BITS_PER_MEGABIT: f64 = 1_000_000.0;

/// Calculate bandwidth in bits per second.
///
/// # Returns
/// Bandwidth in bits per second, or 0.0 if `duration` is zero
pub fn calculate_bandwidth_bps(bytes: u64, duration: Duration) -> f64 {
    let seconds = duration.as_secs_f64();

    if seconds <= 0.0 {
        return 0.0;
    }

    (bytes as f64 * 8.0) / seconds
}

/// Convert bits per second to megabits per second.
pub fn calculate_speed_mbps(bandwidth_bps: f64) -> f64 {
    bandwidth_bps / BITS_PER_MEGABIT
}

/// A transfer rate derived from bytes moved over elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThroughputSample {
    /// Bytes moved so far
    pub bytes_transferred: u64,
    /// Seconds since the transfer started
    pub elapsed_seconds: f64,
    /// Rate in decimal megabits per second
    pub speed_mbps: f64,
}

impl ThroughputSample {
    /// Build a sample from a byte count and the time it took.
    pub fn new(bytes_transferred: u64, elapsed: Duration) -> Self {
        Self {
            bytes_transferred,
            elapsed_seconds: elapsed.as_secs_f64(),
            speed_mbps: calculate_speed_mbps(calculate_bandwidth_bps(
                bytes_transferred,
                elapsed,
            )),
        }
    }

    /// A sample for a transfer that moved nothing.
    pub fn zero() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_seconds)
    }
}

/// Tracks cumulative bytes of one transfer and rate-limits interim readings.
///
/// Interim samples are published at most once per `throttle`. The final
/// sample always comes from the total byte count and total elapsed time.
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    started: Instant,
    last_published: Instant,
    throttle: Duration,
    bytes: u64,
}

impl ThroughputMeter {
    /// Start metering a transfer that begins now.
    pub fn start(throttle: Duration) -> Self {
        Self::started_at(Instant::now(), throttle)
    }

    pub fn started_at(started: Instant, throttle: Duration) -> Self {
        Self { started, last_published: started, throttle, bytes: 0 }
    }

    /// Bytes recorded so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Record `chunk` more bytes.
    ///
    /// Returns an interim sample when the throttle window has passed since
    /// the last one. No reading is produced while elapsed time is zero.
    pub fn record(&mut self, chunk: u64) -> Option<ThroughputSample> {
        self.bytes = self.bytes.saturating_add(chunk);

        let now = Instant::now();
        let elapsed = now.duration_since(self.started);

        if elapsed.is_zero()
            || now.duration_since(self.last_published) < self.throttle
        {
            return None;
        }

        self.last_published = now;
        Some(ThroughputSample::new(self.bytes, elapsed))
    }

    /// The end-to-end sample for the whole transfer.
    pub fn finish(&self) -> ThroughputSample {
        ThroughputSample::new(self.bytes, self.started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_five_megabytes_in_four_seconds() {
        let sample =
            ThroughputSample::new(5_000_000, Duration::from_secs(4));
        assert!((sample.speed_mbps - 10.0).abs() < 1e-9);
        assert_eq!(format!("{:.2}", sample.speed_mbps), "10.00");
    }

    #[test]
    fn test_zero_duration_is_zero_mbps() {
        assert_eq!(calculate_bandwidth_bps(1_000, Duration::ZERO), 0.0);
        assert_eq!(ThroughputSample::zero().speed_mbps, 0.0);
    }

    #[test]
    fn test_speed_is_decimal_megabits() {
        // 125_000 bytes = 1_000_000 bits
        let bps = calculate_bandwidth_bps(125_000, Duration::from_secs(1));
        assert_eq!(calculate_speed_mbps(bps), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_meter_defers_reading_at_zero_elapsed() {
        let mut meter = ThroughputMeter::start(Duration::ZERO);
        assert!(meter.record(1_000).is_none());
        assert_eq!(meter.bytes(), 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_meter_throttles_interim_readings() {
        let mut meter = ThroughputMeter::start(Duration::from_millis(100));

        tokio::time::advance(Duration::from_millis(40)).await;
        assert!(meter.record(10_000).is_none());

        tokio::time::advance(Duration::from_millis(60)).await;
        let sample = meter.record(10_000).expect("window elapsed");
        assert_eq!(sample.bytes_transferred, 20_000);

        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(meter.record(10_000).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_meter_finish_uses_total_elapsed() {
        let mut meter = ThroughputMeter::start(Duration::from_millis(100));

        tokio::time::advance(Duration::from_millis(100)).await;
        let interim = meter.record(1_000_000).expect("window elapsed");
        assert!((interim.speed_mbps - 80.0).abs() < 1e-6);

        // Stall before the transfer closes
        tokio::time::advance(Duration::from_millis(900)).await;
        let final_sample = meter.finish();

        assert_eq!(final_sample.bytes_transferred, 1_000_000);
        assert!((final_sample.elapsed_seconds - 1.0).abs() < 1e-6);
        assert!((final_sample.speed_mbps - 8.0).abs() < 1e-6);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property: speed_mbps == bytes * 8 / 1e6 / seconds for any
        /// positive duration.
        #[test]
        fn speed_formula_holds(
            bytes in 0u64..10_000_000_000,
            millis in 1u64..600_000
        ) {
            let duration = Duration::from_millis(millis);
            let sample = ThroughputSample::new(bytes, duration);
            let expected =
                bytes as f64 * 8.0 / 1_000_000.0 / duration.as_secs_f64();

            prop_assert!((sample.speed_mbps - expected).abs() <= expected.abs() * 1e-12 + 1e-12);
            prop_assert!(sample.speed_mbps >= 0.0);
        }

        /// Property: the byte counter never decreases.
        #[test]
        fn meter_bytes_monotonic(chunks in prop::collection::vec(0u64..100_000, 0..50)) {
            let mut meter = ThroughputMeter::started_at(
                Instant::now(),
                Duration::from_millis(100),
            );
            let mut last = 0;
            for chunk in chunks {
                meter.record(chunk);
                prop_assert!(meter.bytes() >= last);
                last = meter.bytes();
            }
        }
    }
}
