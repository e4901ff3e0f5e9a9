use crate::checks::fallback::{
    FallbackSampler, DEFAULT_FALLBACK_TIMEOUT_MS, DEFAULT_FALLBACK_UPLOAD_BYTES,
};
use crate::checks::throughput::{
    ThroughputSampler, TransferPhase, DEFAULT_PROGRESS_THROTTLE_MS,
};
use crate::errors::ProbeError;
use crate::measurements::ThroughputSample;
use crate::network::targets::{static_url, DOWNLOAD_URL, UPLOAD_URL};
use crate::network::{ProbeTarget, Transport};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Configuration for the speed test.
#[derive(Debug, Clone)]
pub struct SpeedTestConfig {
    /// Size of the primary download in bytes.
    /// Default: 25MB
    pub download_bytes: u64,

    /// Size of the primary upload in bytes.
    /// Default: 10MB
    pub upload_bytes: u64,

    /// Time budget for each primary transfer in ms.
    /// Default: 30000ms
    pub transfer_timeout_ms: u64,

    /// Minimum interval between interim readings in ms.
    /// Default: 100ms
    pub progress_throttle_ms: u64,

    /// Endpoint serving the primary download, sized with `?bytes=N`.
    pub download_url: Url,

    /// Endpoint accepting the primary upload.
    pub upload_url: Url,

    /// Small resources fetched by the fallback download estimate.
    pub fallback_targets: Vec<ProbeTarget>,

    /// Endpoint accepting the fallback upload.
    pub fallback_upload_url: Url,

    /// Size of the fallback upload in bytes.
    /// Default: 1KB
    pub fallback_upload_bytes: u64,

    /// Time budget for each fallback request in ms.
    /// Default: 5000ms
    pub fallback_timeout_ms: u64,

    /// Pause after reporting a result before the next test may start, in ms.
    /// Default: 2000ms
    pub settle_delay_ms: u64,
}

impl Default for SpeedTestConfig {
    fn default() -> Self {
        Self {
            download_bytes: 25_000_000,
            upload_bytes: 10_000_000,
            transfer_timeout_ms: 30_000,
            progress_throttle_ms: DEFAULT_PROGRESS_THROTTLE_MS,
            download_url: static_url(DOWNLOAD_URL),
            upload_url: static_url(UPLOAD_URL),
            fallback_targets: ProbeTarget::fallback_defaults(),
            fallback_upload_url: static_url(UPLOAD_URL),
            fallback_upload_bytes: DEFAULT_FALLBACK_UPLOAD_BYTES,
            fallback_timeout_ms: DEFAULT_FALLBACK_TIMEOUT_MS,
            settle_delay_ms: 2000,
        }
    }
}

/// Which strategy produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One large download followed by one large upload.
    Primary,
    /// Many small requests, after the primary strategy failed.
    Fallback,
}

/// Result for one direction of a speed test.
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Measured(ThroughputSample),
    Failed { reason: String },
}

impl Measurement {
    pub fn sample(&self) -> Option<&ThroughputSample> {
        match self {
            Measurement::Measured(sample) => Some(sample),
            Measurement::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Measurement::Failed { .. })
    }
}

/// Complete results from a speed test run.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedTestReport {
    pub download: Measurement,
    pub upload: Measurement,
    /// Time from the start of the run until the report was assembled
    pub total_duration: Duration,
    pub strategy: Strategy,
    /// Why the primary strategy was abandoned, if it was
    pub primary_error: Option<String>,
}

impl SpeedTestReport {
    /// True when every strategy failed.
    pub fn is_failure(&self) -> bool {
        self.download.is_failed() && self.upload.is_failed()
    }
}

/// Sequences the download and upload samples and falls back to the
/// small-request estimate when either fails.
///
/// # Example
/// ```no_run
/// use netpulse::checks::engine::{SpeedTestConfig, SpeedTestEngine};
/// use netpulse::network::HttpClient;
///
/// #[tokio::main]
/// async fn main() {
///     let engine = SpeedTestEngine::new(
///         HttpClient::new().unwrap(),
///         SpeedTestConfig::default(),
///     );
///     let report = engine.run(|_, _| {}).await;
///     println!("{:?}", report.strategy);
/// }
/// ```
pub struct SpeedTestEngine<T> {
    transport: T,
    config: SpeedTestConfig,
}

impl<T: Transport> SpeedTestEngine<T> {
    pub fn new(transport: T, config: SpeedTestConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &SpeedTestConfig {
        &self.config
    }

    /// Run the speed test sequence.
    ///
    /// Interim and final readings are handed to `on_progress` as they
    /// arrive. Download always finishes before upload starts.
    pub async fn run(
        &self,
        mut on_progress: impl FnMut(TransferPhase, &ThroughputSample),
    ) -> SpeedTestReport {
        let started = Instant::now();
        info!("Starting speed test sequence");

        let primary_error = match self.run_primary(&mut on_progress).await {
            Ok((download, upload)) => {
                info!(
                    "Speed test complete: download={:.2} Mbps, upload={:.2} Mbps",
                    download.speed_mbps, upload.speed_mbps
                );
                return SpeedTestReport {
                    download: Measurement::Measured(download),
                    upload: Measurement::Measured(upload),
                    total_duration: started.elapsed(),
                    strategy: Strategy::Primary,
                    primary_error: None,
                };
            }
            Err(e) => e,
        };

        warn!(
            "Primary speed test failed: {}. Trying fallback estimate",
            primary_error
        );

        let (download, upload) = match self.fallback().run().await {
            Ok(estimate) => {
                on_progress(TransferPhase::Download, &estimate.download);
                on_progress(TransferPhase::Upload, &estimate.upload);
                (
                    Measurement::Measured(estimate.download),
                    Measurement::Measured(estimate.upload),
                )
            }
            Err(e) => {
                let reason = e.to_string();
                (
                    Measurement::Failed { reason: reason.clone() },
                    Measurement::Failed { reason },
                )
            }
        };

        SpeedTestReport {
            download,
            upload,
            total_duration: started.elapsed(),
            strategy: Strategy::Fallback,
            primary_error: Some(primary_error.to_string()),
        }
    }

    async fn run_primary(
        &self,
        on_progress: &mut impl FnMut(TransferPhase, &ThroughputSample),
    ) -> Result<(ThroughputSample, ThroughputSample), ProbeError> {
        let sampler = ThroughputSampler::new(
            &self.transport,
            self.config.download_url.clone(),
            self.config.upload_url.clone(),
            Duration::from_millis(self.config.progress_throttle_ms),
        );
        let limit = Duration::from_millis(self.config.transfer_timeout_ms);

        debug!("Running download test: {} bytes", self.config.download_bytes);
        let download = sampler
            .sample_download(self.config.download_bytes, limit, |sample| {
                on_progress(TransferPhase::Download, sample)
            })
            .await?;
        on_progress(TransferPhase::Download, &download);

        debug!("Running upload test: {} bytes", self.config.upload_bytes);
        let upload = sampler
            .sample_upload(self.config.upload_bytes, limit, |sample| {
                on_progress(TransferPhase::Upload, sample)
            })
            .await?;
        on_progress(TransferPhase::Upload, &upload);

        Ok((download, upload))
    }

    fn fallback(&self) -> FallbackSampler<&T> {
        FallbackSampler::new(
            &self.transport,
            self.config.fallback_targets.clone(),
            self.config.fallback_upload_url.clone(),
            self.config.fallback_upload_bytes,
            Duration::from_millis(self.config.fallback_timeout_ms),
        )
    }
}
