//! Degraded speed estimate from many small requests.
//!
//! Used when the large-payload transfers fail (blocked endpoints, server
//! limits, timeouts). The figures are a rough proxy at best.

use crate::checks::throughput::random_payload;
use crate::errors::ProbeError;
use crate::measurements::ThroughputSample;
use crate::network::{ProbeTarget, Transport, TransportError};
use futures::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use url::Url;

/// Default size of the fallback upload payload.
pub const DEFAULT_FALLBACK_UPLOAD_BYTES: u64 = 1024;

/// Default time budget for each fallback request.
pub const DEFAULT_FALLBACK_TIMEOUT_MS: u64 = 5000;

/// Download and upload figures produced by the fallback strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FallbackEstimate {
    pub download: ThroughputSample,
    pub upload: ThroughputSample,
}

pub struct FallbackSampler<T> {
    transport: T,
    targets: Vec<ProbeTarget>,
    upload_url: Url,
    upload_bytes: u64,
    request_timeout: Duration,
}

impl<T: Transport> FallbackSampler<T> {
    pub fn new(
        transport: T,
        targets: Vec<ProbeTarget>,
        upload_url: Url,
        upload_bytes: u64,
        request_timeout: Duration,
    ) -> Self {
        Self { transport, targets, upload_url, upload_bytes, request_timeout }
    }

    /// Estimate both directions.
    ///
    /// A direction with no successful request reports 0 Mbps. The run only
    /// fails when not a single request succeeded.
    pub async fn run(&self) -> Result<FallbackEstimate, ProbeError> {
        info!(
            "Running fallback estimate: {} small downloads, one {} byte upload",
            self.targets.len(),
            self.upload_bytes
        );

        let (download, fetched) = self.estimate_download().await;
        let (upload, uploaded) = self.estimate_upload().await;

        if fetched == 0 && !uploaded {
            let error =
                ProbeError::FallbackFailed { attempts: self.targets.len() + 1 };
            warn!("{}", error);
            return Err(error);
        }

        info!(
            "Fallback estimate: download={:.2} Mbps, upload={:.2} Mbps",
            download.speed_mbps, upload.speed_mbps
        );

        Ok(FallbackEstimate { download, upload })
    }

    async fn estimate_download(&self) -> (ThroughputSample, usize) {
        let started = Instant::now();
        let mut bytes = 0;
        let mut fetched = 0;

        for target in &self.targets {
            match timeout(self.request_timeout, self.fetch_all(&target.url)).await {
                Ok(Ok(received)) => {
                    debug!("Fallback fetched {} bytes from {}", received, target);
                    bytes += received;
                    fetched += 1;
                }
                Ok(Err(e)) => warn!("Fallback fetch skipped: {}", e),
                Err(_) => warn!("Fallback fetch of {} timed out", target),
            }
        }

        if fetched == 0 {
            return (ThroughputSample::zero(), 0);
        }

        (ThroughputSample::new(bytes, started.elapsed()), fetched)
    }

    async fn estimate_upload(&self) -> (ThroughputSample, bool) {
        let payload = random_payload(self.upload_bytes);
        let started = Instant::now();

        match timeout(self.request_timeout, self.send_all(payload)).await {
            Ok(Ok(sent)) => (ThroughputSample::new(sent, started.elapsed()), true),
            Ok(Err(e)) => {
                warn!("Fallback upload failed: {}", e);
                (ThroughputSample::zero(), false)
            }
            Err(_) => {
                warn!("Fallback upload to {} timed out", self.upload_url);
                (ThroughputSample::zero(), false)
            }
        }
    }

    async fn fetch_all(&self, url: &Url) -> Result<u64, TransportError> {
        let mut counts = self.transport.fetch(url).await?;
        let mut total = 0;

        while let Some(chunk) = counts.next().await {
            total += chunk?;
        }

        Ok(total)
    }

    async fn send_all(&self, payload: Vec<u8>) -> Result<u64, TransportError> {
        let mut counts = self.transport.send(&self.upload_url, payload).await?;
        let mut total = 0;

        while let Some(chunk) = counts.next().await {
            total += chunk?;
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::{Method, Script, ScriptedTransport, Step};

    const ICON_A: &str = "https://a.example/favicon.ico";
    const ICON_B: &str = "https://b.example/favicon.ico";
    const SMALL: &str = "https://c.example/small";
    const UP: &str = "https://up.example/post";

    fn sampler(transport: &ScriptedTransport) -> FallbackSampler<&ScriptedTransport> {
        FallbackSampler::new(
            transport,
            ProbeTarget::parse_all(&[ICON_A, ICON_B, SMALL]).unwrap(),
            Url::parse(UP).unwrap(),
            DEFAULT_FALLBACK_UPLOAD_BYTES,
            Duration::from_millis(DEFAULT_FALLBACK_TIMEOUT_MS),
        )
    }

    fn small_body(delay_ms: u64, bytes: u64) -> Script {
        Script::body(
            Duration::ZERO,
            vec![Step::Wait(Duration::from_millis(delay_ms)), Step::Bytes(bytes)],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregates_bytes_over_total_wall_time() {
        let transport = ScriptedTransport::new()
            .script(ICON_A, small_body(100, 5_000))
            .script(ICON_B, small_body(100, 5_000))
            .script(SMALL, small_body(300, 15_000))
            .script(UP, small_body(8, 1024));

        let estimate = sampler(&transport).run().await.unwrap();

        // 25_000 bytes over 500 ms = 0.4 Mbps
        assert_eq!(estimate.download.bytes_transferred, 25_000);
        assert!((estimate.download.speed_mbps - 0.4).abs() < 1e-9);
        // 1024 bytes over 8 ms
        assert!((estimate.upload.speed_mbps - 1.024).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_targets_are_skipped_in_order() {
        let transport = ScriptedTransport::new()
            .script(ICON_A, Script::refuse(Duration::from_millis(50)))
            .script(ICON_B, small_body(100, 10_000))
            .script(SMALL, small_body(50, 10_000))
            .script(UP, small_body(10, 1024));

        let estimate = sampler(&transport).run().await.unwrap();

        assert_eq!(estimate.download.bytes_transferred, 20_000);
        // The failed attempt's time still counts toward the batch
        assert!((estimate.download.elapsed_seconds - 0.2).abs() < 1e-9);

        let fetches: Vec<String> = transport
            .calls()
            .into_iter()
            .filter(|call| call.method == Method::Fetch)
            .map(|call| call.url)
            .collect();
        assert_eq!(fetches, vec![ICON_A, ICON_B, SMALL]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_download_success_reports_zero() {
        let transport =
            ScriptedTransport::new().script(UP, small_body(10, 1024));

        let estimate = sampler(&transport).run().await.unwrap();

        assert_eq!(estimate.download.speed_mbps, 0.0);
        assert!(estimate.upload.speed_mbps > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_reports_zero() {
        let transport = ScriptedTransport::new()
            .script(ICON_A, small_body(10, 1_000))
            .script(UP, Script::refuse(Duration::from_millis(10)));

        let estimate = sampler(&transport).run().await.unwrap();

        assert!(estimate.download.speed_mbps > 0.0);
        assert_eq!(estimate.upload.speed_mbps, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_sends_small_payload() {
        let transport =
            ScriptedTransport::new().script(UP, small_body(10, 1024));

        sampler(&transport).run().await.unwrap();

        let upload = transport
            .calls()
            .into_iter()
            .find(|call| call.method == Method::Send)
            .unwrap();
        assert_eq!(upload.payload_bytes, 1024);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_target_is_cut_off() {
        let transport = ScriptedTransport::new()
            .script(ICON_A, small_body(60_000, 1_000))
            .script(ICON_B, small_body(100, 2_000))
            .script(UP, small_body(10, 1024));

        let estimate = sampler(&transport).run().await.unwrap();

        assert_eq!(estimate.download.bytes_transferred, 2_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_reachable_fails() {
        let transport = ScriptedTransport::new();

        let result = sampler(&transport).run().await;

        assert!(matches!(
            result,
            Err(ProbeError::FallbackFailed { attempts: 4 })
        ));
    }
}
