//! Single large transfer throughput sampling.
//!
//! A transfer is a lazy stream of [`TransferUpdate`]s: nothing is sent until
//! it is first polled, interim readings arrive at most once per throttle
//! window, and the stream ends after one `Complete` item or one error.
//! Dropping the stream abandons the transfer.

use crate::errors::ProbeError;
use crate::measurements::{ThroughputMeter, ThroughputSample};
use crate::network::targets::download_url;
use crate::network::{ByteCounts, Transport};
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use rand::RngCore;
use serde::Serialize;
use std::fmt;
use std::pin::pin;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use url::Url;

/// Default minimum interval between interim readings.
pub const DEFAULT_PROGRESS_THROTTLE_MS: u64 = 100;

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferPhase {
    Download,
    Upload,
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferPhase::Download => f.write_str("download"),
            TransferPhase::Upload => f.write_str("upload"),
        }
    }
}

/// An item produced by a running transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransferUpdate {
    /// Throttled interim reading.
    Progress(ThroughputSample),
    /// End-to-end reading, produced once when the transfer completes.
    Complete(ThroughputSample),
}

enum Transfer {
    Pending,
    Running { counts: ByteCounts, meter: ThroughputMeter, deadline: Instant },
    Done,
}

type Advance = Option<(Result<TransferUpdate, ProbeError>, Transfer)>;

/// Drives single download and upload transfers and measures their rate.
pub struct ThroughputSampler<T> {
    transport: T,
    download_url: Url,
    upload_url: Url,
    throttle: Duration,
}

impl<T: Transport> ThroughputSampler<T> {
    pub fn new(
        transport: T,
        download_url: Url,
        upload_url: Url,
        throttle: Duration,
    ) -> Self {
        Self { transport, download_url, upload_url, throttle }
    }

    /// Lazily download `size` bytes within `limit`.
    pub fn download(
        &self,
        size: u64,
        limit: Duration,
    ) -> impl Stream<Item = Result<TransferUpdate, ProbeError>> + '_ {
        self.transfer(TransferPhase::Download, size, limit)
    }

    /// Lazily upload `size` pseudorandom bytes within `limit`.
    pub fn upload(
        &self,
        size: u64,
        limit: Duration,
    ) -> impl Stream<Item = Result<TransferUpdate, ProbeError>> + '_ {
        self.transfer(TransferPhase::Upload, size, limit)
    }

    /// Run a download to completion, handing interim readings to
    /// `on_progress`.
    pub async fn sample_download(
        &self,
        size: u64,
        limit: Duration,
        on_progress: impl FnMut(&ThroughputSample),
    ) -> Result<ThroughputSample, ProbeError> {
        drain(self.download(size, limit), on_progress).await
    }

    /// Run an upload to completion, handing interim readings to
    /// `on_progress`.
    pub async fn sample_upload(
        &self,
        size: u64,
        limit: Duration,
        on_progress: impl FnMut(&ThroughputSample),
    ) -> Result<ThroughputSample, ProbeError> {
        drain(self.upload(size, limit), on_progress).await
    }

    fn transfer(
        &self,
        phase: TransferPhase,
        size: u64,
        limit: Duration,
    ) -> impl Stream<Item = Result<TransferUpdate, ProbeError>> + '_ {
        futures::stream::unfold(Transfer::Pending, move |state| async move {
            match state {
                Transfer::Pending => self.open(phase, size, limit).await,
                Transfer::Running { counts, meter, deadline } => {
                    advance(counts, meter, deadline, limit).await
                }
                Transfer::Done => None,
            }
        })
    }

    async fn open(&self, phase: TransferPhase, size: u64, limit: Duration) -> Advance {
        info!("Beginning {} transfer: {} bytes", phase, size);

        let payload = match phase {
            TransferPhase::Download => None,
            TransferPhase::Upload => Some(random_payload(size)),
        };

        let meter = ThroughputMeter::start(self.throttle);
        let deadline = Instant::now() + limit;

        let opened = match payload {
            None => {
                let url = download_url(&self.download_url, size);
                timeout_at(deadline, self.transport.fetch(&url)).await
            }
            Some(payload) => {
                timeout_at(deadline, self.transport.send(&self.upload_url, payload))
                    .await
            }
        };

        match opened {
            Ok(Ok(counts)) => advance(counts, meter, deadline, limit).await,
            Ok(Err(e)) => {
                warn!("{} transfer failed to start: {}", phase, e);
                Some((Err(ProbeError::transfer(e)), Transfer::Done))
            }
            Err(_) => {
                warn!("{} transfer timed out before starting", phase);
                Some((Err(ProbeError::TransferTimeout { limit }), Transfer::Done))
            }
        }
    }
}

async fn advance(
    mut counts: ByteCounts,
    mut meter: ThroughputMeter,
    deadline: Instant,
    limit: Duration,
) -> Advance {
    loop {
        match timeout_at(deadline, counts.next()).await {
            Ok(Some(Ok(chunk))) => {
                if let Some(sample) = meter.record(chunk) {
                    debug!(
                        "{} bytes after {:.2}s: {:.2} Mbps",
                        sample.bytes_transferred,
                        sample.elapsed_seconds,
                        sample.speed_mbps
                    );
                    let running = Transfer::Running { counts, meter, deadline };
                    return Some((Ok(TransferUpdate::Progress(sample)), running));
                }
            }
            Ok(Some(Err(e))) => {
                warn!("Transfer broke off after {} bytes: {}", meter.bytes(), e);
                return Some((Err(ProbeError::transfer(e)), Transfer::Done));
            }
            Ok(None) => {
                let sample = meter.finish();
                info!(
                    "Transfer complete: {} bytes in {:.2}s ({:.2} Mbps)",
                    sample.bytes_transferred,
                    sample.elapsed_seconds,
                    sample.speed_mbps
                );
                return Some((Ok(TransferUpdate::Complete(sample)), Transfer::Done));
            }
            Err(_) => {
                warn!("Transfer timed out after {} bytes", meter.bytes());
                return Some((
                    Err(ProbeError::TransferTimeout { limit }),
                    Transfer::Done,
                ));
            }
        }
    }
}

async fn drain(
    updates: impl Stream<Item = Result<TransferUpdate, ProbeError>>,
    mut on_progress: impl FnMut(&ThroughputSample),
) -> Result<ThroughputSample, ProbeError> {
    let mut updates = pin!(updates);

    while let Some(update) = updates.next().await {
        match update? {
            TransferUpdate::Progress(sample) => on_progress(&sample),
            TransferUpdate::Complete(sample) => return Ok(sample),
        }
    }

    Err(ProbeError::transfer(std::io::Error::other(
        "transfer ended without a result",
    )))
}

/// Incompressible payload so compression cannot skew the measurement.
pub(crate) fn random_payload(size: u64) -> Vec<u8> {
    let mut data = vec![0u8; size as usize];
    rand::thread_rng().fill_bytes(&mut data);
    data
}
