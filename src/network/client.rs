use crate::errors::ErrorKind;
use crate::network::{ByteCounts, Transport, TransportError};
use futures::StreamExt;
use log::debug;
use reqwest::header::{
    HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, PRAGMA,
};
use reqwest::{Body, Client as ReqwestClient};
use std::error::Error;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Size of the body chunks an upload is split into.
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: ReqwestClient,
}

impl HttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = ReqwestClient::builder()
            .user_agent(format!("{}/{}", NAME, VERSION))
            .connect_timeout(CONNECT_TIMEOUT)
            .default_headers(no_cache_headers())
            .build()?;

        Ok(HttpClient { client })
    }
}

fn no_cache_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

    headers
}

impl Transport for HttpClient {
    async fn probe(&self, url: &Url) -> Result<(), TransportError> {
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        // Reaching the server is what counts, not the status it answers with
        debug!("HEAD {} -> {}", url, response.status());

        Ok(())
    }

    async fn fetch(&self, url: &Url) -> Result<ByteCounts, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| transport_error(url, e))?;

        debug!(
            "GET {} -> {} ({:?} bytes announced)",
            url,
            response.status(),
            response.content_length()
        );

        let target = url.clone();
        let counts = response.bytes_stream().map(move |chunk| {
            chunk
                .map(|bytes| bytes.len() as u64)
                .map_err(|e| transport_error(&target, e))
        });

        Ok(counts.boxed())
    }

    async fn send(
        &self,
        url: &Url,
        payload: Vec<u8>,
    ) -> Result<ByteCounts, TransportError> {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel::<u64>();
        let content_length = payload.len();

        let chunks: Vec<Vec<u8>> =
            payload.chunks(UPLOAD_CHUNK_BYTES).map(<[u8]>::to_vec).collect();
        let body = futures::stream::iter(chunks).map(move |chunk| {
            let _ = sent_tx.send(chunk.len() as u64);
            Ok::<_, std::io::Error>(chunk)
        });

        let request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, content_length)
            .body(Body::wrap_stream(body));

        debug!("POST {} ({} bytes)", url, content_length);

        let target = url.clone();
        let response = tokio::spawn(async move {
            request
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map(|_| ())
                .map_err(|e| transport_error(&target, e))
        });

        Ok(upload_progress(sent_rx, AbortOnDrop(response), url.clone()))
    }
}

/// Aborts the in-flight request when the progress stream is dropped.
struct AbortOnDrop(JoinHandle<Result<(), TransportError>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Yields each chunk size as the body is handed over, then waits for the
/// server's answer before ending.
fn upload_progress(
    sent_rx: mpsc::UnboundedReceiver<u64>,
    response: AbortOnDrop,
    url: Url,
) -> ByteCounts {
    futures::stream::unfold(
        (sent_rx, Some(response)),
        move |(mut sent_rx, response)| {
            let url = url.clone();
            async move {
                if let Some(sent) = sent_rx.recv().await {
                    return Some((Ok(sent), (sent_rx, response)));
                }

                let mut response = response?;
                let error = match (&mut response.0).await {
                    Ok(Ok(())) => return None,
                    Ok(Err(e)) => e,
                    Err(e) => TransportError::from_error(&url, &e),
                };

                Some((Err(error), (sent_rx, None)))
            }
        },
    )
    .boxed()
}

fn transport_error(url: &Url, error: reqwest::Error) -> TransportError {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    let mut transport_error = TransportError::new(url, message);
    if error.is_timeout() {
        transport_error.kind = ErrorKind::Timeout;
    } else if error.is_status() {
        transport_error.kind = ErrorKind::Api;
    }

    transport_error
}
