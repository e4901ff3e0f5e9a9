//! The seam between the measurement engine and the host networking API.
//!
//! Every component that touches the network does so through [`Transport`],
//! so the engine can be driven by `reqwest` in production and by a scripted
//! transport in tests.

use crate::errors::{classify_error, ErrorKind};
use futures::stream::BoxStream;
use std::error::Error;
use std::fmt;
use url::Url;

pub mod client;
pub mod targets;

#[cfg(test)]
pub(crate) mod testing;

pub use client::HttpClient;
pub use targets::ProbeTarget;

/// Sizes of the chunks moved by a transfer, in the order they were moved.
///
/// The stream ends when the transfer is complete, and yields an error if the
/// transfer breaks off.
pub type ByteCounts = BoxStream<'static, Result<u64, TransportError>>;

/// A failure reported by a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportError {
    /// The URL being contacted.
    pub url: String,
    /// Message from the underlying client.
    pub message: String,
    /// Classification of the failure.
    pub kind: ErrorKind,
}

impl TransportError {
    pub fn new(url: &Url, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = classify_error(&std::io::Error::other(message.clone()));
        Self { url: url.to_string(), message, kind }
    }

    /// Build from any error, keeping its message and classification.
    pub fn from_error(url: &Url, error: &dyn Error) -> Self {
        Self {
            url: url.to_string(),
            message: error.to_string(),
            kind: classify_error(error),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.url)
    }
}

impl Error for TransportError {}

/// Minimal request/response operations the engine needs.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Issue a minimal, uncached request to `url`.
    ///
    /// Any response counts as reachable, whatever its status.
    async fn probe(&self, url: &Url) -> Result<(), TransportError>;

    /// Fetch `url` and stream the sizes of the received body chunks.
    async fn fetch(&self, url: &Url) -> Result<ByteCounts, TransportError>;

    /// Submit `payload` to `url` and stream the sizes of the chunks handed to
    /// the connection. The stream ends once the response has arrived.
    async fn send(
        &self,
        url: &Url,
        payload: Vec<u8>,
    ) -> Result<ByteCounts, TransportError>;
}

impl<T: Transport> Transport for &T {
    async fn probe(&self, url: &Url) -> Result<(), TransportError> {
        (**self).probe(url).await
    }

    async fn fetch(&self, url: &Url) -> Result<ByteCounts, TransportError> {
        (**self).fetch(url).await
    }

    async fn send(
        &self,
        url: &Url,
        payload: Vec<u8>,
    ) -> Result<ByteCounts, TransportError> {
        (**self).send(url, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_classified_from_message() {
        let url = Url::parse("https://example.com/").unwrap();
        let error = TransportError::new(&url, "operation timed out");
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert_eq!(
            error.to_string(),
            "operation timed out (https://example.com/)"
        );
    }

    #[test]
    fn test_transport_error_from_io_error() {
        let url = Url::parse("https://example.com/").unwrap();
        let io = std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        );
        let error = TransportError::from_error(&url, &io);
        assert_eq!(error.kind, ErrorKind::Network);
    }
}
