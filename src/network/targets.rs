//! Static endpoint lists used by the probe, the samplers and the fallback.

use crate::errors::ProbeError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Reachability endpoints, in retry priority order.
pub const DEFAULT_PROBE_TARGETS: &[&str] = &[
    "https://www.google.com/favicon.ico",
    "https://www.cloudflare.com/favicon.ico",
    "https://httpbin.org/status/200",
    "https://api.github.com/zen",
];

/// Small resources fetched by the fallback download estimate.
pub const DEFAULT_FALLBACK_TARGETS: &[&str] = &[
    "https://www.google.com/favicon.ico",
    "https://www.cloudflare.com/favicon.ico",
    "https://github.com/favicon.ico",
    "https://speed.cloudflare.com/__down?bytes=10000",
];

pub(crate) static DOWNLOAD_URL: &str = "https://speed.cloudflare.com/__down";
pub(crate) static UPLOAD_URL: &str = "https://speed.cloudflare.com/__up";

/// A reachability endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeTarget {
    pub url: Url,
}

impl ProbeTarget {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Parse a list of URLs, keeping their order.
    pub fn parse_all<S: AsRef<str>>(
        inputs: &[S],
    ) -> Result<Vec<ProbeTarget>, ProbeError> {
        inputs.iter().map(|input| input.as_ref().parse()).collect()
    }

    pub fn defaults() -> Vec<ProbeTarget> {
        builtin(DEFAULT_PROBE_TARGETS)
    }

    pub fn fallback_defaults() -> Vec<ProbeTarget> {
        builtin(DEFAULT_FALLBACK_TARGETS)
    }
}

impl FromStr for ProbeTarget {
    type Err = ProbeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input).map_err(|e| ProbeError::InvalidTarget {
            input: input.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => Ok(ProbeTarget { url }),
            scheme => Err(ProbeError::InvalidTarget {
                input: input.to_string(),
                reason: format!("unsupported scheme '{}'", scheme),
            }),
        }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.url.fmt(f)
    }
}

/// URL of the large download resource for `bytes` bytes.
pub fn download_url(base: &Url, bytes: u64) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().clear().append_pair("bytes", &bytes.to_string());
    url
}

pub(crate) fn static_url(raw: &'static str) -> Url {
    Url::parse(raw).unwrap_or_else(|e| panic!("invalid built-in URL {}: {}", raw, e))
}

fn builtin(list: &[&'static str]) -> Vec<ProbeTarget> {
    list.iter().map(|raw| ProbeTarget::new(static_url(raw))).collect()
}
