//! Scripted in-memory transport for exercising the engine without a network.
//!
//! Each URL (host and path, query ignored) gets a [`Script`] describing how
//! long the connection takes and what happens afterwards. Delays use
//! `tokio::time`, so tests running with a paused clock are deterministic.

use crate::network::{ByteCounts, Transport, TransportError};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    Wait(Duration),
    Bytes(u64),
    Fail(&'static str),
}

#[derive(Debug, Clone)]
pub(crate) struct Script {
    connect: Duration,
    outcome: Result<Vec<Step>, &'static str>,
}

impl Script {
    /// Answers after `after`, with an empty body.
    pub(crate) fn reach(after: Duration) -> Self {
        Self { connect: after, outcome: Ok(Vec::new()) }
    }

    /// Fails to connect after `after`.
    pub(crate) fn refuse(after: Duration) -> Self {
        Self { connect: after, outcome: Err("connection refused") }
    }

    /// Connects after `connect`, then plays `steps` as the body.
    pub(crate) fn body(connect: Duration, steps: Vec<Step>) -> Self {
        Self { connect, outcome: Ok(steps) }
    }

    /// `chunks` chunks of `chunk` bytes, one every `every`.
    pub(crate) fn paced(
        connect: Duration,
        chunk: u64,
        every: Duration,
        chunks: usize,
    ) -> Self {
        let steps = (0..chunks)
            .flat_map(|_| [Step::Wait(every), Step::Bytes(chunk)])
            .collect();
        Self::body(connect, steps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Probe,
    Fetch,
    Send,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Call {
    pub method: Method,
    pub url: String,
    pub payload_bytes: usize,
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(self, url: &str, script: Script) -> Self {
        let url = Url::parse(url).expect("test URL");
        self.scripts.lock().unwrap().insert(key(&url), script);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn contacted(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.url).collect()
    }

    fn start(&self, method: Method, url: &Url, payload_bytes: usize) -> Script {
        self.calls.lock().unwrap().push(Call {
            method,
            url: url.to_string(),
            payload_bytes,
        });

        self.scripts
            .lock()
            .unwrap()
            .get(&key(url))
            .cloned()
            .unwrap_or_else(|| Script::refuse(Duration::ZERO))
    }

    async fn open(
        &self,
        method: Method,
        url: &Url,
        payload_bytes: usize,
    ) -> Result<ByteCounts, TransportError> {
        let script = self.start(method, url, payload_bytes);
        tokio::time::sleep(script.connect).await;

        let steps = script.outcome.map_err(|e| TransportError::new(url, e))?;
        let target = url.clone();

        let counts = futures::stream::unfold(
            steps.into_iter(),
            move |mut steps| {
                let target = target.clone();
                async move {
                    loop {
                        match steps.next()? {
                            Step::Wait(delay) => tokio::time::sleep(delay).await,
                            Step::Bytes(n) => return Some((Ok(n), steps)),
                            Step::Fail(message) => {
                                let error = TransportError::new(&target, message);
                                return Some((Err(error), Vec::new().into_iter()));
                            }
                        }
                    }
                }
            },
        );

        Ok(counts.boxed())
    }
}

fn key(url: &Url) -> String {
    format!("{}{}", url.host_str().unwrap_or_default(), url.path())
}

impl Transport for ScriptedTransport {
    async fn probe(&self, url: &Url) -> Result<(), TransportError> {
        let script = self.start(Method::Probe, url, 0);
        tokio::time::sleep(script.connect).await;
        script.outcome.map(|_| ()).map_err(|e| TransportError::new(url, e))
    }

    async fn fetch(&self, url: &Url) -> Result<ByteCounts, TransportError> {
        self.open(Method::Fetch, url, 0).await
    }

    async fn send(
        &self,
        url: &Url,
        payload: Vec<u8>,
    ) -> Result<ByteCounts, TransportError> {
        self.open(Method::Send, url, payload.len()).await
    }
}
