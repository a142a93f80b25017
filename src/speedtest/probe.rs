//! Single timed HTTP requests, bounded by a deadline and the run's abort token.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ProbeFailure, SpeedTestError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    Head,
    Get,
    Post,
}

impl From<ProbeMethod> for reqwest::Method {
    fn from(method: ProbeMethod) -> Self {
        match method {
            ProbeMethod::Head => reqwest::Method::HEAD,
            ProbeMethod::Get => reqwest::Method::GET,
            ProbeMethod::Post => reqwest::Method::POST,
        }
    }
}

/// The transport underneath every probe.
///
/// Implementations only perform the request; deadlines and cancellation are
/// applied by [`Prober`].
#[async_trait]
pub trait ProbeClient: Send + Sync {
    /// Send one request and resolve once the response has arrived.
    async fn send(
        &self,
        method: ProbeMethod,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<(), ProbeFailure>;

    /// GET `url` and report the length of every body chunk as it arrives.
    async fn stream(
        &self,
        url: &str,
        on_chunk: &mut (dyn FnMut(usize) + Send),
    ) -> Result<u64, ProbeFailure>;
}

/// `ProbeClient` over a shared `reqwest::Client`.
pub struct HttpProbeClient {
    client: reqwest::Client,
}

impl HttpProbeClient {
    pub fn new() -> Result<Self, SpeedTestError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("netscore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SpeedTestError::ClientBuild)?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl ProbeClient for HttpProbeClient {
    async fn send(
        &self,
        method: ProbeMethod,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<(), ProbeFailure> {
        let mut request = self.client.request(method.into(), url);
        if let Some(body) = body {
            request = request.body(body);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeFailure::HttpStatus(status.as_u16()));
        }
        Ok(())
    }

    async fn stream(
        &self,
        url: &str,
        on_chunk: &mut (dyn FnMut(usize) + Send),
    ) -> Result<u64, ProbeFailure> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeFailure::HttpStatus(status.as_u16()));
        }

        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProbeFailure::Decode(e.to_string()))?;
            received += chunk.len() as u64;
            on_chunk(chunk.len());
        }
        Ok(received)
    }
}

/// Applies the deadline and abort token to calls on a [`ProbeClient`].
#[derive(Clone)]
pub struct Prober {
    client: Arc<dyn ProbeClient>,
    cancel: CancellationToken,
}

impl Prober {
    pub fn new(client: Arc<dyn ProbeClient>, cancel: CancellationToken) -> Self {
        Self { client, cancel }
    }

    /// A prober whose token is cancelled with this one, or on its own.
    pub fn child(&self) -> Prober {
        Prober {
            client: Arc::clone(&self.client),
            cancel: self.cancel.child_token(),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Perform one request and return how long it took.
    pub async fn probe(
        &self,
        method: ProbeMethod,
        url: &str,
        body: Option<Bytes>,
        deadline: Duration,
    ) -> Result<Duration, ProbeFailure> {
        let start = Instant::now();
        self.bounded(deadline, self.client.send(method, url, body)).await?;
        Ok(start.elapsed())
    }

    /// Stream a GET body, reporting chunk sizes to `on_chunk`.
    ///
    /// On timeout the bytes already reported through `on_chunk` stay valid;
    /// callers decide whether a partial transfer counts.
    pub async fn stream(
        &self,
        url: &str,
        deadline: Duration,
        on_chunk: &mut (dyn FnMut(usize) + Send),
    ) -> Result<u64, ProbeFailure> {
        self.bounded(deadline, self.client.stream(url, on_chunk)).await
    }

    /// Sleep for `pause` unless the run is aborted first.
    pub async fn pause(&self, pause: Duration) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(pause) => {}
        }
    }

    async fn bounded<T>(
        &self,
        deadline: Duration,
        fut: impl Future<Output = Result<T, ProbeFailure>>,
    ) -> Result<T, ProbeFailure> {
        if self.cancel.is_cancelled() {
            return Err(ProbeFailure::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProbeFailure::Cancelled),
            outcome = tokio::time::timeout(deadline, fut) => {
                outcome.unwrap_or(Err(ProbeFailure::Timeout))
            }
        }
    }
}

static CACHE_BUST: AtomicU64 = AtomicU64::new(0);

/// Append a token that makes the URL unique so no cache answers for the origin.
pub fn cache_busted(url: &str) -> String {
    let seq = CACHE_BUST.fetch_add(1, Ordering::Relaxed);
    let nonce = format!("{:x}{:04x}", chrono::Utc::now().timestamp_millis(), seq);
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}nocache={nonce}")
}
