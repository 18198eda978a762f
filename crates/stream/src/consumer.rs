// Client side of the order stream: one long-lived request per activation.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use serde::{Deserialize, Serialize};
use shop_models::OrderSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::decoder::{DecodeStats, UpdateDecoder};
use crate::error::{Result, StreamError};
use crate::message::EVENT_STREAM_CONTENT_TYPE;

pub const DEFAULT_STREAM_PATH: &str = "/api/v1/orders/stream";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub base_url: String,
    pub endpoint_path: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            endpoint_path: DEFAULT_STREAM_PATH.to_string(),
        }
    }
}

impl ConsumerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint_path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumerState {
    Idle,
    Connecting,
    Streaming,
}

/// Why a run returned. Only `Failed` is a problem; `Cancelled` is the
/// normal teardown path.
#[derive(Debug)]
pub enum ConsumerExit {
    EndOfStream,
    Cancelled,
    Failed(StreamError),
}

impl ConsumerExit {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConsumerExit::Cancelled)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ConsumerExit::Failed(_))
    }
}

#[derive(Debug, Default)]
struct ConsumerStats {
    connect_attempts: AtomicU64,
    transport_failures: AtomicU64,
    updates: AtomicU64,
    malformed: AtomicU64,
    ignored: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerStatsSnapshot {
    pub connect_attempts: u64,
    pub transport_failures: u64,
    pub updates: u64,
    pub malformed: u64,
    pub ignored: u64,
}

pub struct StreamConsumer {
    client: reqwest::Client,
    endpoint: String,
    state: watch::Sender<ConsumerState>,
    stats: ConsumerStats,
}

impl StreamConsumer {
    /// `client` carries the session credentials (cookie store, auth headers).
    pub fn new(client: reqwest::Client, config: &ConsumerConfig) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self {
            client,
            endpoint: config.endpoint(),
            state,
            stats: ConsumerStats::default(),
        }
    }

    /// Builds a client that keeps and replays session cookies.
    pub fn with_cookie_store(config: &ConsumerConfig) -> Result<Self> {
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self::new(client, config))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            connect_attempts: self.stats.connect_attempts.load(Ordering::Relaxed),
            transport_failures: self.stats.transport_failures.load(Ordering::Relaxed),
            updates: self.stats.updates.load(Ordering::Relaxed),
            malformed: self.stats.malformed.load(Ordering::Relaxed),
            ignored: self.stats.ignored.load(Ordering::Relaxed),
        }
    }

    /// Opens the stream and feeds every order update to `on_update` until
    /// the server ends the body, the transport fails or `cancel` fires.
    ///
    /// Never reconnects on its own. Failures are logged at debug level and
    /// reported through the returned [`ConsumerExit`], not the callback.
    pub async fn run<F>(&self, cancel: &CancellationToken, mut on_update: F) -> ConsumerExit
    where
        F: FnMut(OrderSnapshot) + Send,
    {
        self.stats.connect_attempts.fetch_add(1, Ordering::Relaxed);
        self.state.send_replace(ConsumerState::Connecting);
        tracing::debug!(endpoint = %self.endpoint, "opening order stream");

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            response = self.open() => Some(response),
        };

        let exit = match opened {
            None => ConsumerExit::Cancelled,
            Some(Err(e)) => ConsumerExit::Failed(e),
            Some(Ok(response)) => {
                self.state.send_replace(ConsumerState::Streaming);
                let mut decoder = UpdateDecoder::new();
                let exit = drive(response.bytes_stream(), cancel, &mut decoder, &mut on_update).await;
                self.record_decode(decoder.stats());
                exit
            }
        };

        match &exit {
            ConsumerExit::EndOfStream => tracing::debug!("order stream ended by server"),
            ConsumerExit::Cancelled => tracing::debug!("order stream cancelled"),
            ConsumerExit::Failed(e) => {
                self.stats.transport_failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(endpoint = %self.endpoint, "order stream failed: {}", e);
            }
        }

        self.state.send_replace(ConsumerState::Idle);
        exit
    }

    async fn open(&self) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(&self.endpoint)
            .header(ACCEPT, EVENT_STREAM_CONTENT_TYPE)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::UnexpectedStatus(status.as_u16()));
        }
        Ok(response)
    }

    fn record_decode(&self, stats: DecodeStats) {
        self.stats.updates.fetch_add(stats.updates, Ordering::Relaxed);
        self.stats.malformed.fetch_add(stats.malformed, Ordering::Relaxed);
        self.stats.ignored.fetch_add(stats.ignored, Ordering::Relaxed);
    }
}

/// Reads `body` chunk by chunk until it ends, errors or `cancel` fires.
///
/// The pending read is raced against the token, so cancellation does not
/// wait for the next chunk or keep-alive to arrive.
pub async fn drive<S, E, F>(
    body: S,
    cancel: &CancellationToken,
    decoder: &mut UpdateDecoder,
    on_update: &mut F,
) -> ConsumerExit
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
    F: FnMut(OrderSnapshot),
{
    futures::pin_mut!(body);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ConsumerExit::Cancelled,
            next = body.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                for order in decoder.push(&chunk) {
                    on_update(order);
                }
            }
            Some(Err(e)) => return ConsumerExit::Failed(StreamError::Transport(e.to_string())),
            None => {
                if let Some(order) = decoder.finish() {
                    on_update(order);
                }
                return ConsumerExit::EndOfStream;
            }
        }
    }
}
