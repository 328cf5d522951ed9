//! Reconnecting subscription to the feed's event broadcast.
//!
//! One logical connection is kept alive for the life of the worker. Drops are
//! followed by exponential backoff; replayed events carrying an id that was
//! already delivered are suppressed. Events are handed to a single channel,
//! one at a time, so consumers never see concurrent deliveries.

use feedwake_common::FeedEvent;
use futures_util::StreamExt;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sse::{SseDecoder, SseFrame};
use crate::errors::FeedError;
use crate::settings::StreamSection;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Reconnect delay policy.
///
/// The delay doubles after every drop up to `max`. It only returns to
/// `initial` when the connection that just dropped had stayed up for at least
/// `stable_after`, so a flapping link keeps backing off.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    stable_after: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, stable_after: Duration) -> Self {
        Self {
            initial,
            max,
            stable_after,
            current: initial,
        }
    }

    pub fn from_settings(settings: &StreamSection) -> Self {
        Self::new(
            Duration::from_secs(settings.initial_backoff_secs),
            Duration::from_secs(settings.max_backoff_secs),
            Duration::from_secs(settings.stable_after_secs),
        )
    }

    /// Delay before the next attempt, given how long the last connection lasted.
    pub fn next_delay(&mut self, uptime: Duration) -> Duration {
        if uptime >= self.stable_after {
            self.current = self.initial;
        }
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }
}

/// Rolling set of delivered event ids, cleared every `window`.
#[derive(Debug)]
pub struct ReplayFilter {
    seen: HashSet<String>,
    window: Duration,
    cleared_at: Instant,
}

impl ReplayFilter {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            seen: HashSet::new(),
            window,
            cleared_at: now,
        }
    }

    /// True the first time `id` is seen within the current window.
    pub fn admit(&mut self, id: &str, now: Instant) -> bool {
        if now.duration_since(self.cleared_at) >= self.window {
            self.seen.clear();
            self.cleared_at = now;
        }
        self.seen.insert(id.to_string())
    }
}

/// Decode one SSE frame into a domain event. Malformed payloads yield `None`.
pub fn decode_frame(frame: &SseFrame) -> Option<FeedEvent> {
    let mut value: serde_json::Value = match serde_json::from_str(&frame.data) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, data = %truncate(&frame.data, 200), "Dropping malformed event payload");
            return None;
        }
    };

    if let (Some(obj), Some(event)) = (value.as_object_mut(), frame.event.as_ref())
        && !obj.contains_key("type")
    {
        obj.insert("type".to_string(), serde_json::Value::String(event.clone()));
    }

    match serde_json::from_value::<FeedEvent>(value) {
        Ok(event) => Some(event.with_frame_id(frame.id.clone())),
        Err(e) => {
            debug!(error = %e, event = ?frame.event, "Ignoring unrecognised event");
            None
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub struct EventStream {
    url: String,
    token: Option<String>,
    http: reqwest::Client,
    backoff: Backoff,
    replay: ReplayFilter,
    last_event_id: Option<String>,
    idle: Duration,
    cancel: CancellationToken,
}

impl EventStream {
    pub fn new(
        feed_url: &str,
        token: Option<String>,
        settings: &StreamSection,
    ) -> Result<Self, FeedError> {
        let url = format!("{}/api/events", feed_url.trim_end_matches('/'));
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|source| FeedError::Transport {
                url: url.clone(),
                source,
            })?;
        Ok(Self {
            url,
            token,
            http,
            backoff: Backoff::from_settings(settings),
            replay: ReplayFilter::new(
                Duration::from_secs(settings.dedup_window_secs),
                Instant::now(),
            ),
            last_event_id: None,
            idle: Duration::from_secs(settings.idle_timeout_secs),
            cancel: CancellationToken::new(),
        })
    }

    /// Token that closes the stream when cancelled.
    pub fn close_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Deliver events to `tx` until closed or the receiver goes away.
    pub async fn run(mut self, tx: mpsc::Sender<FeedEvent>) {
        let cancel = self.cancel.clone();
        loop {
            let mut connected_at = None;
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.pump(&tx, &mut connected_at) => result,
            };

            match result {
                Ok(()) => info!(url = %self.url, "Event stream closed by server"),
                Err(e) => warn!(error = %e, "Event stream disconnected"),
            }
            if tx.is_closed() {
                break;
            }

            let uptime = connected_at.map(|t: Instant| t.elapsed()).unwrap_or_default();
            let delay = self.backoff.next_delay(uptime);
            info!(uptime_secs = uptime.as_secs(), delay_secs = delay.as_secs(), "Reconnecting event stream");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("Event stream stopped");
    }

    async fn pump(
        &mut self,
        tx: &mpsc::Sender<FeedEvent>,
        connected_at: &mut Option<Instant>,
    ) -> Result<(), FeedError> {
        let mut request = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(id) = &self.last_event_id {
            request = request.header("Last-Event-ID", id.as_str());
        }

        let resp = request.send().await.map_err(|source| FeedError::Transport {
            url: self.url.clone(),
            source,
        })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        *connected_at = Some(Instant::now());
        info!(url = %self.url, "Event stream connected");

        let mut decoder = SseDecoder::new();
        let mut bytes = resp.bytes_stream();
        // Heartbeats count as traffic, so a silent link means a dead one.
        loop {
            let Ok(next) = tokio::time::timeout(self.idle, bytes.next()).await else {
                return Err(FeedError::Idle {
                    url: self.url.clone(),
                    idle_secs: self.idle.as_secs(),
                });
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|source| FeedError::Transport {
                url: self.url.clone(),
                source,
            })?;
            for frame in decoder.push(&chunk) {
                let Some(event) = decode_frame(&frame) else {
                    continue;
                };
                if !self.deliver(event, tx).await {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Returns false once the receiver is gone.
    async fn deliver(&mut self, event: FeedEvent, tx: &mpsc::Sender<FeedEvent>) -> bool {
        if event.is_heartbeat() {
            debug!("Heartbeat");
            return true;
        }
        if let Some(id) = event.event_id() {
            let id = id.to_string();
            if !self.replay.admit(&id, Instant::now()) {
                debug!(event_id = %id, "Skipping replayed event");
                return true;
            }
            self.last_event_id = Some(id);
        }
        tx.send(event).await.is_ok()
    }
}
