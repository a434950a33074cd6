//! Realtime Database REST client.
//!
//! DESIGN
//! ======
//! Writes are plain `PATCH`/`DELETE` calls on `{db}/{path}.json`. Value
//! subscriptions use the streaming endpoint (`Accept: text/event-stream`):
//! the backend sends `put`/`patch` events relative to the subscribed path,
//! which are folded into a local `ValueCache` so every event can be surfaced
//! as a full snapshot of the path.
//!
//! ERROR HANDLING
//! ==============
//! Write failures are returned to the caller untouched. A stream that fails
//! or is cancelled by the backend (`cancel`, `auth_revoked`) is logged and
//! ends the listener; there is no reconnect.

#[cfg(test)]
#[path = "rtdb_test.rs"]
mod rtdb_test;

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::auth::AuthSession;
use super::{Database, DbError, Listener, Snapshot};
use crate::config::FirebaseConfig;

// =============================================================================
// CLIENT
// =============================================================================

pub struct RtdbClient {
    http: reqwest::Client,
    /// Streaming requests must outlive the request timeout.
    stream_http: reqwest::Client,
    base_url: String,
    auth: AuthSession,
}

impl RtdbClient {
    /// # Errors
    ///
    /// Returns [`DbError::HttpClientBuild`] if an HTTP client cannot be built.
    pub fn new(config: &FirebaseConfig, auth: AuthSession) -> Result<Self, DbError> {
        let connect = Duration::from_secs(config.timeouts.connect_secs);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(connect)
            .build()
            .map_err(|e| DbError::HttpClientBuild(e.to_string()))?;
        let stream_http = reqwest::Client::builder()
            .connect_timeout(connect)
            .build()
            .map_err(|e| DbError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, stream_http, base_url: config.database_url.clone(), auth })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth.id_token() {
            Some(token) => request.query(&[("auth", token)]),
            None => request,
        }
    }
}

#[async_trait]
impl Database for RtdbClient {
    fn on_value(&self, path: &str) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();
        let request = self.with_auth(self.stream_http.get(self.url(path)).header(ACCEPT, "text/event-stream"));
        let path = path.to_string();

        let task = tokio::spawn(async move {
            match run_stream(request, &tx).await {
                Ok(()) => info!(%path, "value stream closed"),
                Err(e) => warn!(%path, error = %e, "value stream failed"),
            }
        });

        Listener::new(rx, Some(task))
    }

    async fn update(&self, path: &str, value: &Value) -> Result<(), DbError> {
        let request = self.with_auth(self.http.patch(self.url(path)).json(value));
        send_checked(request).await
    }

    async fn remove(&self, path: &str) -> Result<(), DbError> {
        let request = self.with_auth(self.http.delete(self.url(path)));
        send_checked(request).await
    }
}

async fn send_checked(request: reqwest::RequestBuilder) -> Result<(), DbError> {
    let response = request.send().await.map_err(|e| DbError::Request(e.to_string()))?;
    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(DbError::Response { status, body })
}

async fn run_stream(request: reqwest::RequestBuilder, tx: &mpsc::UnboundedSender<Snapshot>) -> Result<(), DbError> {
    let response = request.send().await.map_err(|e| DbError::Request(e.to_string()))?;
    let status = response.status().as_u16();
    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DbError::Response { status, body });
    }

    let mut stream = response.bytes_stream();
    let mut parser = SseParser::default();
    let mut cache = ValueCache::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DbError::Request(e.to_string()))?;
        for event in parser.feed(&chunk) {
            match apply_event(&mut cache, &event)? {
                StreamStep::Changed => {
                    if tx.send(cache.snapshot()).is_err() {
                        return Ok(());
                    }
                }
                StreamStep::Idle => {}
                StreamStep::Closed => {
                    warn!(event = %event.event, reason = %event.data, "backend closed value stream");
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}

// =============================================================================
// EVENT STREAM PARSING
// =============================================================================

/// One server-sent event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` decoder. Chunks may split events (and
/// UTF-8 sequences) at arbitrary byte offsets.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Append `chunk` and return every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some((end, sep_len)) = find_event_boundary(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + sep_len).take(end).collect();
            if let Some(event) = parse_event_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        events
    }
}

/// Offset of the first blank-line separator and its length.
fn find_event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_event_block(block: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event.event = value.to_string(),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if event.event.is_empty() && data_lines.is_empty() {
        return None;
    }
    event.data = data_lines.join("\n");
    Some(event)
}

// =============================================================================
// VALUE CACHE
// =============================================================================

/// Outcome of applying one stream event.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamStep {
    /// The cached value changed; emit a snapshot.
    Changed,
    /// Nothing to emit (keep-alive, unknown event).
    Idle,
    /// The backend revoked or cancelled the subscription.
    Closed,
}

#[derive(Deserialize)]
struct EventPayload {
    path: String,
    #[serde(default)]
    data: Value,
}

/// Fold a stream event into the cache.
///
/// # Errors
///
/// Returns [`DbError::Parse`] if a `put`/`patch` payload is malformed.
pub fn apply_event(cache: &mut ValueCache, event: &SseEvent) -> Result<StreamStep, DbError> {
    match event.event.as_str() {
        "put" | "patch" => {
            let payload: EventPayload =
                serde_json::from_str(&event.data).map_err(|e| DbError::Parse(e.to_string()))?;
            if event.event == "put" {
                cache.put(&payload.path, payload.data);
            } else {
                cache.patch(&payload.path, payload.data);
            }
            Ok(StreamStep::Changed)
        }
        "keep-alive" => Ok(StreamStep::Idle),
        "cancel" | "auth_revoked" => Ok(StreamStep::Closed),
        other => {
            debug!(event = other, "ignoring stream event");
            Ok(StreamStep::Idle)
        }
    }
}

/// Local copy of the value under a subscribed path.
#[derive(Debug, Default)]
pub struct ValueCache {
    root: Value,
}

impl ValueCache {
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.root
    }

    /// Replace the subtree at `path` (relative, `/`-separated). Null deletes.
    pub fn put(&mut self, path: &str, data: Value) {
        let segments = split_path(path);
        if data.is_null() {
            remove_at(&mut self.root, &segments);
        } else {
            set_at(&mut self.root, &segments, data);
        }
    }

    /// Replace each child of `data` under `path`, leaving siblings intact.
    pub fn patch(&mut self, path: &str, data: Value) {
        let children = match data {
            Value::Object(children) => children,
            other => {
                self.put(path, other);
                return;
            }
        };
        let base = path.trim_end_matches('/');
        for (key, value) in children {
            self.put(&format!("{base}/{key}"), value);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_value(&self.root)
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn set_at(node: &mut Value, segments: &[&str], data: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = data;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry((*first).to_string()).or_insert(Value::Null);
        set_at(child, rest, data);
    }
}

/// Remove the subtree at `segments`, pruning parents left empty.
fn remove_at(node: &mut Value, segments: &[&str]) {
    let Some((first, rest)) = segments.split_first() else {
        *node = Value::Null;
        return;
    };
    let Value::Object(map) = &mut *node else {
        return;
    };
    if let Some(child) = map.get_mut(*first) {
        remove_at(child, rest);
        if child.is_null() {
            map.remove(*first);
        }
    }
    if map.is_empty() {
        *node = Value::Null;
    }
}
