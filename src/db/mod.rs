//! Remote database seam: snapshots, listeners, and the `Database` trait.
//!
//! DESIGN
//! ======
//! The sync service only needs three operations from the backend: a
//! continuous value subscription, a merge-update, and a remove. Keeping them
//! behind a trait lets the service run against the REST client in production
//! and an in-memory store in tests.

pub mod auth;
pub mod rtdb;

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The HTTP request could not be sent or its body not read.
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status (e.g. 401 when the
    /// security rules reject an unauthenticated write).
    #[error("backend rejected request: status {status}")]
    Response { status: u16, body: String },

    /// A stream event payload was not valid JSON.
    #[error("payload parse failed: {0}")]
    Parse(String),

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

// =============================================================================
// PATHS
// =============================================================================

/// Collection path holding every board of `uid`.
#[must_use]
pub fn user_boards_path(uid: &str) -> String {
    format!("Users/{uid}/Boards")
}

/// Record path of a single board.
#[must_use]
pub fn board_path(uid: &str, board_id: &str) -> String {
    format!("Users/{uid}/Boards/{board_id}")
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// A single child record of a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct ChildSnapshot {
    pub key: String,
    pub value: serde_json::Value,
}

/// Point-in-time value of a subscribed path, split into its children.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    children: Vec<ChildSnapshot>,
}

impl Snapshot {
    /// Children of `value` in key order. Null children are dropped; a
    /// non-object value has no children.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Self {
        let children = value
            .as_object()
            .map(|map| {
                let mut children: Vec<ChildSnapshot> = map
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| ChildSnapshot { key: k.clone(), value: v.clone() })
                    .collect();
                children.sort_by(|a, b| a.key.cmp(&b.key));
                children
            })
            .unwrap_or_default();
        Self { children }
    }

    #[must_use]
    pub fn children(&self) -> &[ChildSnapshot] {
        &self.children
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

// =============================================================================
// LISTENER
// =============================================================================

/// Receiving end of a value subscription. Dropping it, or calling
/// [`Listener::off`], stops the backing stream task.
pub struct Listener {
    rx: mpsc::UnboundedReceiver<Snapshot>,
    task: Option<JoinHandle<()>>,
}

impl Listener {
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<Snapshot>, task: Option<JoinHandle<()>>) -> Self {
        Self { rx, task }
    }

    /// Next snapshot, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    pub fn off(&mut self) {
        self.rx.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.off();
    }
}

// =============================================================================
// DATABASE
// =============================================================================

#[async_trait]
pub trait Database: Send + Sync {
    /// Subscribe to the full value at `path`. A snapshot is delivered on
    /// every remote change, starting with the current value.
    fn on_value(&self, path: &str) -> Listener;

    /// Merge the top-level fields of `value` into the record at `path`.
    async fn update(&self, path: &str, value: &serde_json::Value) -> Result<(), DbError>;

    /// Delete the record at `path`.
    async fn remove(&self, path: &str) -> Result<(), DbError>;
}
