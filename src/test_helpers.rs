//! In-memory doubles for the database and navigator seams.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, timeout};

use crate::db::auth::User;
use crate::db::{Database, DbError, Listener, Snapshot};
use crate::routes::Navigator;

pub fn test_user(uid: &str) -> User {
    User { uid: uid.to_string(), email: Some(format!("{uid}@example.test")), id_token: format!("token-{uid}") }
}

// =============================================================================
// DATABASE
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum Write {
    Update(String, Value),
    Remove(String),
}

/// Database double: records writes and lets tests push snapshots to
/// whoever is subscribed on a path.
#[derive(Default)]
pub struct MemoryDatabase {
    listeners: Mutex<Vec<(String, mpsc::UnboundedSender<Snapshot>)>>,
    writes: Mutex<Vec<Write>>,
    reject_writes: AtomicBool,
}

impl MemoryDatabase {
    /// Deliver `value` as a snapshot to every open listener on `path`.
    /// Returns how many listeners received it.
    pub fn push(&self, path: &str, value: &Value) -> usize {
        let snapshot = Snapshot::from_value(value);
        let listeners = self.listeners.lock().unwrap();
        listeners
            .iter()
            .filter(|(p, _)| p == path)
            .filter(|(_, tx)| tx.send(snapshot.clone()).is_ok())
            .count()
    }

    /// Paths with a listener that is still open.
    pub fn open_paths(&self) -> Vec<String> {
        let listeners = self.listeners.lock().unwrap();
        listeners
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Drop every listener on `path`, as a cancelled stream would.
    pub fn close(&self, path: &str) {
        self.listeners.lock().unwrap().retain(|(p, _)| p != path);
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    /// Make every subsequent write fail the way a rules rejection does.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Wait until exactly `paths` have open listeners.
    pub async fn wait_for_open_paths(&self, paths: &[&str]) {
        let expected: Vec<String> = paths.iter().map(|p| (*p).to_string()).collect();
        timeout(Duration::from_millis(500), async {
            while self.open_paths() != expected {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("open paths {:?} never became {expected:?}", self.open_paths()));
    }

    fn check_rejected(&self) -> Result<(), DbError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(DbError::Response { status: 401, body: "{\"error\":\"Permission denied\"}".into() });
        }
        Ok(())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn on_value(&self, path: &str) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().unwrap().push((path.to_string(), tx));
        Listener::new(rx, None)
    }

    async fn update(&self, path: &str, value: &Value) -> Result<(), DbError> {
        self.check_rejected()?;
        self.writes.lock().unwrap().push(Write::Update(path.to_string(), value.clone()));
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), DbError> {
        self.check_rejected()?;
        self.writes.lock().unwrap().push(Write::Remove(path.to_string()));
        Ok(())
    }
}

// =============================================================================
// NAVIGATOR
// =============================================================================

/// Navigator double that records every push.
pub struct RecordingNavigator {
    pushes: watch::Sender<Vec<String>>,
}

impl Default for RecordingNavigator {
    fn default() -> Self {
        let (pushes, _rx) = watch::channel(Vec::new());
        Self { pushes }
    }
}

impl RecordingNavigator {
    pub fn pushes(&self) -> Vec<String> {
        self.pushes.borrow().clone()
    }

    /// Wait until at least `count` pushes were recorded.
    pub async fn wait_for_pushes(&self, count: usize) -> Vec<String> {
        let mut rx = self.pushes.subscribe();
        let pushes = timeout(Duration::from_millis(500), rx.wait_for(|p| p.len() >= count))
            .await
            .expect("navigation timed out")
            .expect("navigator dropped")
            .clone();
        pushes
    }
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn push(&self, to: &str) {
        self.pushes.send_modify(|p| p.push(to.to_string()));
    }
}
