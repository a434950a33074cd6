//! Board sync service: live mirror of the signed-in user's boards.
//!
//! DESIGN
//! ======
//! One lifecycle task per service follows the auth session. When a user
//! signs in it subscribes to `Users/{uid}/Boards` and folds each pushed
//! snapshot into `BoardsState` with a single `send_modify`, so observers
//! never see a half-applied snapshot. When the user signs out (or changes)
//! the listener is dropped and the state reset to `Init`.
//!
//! A single instance serves the whole process: `init_shared` installs it,
//! `shared` hands it out, `teardown_shared` stops it. The instance outlives
//! sign-in cycles; only its subscription follows the auth session.
//!
//! ERROR HANDLING
//! ==============
//! Writes are not retried or caught: the backend error is returned to the
//! caller as `SyncError::Db`. Without a signed-in user no request is made.

#[cfg(test)]
#[path = "boards_test.rs"]
mod boards_test;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::auth::{AuthSession, AuthState};
use crate::db::{Database, DbError, Listener, Snapshot, board_path, user_boards_path};
use crate::routes::{NOT_FOUND_PATH, Navigator, Route, USER_PATH};
use crate::state::boards::{BoardsState, SyncStatus};
use crate::types::{Board, BoardRecord};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("not signed in")]
    NotAuthenticated,
    #[error("board subscription ended before the first snapshot")]
    SubscriptionEnded,
    #[error("database error: {0}")]
    Db(#[from] DbError),
    #[error("record encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

// =============================================================================
// SERVICE
// =============================================================================

pub struct BoardSync {
    db: Arc<dyn Database>,
    auth: AuthSession,
    nav: Arc<dyn Navigator>,
    state: Arc<watch::Sender<BoardsState>>,
    lifecycle: Mutex<Option<JoinHandle<()>>>,
}

impl BoardSync {
    /// Create the service and start following `auth`. Must be called inside
    /// a Tokio runtime.
    #[must_use]
    pub fn start(db: Arc<dyn Database>, auth: AuthSession, nav: Arc<dyn Navigator>) -> Arc<Self> {
        let (tx, _rx) = watch::channel(BoardsState::default());
        let state = Arc::new(tx);

        let task = tokio::spawn(run_lifecycle(db.clone(), auth.subscribe(), state.clone()));

        Arc::new(Self { db, auth, nav, state, lifecycle: Mutex::new(Some(task)) })
    }

    /// Observe the full state (list, status, pending board).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BoardsState> {
        self.state.subscribe()
    }

    /// Current boards in listing order.
    #[must_use]
    pub fn boards(&self) -> Vec<Board> {
        self.state.borrow().boards.to_vec()
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.state.borrow().status
    }

    /// Wait until the first snapshot of the current subscription is applied.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionEnded` if the subscription closes first (stream
    /// failure, cancelled or revoked access).
    pub async fn synced(&self) -> Result<(), SyncError> {
        let mut rx = self.state.subscribe();
        let status = rx
            .wait_for(|s| s.status == SyncStatus::Stale || s.ended)
            .await
            .map(|s| s.status)
            .map_err(|_| SyncError::SubscriptionEnded)?;
        if status == SyncStatus::Stale { Ok(()) } else { Err(SyncError::SubscriptionEnded) }
    }

    fn uid(&self) -> Result<String, SyncError> {
        self.auth.current_user().map(|u| u.uid).ok_or(SyncError::NotAuthenticated)
    }

    /// Merge `record` into the stored board `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without a user, or the backend error.
    pub async fn update_board(&self, id: &str, record: &BoardRecord) -> Result<(), SyncError> {
        let uid = self.uid()?;
        let value = serde_json::to_value(record)?;
        self.db.update(&board_path(&uid, id), &value).await.inspect_err(|e| {
            warn!(board_id = id, error = %e, "board update failed");
        })?;
        Ok(())
    }

    /// Delete board `id`, then navigate to the board list.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without a user, or the backend error. No
    /// navigation happens on error.
    pub async fn delete_board(&self, id: &str) -> Result<(), SyncError> {
        let uid = self.uid()?;
        self.db.remove(&board_path(&uid, id)).await.inspect_err(|e| {
            warn!(board_id = id, error = %e, "board delete failed");
        })?;

        // Removed records never reappear in a snapshot, so evict locally.
        // Open views of `id` are spared the not-found redirect.
        self.state.send_modify(|s| s.mark_deleted(id));
        info!(board_id = id, "board deleted");

        self.nav.push(USER_PATH).await;
        Ok(())
    }

    /// Create a board from the onboarding template and open it.
    ///
    /// The new id is marked pending before the write so that views opened on
    /// it are not sent to the not-found route ahead of its first snapshot.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without a user, or the backend error.
    pub async fn create_board(&self) -> Result<String, SyncError> {
        self.uid()?;
        let id = Uuid::new_v4().simple().to_string();
        self.state.send_modify(|s| s.new_board = Some(id.clone()));

        self.update_board(&id, &BoardRecord::stamped_template(now_ms())).await?;
        info!(board_id = %id, "board created");

        self.nav.push(&Route::Board(id.clone()).path()).await;
        Ok(id)
    }

    /// Live handle on board `id`.
    ///
    /// Reads fall back to the onboarding template while the board is absent.
    /// The handle also watches for the board being genuinely missing (see
    /// [`BoardsState::is_missing`]) and navigates to `/404` once when it is.
    #[must_use]
    pub fn use_board(&self, id: &str) -> BoardHandle {
        let rx = self.state.subscribe();
        let guard = tokio::spawn(redirect_when_missing(id.to_string(), self.state.subscribe(), self.nav.clone()));
        BoardHandle { id: id.to_string(), rx, guard }
    }

    /// Stop following the auth session and drop the subscription.
    pub fn shutdown(&self) {
        let task = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Drop for BoardSync {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[allow(clippy::cast_precision_loss)]
fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default() as f64
}

// =============================================================================
// LIFECYCLE
// =============================================================================

async fn run_lifecycle(
    db: Arc<dyn Database>,
    mut auth: watch::Receiver<AuthState>,
    state: Arc<watch::Sender<BoardsState>>,
) {
    let mut listener: Option<Listener> = None;
    let mut current_uid: Option<String> = None;

    loop {
        let uid = auth.borrow_and_update().user.as_ref().map(|u| u.uid.clone());
        if uid != current_uid {
            if let Some(mut old) = listener.take() {
                old.off();
            }
            if current_uid.is_some() {
                state.send_modify(BoardsState::reset);
            }

            match &uid {
                Some(uid) => {
                    info!(%uid, "subscribing to boards");
                    listener = Some(db.on_value(&user_boards_path(uid)));
                }
                None => {
                    if let Some(old_uid) = &current_uid {
                        info!(uid = %old_uid, "signed out; board subscription closed");
                    }
                }
            }
            current_uid = uid;
        }

        tokio::select! {
            changed = auth.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            snapshot = next_snapshot(&mut listener) => match snapshot {
                Some(snapshot) => state.send_modify(|s| s.apply_snapshot(&snapshot)),
                None => {
                    warn!("board subscription ended");
                    listener = None;
                    state.send_modify(|s| s.ended = true);
                }
            },
        }
    }
}

async fn next_snapshot(listener: &mut Option<Listener>) -> Option<Snapshot> {
    match listener {
        Some(listener) => listener.next().await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// BOARD HANDLE
// =============================================================================

/// Live view of one board. Dropping it stops its not-found watcher.
pub struct BoardHandle {
    id: String,
    rx: watch::Receiver<BoardsState>,
    guard: JoinHandle<()>,
}

impl BoardHandle {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The board, or the onboarding template keyed by this id.
    #[must_use]
    pub fn get(&self) -> Board {
        self.rx.borrow().board_or_default(&self.id)
    }

    /// Wait for the next state change and return the board afterwards.
    /// `None` once the service is gone.
    pub async fn changed(&mut self) -> Option<Board> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().board_or_default(&self.id))
    }
}

impl Drop for BoardHandle {
    fn drop(&mut self) {
        self.guard.abort();
    }
}

async fn redirect_when_missing(id: String, mut rx: watch::Receiver<BoardsState>, nav: Arc<dyn Navigator>) {
    loop {
        let missing = rx.borrow_and_update().is_missing(&id);
        if missing {
            info!(board_id = %id, "board not found; redirecting");
            nav.push(NOT_FOUND_PATH).await;
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

// =============================================================================
// SHARED INSTANCE
// =============================================================================

static SHARED: Mutex<Option<Arc<BoardSync>>> = Mutex::new(None);

/// Install the process-wide service, or return the one already installed.
///
/// Call once after the auth session exists; the service then follows every
/// sign-in and sign-out on its own. Must be called inside a Tokio runtime.
pub fn init_shared(db: Arc<dyn Database>, auth: AuthSession, nav: Arc<dyn Navigator>) -> Arc<BoardSync> {
    let mut slot = SHARED.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = slot.as_ref() {
        return existing.clone();
    }
    let sync = BoardSync::start(db, auth, nav);
    *slot = Some(sync.clone());
    sync
}

/// The installed service, if any.
#[must_use]
pub fn shared() -> Option<Arc<BoardSync>> {
    SHARED.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Stop and uninstall the process-wide service. Returns `false` if none
/// was installed.
pub fn teardown_shared() -> bool {
    let taken = SHARED.lock().unwrap_or_else(PoisonError::into_inner).take();
    match taken {
        Some(sync) => {
            sync.shutdown();
            true
        }
        None => false,
    }
}
