//! Local board list reconciled from remote snapshots.
//!
//! DESIGN
//! ======
//! `BoardList` is an ordered map: records keyed by id plus a sort index of
//! ids kept in listing order (stamp descending). Lookups are O(1); the index
//! is re-sorted once per snapshot, after every child has been upserted.
//! The sort is stable, so boards with equal stamps keep the order they had
//! before the snapshot, with newly seen boards after existing ones.
//!
//! The list is a cache. Keys absent from a later snapshot are not evicted;
//! the remote store stays the source of truth.

#[cfg(test)]
#[path = "boards_test.rs"]
mod boards_test;

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::db::Snapshot;
use crate::types::Board;

// =============================================================================
// SYNC STATUS
// =============================================================================

/// Progress of the first snapshot round-trip for the current subscription.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyncStatus {
    /// No snapshot has arrived yet.
    #[default]
    Init,
    /// The first snapshot is being applied. Transient: the whole snapshot is
    /// folded in one state update, so observers go from `Init` to `Stale`.
    Fetching,
    /// The first snapshot has been fully applied; absence is now meaningful.
    Stale,
}

// =============================================================================
// BOARD LIST
// =============================================================================

#[derive(Clone, Debug, Default)]
pub struct BoardList {
    entries: HashMap<String, Board>,
    order: Vec<String>,
}

impl BoardList {
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Board> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Boards in listing order.
    pub fn iter(&self) -> impl Iterator<Item = &Board> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Board> {
        self.iter().cloned().collect()
    }

    /// Insert or replace a board by key. New keys go to the end of the index
    /// until the next [`BoardList::resort`]. Returns `true` for a new key.
    pub fn upsert(&mut self, board: Board) -> bool {
        let is_new = !self.entries.contains_key(&board.key);
        if is_new {
            self.order.push(board.key.clone());
        }
        self.entries.insert(board.key.clone(), board);
        is_new
    }

    pub fn remove(&mut self, id: &str) -> Option<Board> {
        let removed = self.entries.remove(id)?;
        self.order.retain(|key| key != id);
        Some(removed)
    }

    /// Stable sort of the index by stamp, newest first.
    pub fn resort(&mut self) {
        let entries = &self.entries;
        let stamp = |id: &String| entries.get(id).map_or(0.0, |b| b.meta.stamp);
        self.order.sort_by(|a, b| stamp(b).total_cmp(&stamp(a)));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

// =============================================================================
// BOARDS STATE
// =============================================================================

/// Everything observers of the sync service can see.
#[derive(Clone, Debug, Default)]
pub struct BoardsState {
    pub boards: BoardList,
    pub status: SyncStatus,
    /// Board created in this session whose first snapshot may not have
    /// arrived yet.
    pub new_board: Option<String>,
    /// Boards deleted in this session. A view still open on one of them is
    /// not sent to the not-found route.
    pub deleted: HashSet<String>,
    /// The subscription closed (stream failure, cancel, revoked token)
    /// before a new one was opened.
    pub ended: bool,
}

impl BoardsState {
    /// Fold one pushed snapshot into the list.
    ///
    /// Each child replaces (or appends) the board with its key; the index is
    /// then re-sorted. Children that do not decode as boards are skipped.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        if self.status == SyncStatus::Init {
            self.status = SyncStatus::Fetching;
        }

        for child in snapshot.children() {
            match Board::from_child(&child.key, &child.value) {
                Ok(board) => {
                    self.boards.upsert(board);
                }
                Err(e) => warn!(key = %child.key, error = %e, "skipping undecodable board"),
            }
        }

        self.boards.resort();

        if self.status == SyncStatus::Fetching {
            self.status = SyncStatus::Stale;
        }
    }

    /// Drop all boards and start over at `Init`.
    pub fn reset(&mut self) {
        self.boards.clear();
        self.status = SyncStatus::Init;
        self.new_board = None;
        self.deleted.clear();
        self.ended = false;
    }

    /// Evict `id` after a successful remote delete.
    pub fn mark_deleted(&mut self, id: &str) {
        self.boards.remove(id);
        self.deleted.insert(id.to_string());
    }

    /// The board with `id`, or the onboarding template keyed as `id`.
    #[must_use]
    pub fn board_or_default(&self, id: &str) -> Board {
        self.boards.get(id).cloned().unwrap_or_else(|| Board::template(id))
    }

    /// Whether a view of `id` should be sent to the not-found route: the
    /// board is absent after the first full snapshot, is not the board being
    /// created in this session, and was not deleted in this session.
    #[must_use]
    pub fn is_missing(&self, id: &str) -> bool {
        self.status == SyncStatus::Stale
            && !self.boards.contains(id)
            && self.new_board.as_deref() != Some(id)
            && !self.deleted.contains(id)
    }
}
