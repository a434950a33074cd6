//! # noteboard
//!
//! Client library for a live-synced note board app backed by a hosted
//! real-time database.
//!
//! The board sync service (`services::boards`) mirrors the signed-in user's
//! boards from `Users/{uid}/Boards`, applies pushed snapshots to an ordered
//! local list, and exposes create/update/delete plus a per-board live view.
//! Identity lives in `db::auth`, the REST/stream client in `db::rtdb`, and
//! route guards in `routes`.

pub mod config;
pub mod db;
pub mod routes;
pub mod services;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
