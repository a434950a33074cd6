//! Client-side state models.
//!
//! DESIGN
//! ======
//! State types here are plain data with pure transitions; the sync service
//! owns the live instance and publishes it through a `watch` channel.

pub mod boards;
