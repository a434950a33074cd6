//! Domain services built on the database and routing seams.

pub mod boards;
