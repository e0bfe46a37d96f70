//! # noteboard-core — Shared data model for the noteboard sync engine
//!
//! A *space* is a shared collaborative session. Each participant owns a
//! column of sticky notes; the columns together form the space graph
//! that the sync layer keeps converged against the remote store.
//!
//! ```text
//! Space ── users: user_id → UserColumn ── notes: note_id → Note
//! ```
//!
//! ## Modules
//!
//! - [`model`] — `Space`, `UserColumn`, `Note` and the note attribute enums
//! - [`config`] — `BoardConfig` with environment overrides

pub mod config;
pub mod model;

pub use config::BoardConfig;
pub use model::{Note, NoteColor, NoteFont, Position, Space, UserColumn, TEMP_ID_PREFIX};
