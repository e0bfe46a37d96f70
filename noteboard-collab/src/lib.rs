//! # noteboard-collab — Realtime state synchronization core
//!
//! Reconciles a local optimistic view of a shared sticky-notes space
//! against a remote authoritative document store.
//!
//! ## Architecture
//!
//! ```text
//! UI intent
//!    │
//!    ▼
//! ┌──────────────┐  optimistic   ┌───────────────┐
//! │ SyncReconciler│ ───────────► │  SpaceStore   │ ──► watch subscribers
//! │ (retry/backoff)              │ (atomic swaps)│
//! └──────┬───────┘               └───────▲───────┘
//!        │ persist (retry + backoff)     │ snapshots (ordered)
//!        ▼                               │
//! ┌──────────────┐   subscribe   ┌───────┴───────┐
//! │ DocumentStore│ ◄──────────── │SessionManager │
//! │ (remote seam)│               │ (one listener)│
//! └──────────────┘               └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`error`] — `SyncError` taxonomy with transient/terminal split
//! - [`remote`] — `DocumentStore` seam: records, patches, subscriptions
//! - [`auth`] — `IdentityProvider` seam
//! - [`store`] — optimistic state store with atomic snapshot swaps
//! - [`reconciler`] — persistence with retry, backoff, reconnection
//! - [`debounce`] — per-note drag coalescing
//! - [`session`] — space/session lifecycle state machine
//! - [`mock`] — in-memory document store for tests and demos

pub mod auth;
pub mod debounce;
pub mod error;
pub mod mock;
pub mod reconciler;
pub mod remote;
pub mod session;
pub mod store;

pub use auth::{IdentityProvider, StaticIdentityProvider, UserIdentity};
pub use debounce::DragDebouncer;
pub use error::SyncError;
pub use mock::InMemoryStore;
pub use reconciler::{NoteDraft, SyncReconciler};
pub use remote::{
    DocumentStore, NoteFields, NotePatch, NoteRecord, SnapshotEvent, SpaceRecord,
    SpaceSubscription, UserRecord,
};
pub use session::{SessionManager, SessionState};
pub use store::{BoardState, SpaceStore};
