//! Sync failure taxonomy.
//!
//! The retry policy keys off a single question: is this failure worth
//! retrying? Only `Unavailable` (network/offline) is. Everything else
//! is terminal and surfaces to the caller, which owns the optimistic
//! rollback.

use thiserror::Error;

/// Errors surfaced by the document store seam and the reconciler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Space or note absent. Never retried; the caller may prompt the
    /// user to create the space.
    #[error("not found: {0}")]
    NotFound(String),

    /// Fatal to the operation, surfaced as-is.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Network/offline/unavailable. Retried with reconnection and
    /// exponential backoff.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Remote quota exhausted. Terminal.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Per-user note cap hit. Rejected before any network call.
    #[error("note limit reached ({limit} notes per user)")]
    LimitExceeded { limit: usize },

    /// Rejected locally where feasible (empty title/content), before
    /// calling the collaborator.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl SyncError {
    /// Whether the retry policy should attempt this operation again.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Unavailable(_))
    }
}
