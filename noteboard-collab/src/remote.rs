//! Remote document store seam.
//!
//! The durable source of truth lives behind this trait: a document
//! store with snapshot-listener semantics (the production backend is a
//! hosted document database; tests use [`crate::mock::InMemoryStore`]).
//! The sync core only ever talks to it through these operations.

use async_trait::async_trait;
use noteboard_core::model::{Note, NoteColor, NoteFont, Position, Space};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::UserIdentity;
use crate::error::SyncError;

/// A space document as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceRecord {
    pub id: String,
    pub created_at: u64,
    pub updated_at: u64,
}

/// A user membership record within a space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

impl From<&UserIdentity> for UserRecord {
    fn from(identity: &UserIdentity) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            avatar: identity.avatar.clone(),
        }
    }
}

/// A note document as stored remotely (id + server timestamps set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: String,
    pub client_key: Uuid,
    pub space_id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub color: NoteColor,
    pub font: NoteFont,
    pub position: Position,
    pub created_at: u64,
    pub updated_at: u64,
}

impl NoteRecord {
    /// Convert to the in-memory model shape.
    pub fn into_note(self) -> Note {
        Note {
            id: self.id,
            client_key: self.client_key,
            title: self.title,
            content: self.content,
            color: self.color,
            font: self.font,
            position: self.position,
            created_at: self.created_at,
            updated_at: self.updated_at,
            user_id: self.user_id,
        }
    }
}

/// Write shape for a new note: everything the server does not assign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteFields {
    pub client_key: Uuid,
    pub space_id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub color: NoteColor,
    pub font: NoteFont,
    pub position: Position,
}

/// Partial note update. `None` fields are preserved (merge semantics).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub color: Option<NoteColor>,
    pub font: Option<NoteFont>,
    pub position: Option<Position>,
}

impl NotePatch {
    pub fn position(pos: Position) -> Self {
        Self {
            position: Some(pos),
            ..Default::default()
        }
    }

    /// Whether this patch only moves the note.
    pub fn is_position_only(&self) -> bool {
        self.position.is_some()
            && self.title.is_none()
            && self.content.is_none()
            && self.color.is_none()
            && self.font.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.color.is_none()
            && self.font.is_none()
            && self.position.is_none()
    }

    /// Merge into an existing note, preserving unspecified fields.
    pub fn apply_to(&self, note: &mut Note) {
        if let Some(title) = &self.title {
            note.title = title.clone();
        }
        if let Some(content) = &self.content {
            note.content = content.clone();
        }
        if let Some(color) = self.color {
            note.color = color;
        }
        if let Some(font) = self.font {
            note.font = font;
        }
        if let Some(position) = self.position {
            note.position = position;
        }
    }
}

/// One authoritative snapshot delivery.
///
/// `seq` increases monotonically per space; consumers use it to reject
/// stale deliveries that arrive after a newer snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEvent {
    pub seq: u64,
    pub space: Space,
}

/// Handle for an active space subscription.
///
/// Snapshot events for the space arrive on the receiver in delivery
/// order. Dropping the handle releases the remote listener — this is
/// the cancellation handle; there is at most one live subscription per
/// session.
pub struct SpaceSubscription {
    pub space_id: String,
    pub(crate) events: mpsc::Receiver<SnapshotEvent>,
}

impl SpaceSubscription {
    pub fn new(space_id: impl Into<String>, events: mpsc::Receiver<SnapshotEvent>) -> Self {
        Self {
            space_id: space_id.into(),
            events,
        }
    }

    /// Next snapshot, or `None` once the feed closes.
    pub async fn recv(&mut self) -> Option<SnapshotEvent> {
        self.events.recv().await
    }
}

/// Remote persistent store with snapshot-subscription support.
///
/// Failure taxonomy: `NotFound`, `PermissionDenied`, `Unavailable`
/// (the only transient class), `QuotaExceeded`, `Validation`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a space document. `NotFound` when absent.
    async fn get_space(&self, space_id: &str) -> Result<SpaceRecord, SyncError>;

    /// Create a space document with the given id.
    async fn create_space(&self, space_id: &str) -> Result<(), SyncError>;

    /// All user membership records for a space.
    async fn get_users_in_space(&self, space_id: &str) -> Result<Vec<UserRecord>, SyncError>;

    /// Add or refresh a user in a space. Merge semantics: repeated
    /// joins update profile fields without resetting notes.
    async fn upsert_user_in_space(
        &self,
        space_id: &str,
        user: &UserRecord,
    ) -> Result<(), SyncError>;

    /// All notes in a space, unordered.
    async fn get_notes_in_space(&self, space_id: &str) -> Result<Vec<NoteRecord>, SyncError>;

    /// Persist a new note; the server assigns id and timestamps.
    async fn add_note(&self, fields: &NoteFields) -> Result<NoteRecord, SyncError>;

    /// Apply a partial update to a note.
    async fn update_note(&self, note_id: &str, patch: &NotePatch) -> Result<(), SyncError>;

    /// Delete a note.
    async fn delete_note(&self, note_id: &str) -> Result<(), SyncError>;

    /// Open the snapshot feed for a space.
    async fn subscribe_to_space(&self, space_id: &str) -> Result<SpaceSubscription, SyncError>;

    /// Drop and re-establish the underlying network channel.
    async fn force_reconnect(&self) -> Result<(), SyncError>;
}
