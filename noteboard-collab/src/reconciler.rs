//! Write-path reconciler.
//!
//! Every mutation follows the same shape: validate locally, apply to
//! the optimistic store, persist remotely with the retry policy, then
//! confirm or roll back. The optimistic apply and its rollback live
//! here, in one place, so the store stays a dumb state holder.
//!
//! Retry policy: only `Unavailable` failures are retried. Before each
//! retry the network channel is torn down and re-established, then the
//! reconciler backs off exponentially (base delay doubling per
//! attempt, capped). Terminal failures surface after rollback.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use noteboard_core::model::{
    valid_content, valid_title, Note, NoteColor, NoteFont, Position, Space, UserColumn,
};
use noteboard_core::BoardConfig;
use noteboard_layout::GridLayout;
use uuid::Uuid;

use crate::auth::UserIdentity;
use crate::error::SyncError;
use crate::remote::{DocumentStore, NoteFields, NotePatch, UserRecord};
use crate::store::SpaceStore;

/// Caller-supplied fields for a new note. Position is optional: when
/// absent the grid engine picks the first free cell.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub color: NoteColor,
    pub font: NoteFont,
    pub position: Option<Position>,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            color: NoteColor::default(),
            font: NoteFont::default(),
            position: None,
        }
    }
}

/// Reconciles optimistic local mutations with the remote store.
pub struct SyncReconciler {
    remote: Arc<dyn DocumentStore>,
    store: Arc<SpaceStore>,
    grid: GridLayout,
    config: BoardConfig,
    /// note_id → last remotely confirmed position. Position writes
    /// matching this entry are suppressed (drag ended where it began).
    confirmed_positions: Mutex<HashMap<String, Position>>,
}

impl SyncReconciler {
    pub fn new(
        remote: Arc<dyn DocumentStore>,
        store: Arc<SpaceStore>,
        grid: GridLayout,
        config: BoardConfig,
    ) -> Self {
        Self {
            remote,
            store,
            grid,
            config,
            confirmed_positions: Mutex::new(HashMap::new()),
        }
    }

    fn confirmed(&self) -> MutexGuard<'_, HashMap<String, Position>> {
        // A poisoned map only loses no-op suppression, never data.
        self.confirmed_positions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Run `op` under the retry policy: transient failures reconnect
    /// and back off, terminal failures return immediately.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let attempts = self.config.retry_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        log::info!("{what} succeeded after {attempt} retries");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt + 1 < attempts => {
                    log::warn!(
                        "{what} attempt {}/{attempts} failed: {err}; reconnecting",
                        attempt + 1
                    );
                    if let Err(rc) = self.remote.force_reconnect().await {
                        log::warn!("reconnect before retry failed: {rc}");
                    }
                    tokio::time::sleep(self.config.retry_delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    log::warn!("{what} failed terminally: {err}");
                    return Err(err);
                }
            }
        }
    }

    /// Create and persist a note in the caller's column.
    ///
    /// Validation and the per-user cap are checked before any remote
    /// call. The note appears immediately under a temporary id and is
    /// swapped for the confirmed record on success, or removed again on
    /// terminal failure.
    pub async fn add_note(
        &self,
        space_id: &str,
        user_id: &str,
        draft: NoteDraft,
    ) -> Result<Note, SyncError> {
        if !valid_title(&draft.title) {
            return Err(SyncError::Validation("note title must not be empty".into()));
        }
        if !valid_content(&draft.content) {
            return Err(SyncError::Validation(
                "note content must not be empty".into(),
            ));
        }

        let snapshot = self.store.snapshot();
        let limit = self.config.max_notes_per_user;
        let count = snapshot
            .space
            .as_ref()
            .map_or(0, |s| s.note_count(user_id));
        if count >= limit {
            return Err(SyncError::LimitExceeded { limit });
        }

        let position = match draft.position {
            Some(pos) => pos,
            None => {
                let existing = snapshot
                    .space
                    .as_ref()
                    .and_then(|s| s.users.get(user_id))
                    .map(|c| c.positions())
                    .unwrap_or_default();
                self.grid.compute_position(&existing)
            }
        };

        let client_key = Uuid::new_v4();
        let temp_id = Note::temp_id();
        self.store.add_note_optimistic(
            space_id,
            user_id,
            Note {
                id: temp_id.clone(),
                client_key,
                title: draft.title.clone(),
                content: draft.content.clone(),
                color: draft.color,
                font: draft.font,
                position,
                created_at: 0,
                updated_at: 0,
                user_id: user_id.to_string(),
            },
        );

        let fields = NoteFields {
            client_key,
            space_id: space_id.to_string(),
            user_id: user_id.to_string(),
            title: draft.title,
            content: draft.content,
            color: draft.color,
            font: draft.font,
            position,
        };
        let fields = &fields;
        match self
            .with_retry("add_note", move || self.remote.add_note(fields))
            .await
        {
            Ok(record) => {
                let confirmed = record.into_note();
                self.confirmed()
                    .insert(confirmed.id.clone(), confirmed.position);
                self.store
                    .confirm_note(space_id, user_id, &temp_id, confirmed.clone());
                Ok(confirmed)
            }
            Err(err) => {
                self.store.remove_note_optimistic(space_id, user_id, &temp_id);
                Err(err)
            }
        }
    }

    /// Persist a partial note update.
    ///
    /// A position-only patch that matches the last confirmed position
    /// is dropped without touching the network. On terminal failure
    /// the note reverts to its pre-update fields. Results landing
    /// after the user left `space_id` are discarded by the store.
    pub async fn update_note(
        &self,
        space_id: &str,
        user_id: &str,
        note_id: &str,
        patch: NotePatch,
    ) -> Result<(), SyncError> {
        if patch.is_empty() {
            return Ok(());
        }
        if let Some(title) = &patch.title {
            if !valid_title(title) {
                return Err(SyncError::Validation("note title must not be empty".into()));
            }
        }
        if let Some(content) = &patch.content {
            if !valid_content(content) {
                return Err(SyncError::Validation(
                    "note content must not be empty".into(),
                ));
            }
        }

        if patch.is_position_only() {
            let unchanged = match (patch.position, self.confirmed().get(note_id)) {
                (Some(target), Some(last)) => target == *last,
                _ => false,
            };
            if unchanged {
                log::debug!("skipping no-op position write for {note_id}");
                return Ok(());
            }
        }

        let prior = self.store.snapshot().note(user_id, note_id).cloned();
        self.store
            .update_note_optimistic(space_id, user_id, note_id, &patch);

        let patch_ref = &patch;
        match self
            .with_retry("update_note", move || {
                self.remote.update_note(note_id, patch_ref)
            })
            .await
        {
            Ok(()) => {
                if let Some(pos) = patch.position {
                    self.confirmed().insert(note_id.to_string(), pos);
                }
                Ok(())
            }
            Err(err) => {
                if let Some(prior) = prior {
                    self.store.update_note_optimistic(
                        space_id,
                        user_id,
                        note_id,
                        &Self::revert_patch(&prior),
                    );
                }
                Err(err)
            }
        }
    }

    /// Delete a note. Removed immediately, re-inserted unchanged on
    /// terminal failure (unless the user has left `space_id` by then).
    pub async fn remove_note(
        &self,
        space_id: &str,
        user_id: &str,
        note_id: &str,
    ) -> Result<(), SyncError> {
        let removed = self.store.remove_note_optimistic(space_id, user_id, note_id);
        match self
            .with_retry("delete_note", move || self.remote.delete_note(note_id))
            .await
        {
            Ok(()) => {
                self.confirmed().remove(note_id);
                Ok(())
            }
            Err(err) => {
                if let Some(note) = removed {
                    self.store.restore_note(space_id, user_id, note);
                }
                Err(err)
            }
        }
    }

    /// Create a new space document.
    pub async fn create_space(&self, space_id: &str) -> Result<(), SyncError> {
        self.with_retry("create_space", move || {
            self.remote.create_space(space_id)
        })
        .await
    }

    /// Join a space: verify it exists, register the user (merge
    /// semantics on repeat joins), and return the assembled view.
    ///
    /// `NotFound` propagates untouched so the caller can offer to
    /// create the space instead.
    pub async fn join_space(
        &self,
        space_id: &str,
        identity: &UserIdentity,
    ) -> Result<Space, SyncError> {
        let record = UserRecord::from(identity);
        let record = &record;
        self.with_retry("join_space", move || async move {
            self.remote.get_space(space_id).await?;
            self.remote.upsert_user_in_space(space_id, record).await?;
            self.assemble_space(space_id).await
        })
        .await
    }

    /// One-shot fetch of the full space view.
    pub async fn fetch_space(&self, space_id: &str) -> Result<Space, SyncError> {
        self.with_retry("fetch_space", move || self.assemble_space(space_id))
            .await
    }

    async fn assemble_space(&self, space_id: &str) -> Result<Space, SyncError> {
        let users = self.remote.get_users_in_space(space_id).await?;
        let notes = self.remote.get_notes_in_space(space_id).await?;

        let mut space = Space::new(space_id);
        for user in users {
            let mut column = UserColumn::new(user.name);
            column.email = user.email;
            column.avatar = user.avatar;
            space.users.insert(user.id, column);
        }
        for record in notes {
            let owner = record.user_id.clone();
            if let Some(column) = space.users.get_mut(&owner) {
                column.notes.insert(record.id.clone(), record.into_note());
            } else {
                log::debug!("note {} belongs to unknown user {owner}", record.id);
            }
        }
        Ok(space)
    }

    /// Patch restoring every field of `prior` (rollback inverse of an
    /// arbitrary partial update).
    fn revert_patch(prior: &Note) -> NotePatch {
        NotePatch {
            title: Some(prior.title.clone()),
            content: Some(prior.content.clone()),
            color: Some(prior.color),
            font: Some(prior.font),
            position: Some(prior.position),
        }
    }
}
