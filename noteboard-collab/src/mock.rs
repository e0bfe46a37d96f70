//! In-memory document store for tests and demos.
//!
//! Implements the full [`DocumentStore`] seam against a mutex-guarded
//! map, with a monotonic server clock for timestamps, sequenced
//! snapshot fan-out to subscribers after every mutation, a
//! fault-injection queue for exercising the retry policy, and call
//! counters the no-op/cap/debounce tests assert against.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use noteboard_core::model::{Space, UserColumn};
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::remote::{
    DocumentStore, NoteFields, NotePatch, NoteRecord, SnapshotEvent, SpaceRecord,
    SpaceSubscription, UserRecord,
};

const SUBSCRIBER_BUFFER: usize = 64;

#[derive(Default)]
struct Inner {
    spaces: HashMap<String, SpaceRecord>,
    /// space_id → membership records.
    users: HashMap<String, Vec<UserRecord>>,
    /// note_id → note record.
    notes: HashMap<String, NoteRecord>,
    /// space_id → live snapshot feeds.
    subscribers: HashMap<String, Vec<mpsc::Sender<SnapshotEvent>>>,
    /// Errors to fail upcoming data operations with, in order.
    faults: VecDeque<SyncError>,
}

/// Call counters for assertions ("zero network calls", "exactly one
/// write", "reconnected twice").
#[derive(Debug, Default)]
pub struct StoreCounters {
    adds: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    reconnects: AtomicU64,
}

impl StoreCounters {
    pub fn adds(&self) -> u64 {
        self.adds.load(Ordering::Relaxed)
    }
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }
}

/// In-memory [`DocumentStore`].
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    /// Monotonic server clock (timestamp source).
    clock: AtomicU64,
    /// Snapshot sequence counter.
    seq: AtomicU64,
    counters: StoreCounters,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            counters: StoreCounters::default(),
        }
    }

    pub fn counters(&self) -> &StoreCounters {
        &self.counters
    }

    /// Queue an error; the next data operation fails with it. Multiple
    /// queued faults fail successive operations in order.
    pub fn fail_next(&self, err: SyncError) {
        self.lock().faults.push_back(err);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn take_fault(inner: &mut Inner) -> Result<(), SyncError> {
        match inner.faults.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Assemble the full space view (users + their notes).
    fn assemble(inner: &Inner, space_id: &str) -> Space {
        let mut space = Space::new(space_id);
        for user in inner.users.get(space_id).into_iter().flatten() {
            let mut column = UserColumn::new(user.name.clone());
            column.email = user.email.clone();
            column.avatar = user.avatar.clone();
            space.users.insert(user.id.clone(), column);
        }
        for record in inner.notes.values() {
            if record.space_id != space_id {
                continue;
            }
            if let Some(column) = space.users.get_mut(&record.user_id) {
                column
                    .notes
                    .insert(record.id.clone(), record.clone().into_note());
            }
        }
        space
    }

    /// Push a fresh snapshot to every live subscriber of the space.
    fn broadcast(&self, inner: &mut Inner, space_id: &str) {
        if inner.subscribers.get(space_id).is_none_or(|s| s.is_empty()) {
            return;
        }
        let event = SnapshotEvent {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            space: Self::assemble(inner, space_id),
        };
        let Some(senders) = inner.subscribers.get_mut(space_id) else {
            return;
        };
        senders.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("snapshot feed for {space_id} lagging; dropping delivery");
                true
            }
        });
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_space(&self, space_id: &str) -> Result<SpaceRecord, SyncError> {
        let mut inner = self.lock();
        Self::take_fault(&mut inner)?;
        inner
            .spaces
            .get(space_id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("space {space_id}")))
    }

    async fn create_space(&self, space_id: &str) -> Result<(), SyncError> {
        let now = self.tick();
        let mut inner = self.lock();
        Self::take_fault(&mut inner)?;
        inner.spaces.insert(
            space_id.to_string(),
            SpaceRecord {
                id: space_id.to_string(),
                created_at: now,
                updated_at: now,
            },
        );
        self.broadcast(&mut inner, space_id);
        Ok(())
    }

    async fn get_users_in_space(&self, space_id: &str) -> Result<Vec<UserRecord>, SyncError> {
        let mut inner = self.lock();
        Self::take_fault(&mut inner)?;
        Ok(inner.users.get(space_id).cloned().unwrap_or_default())
    }

    async fn upsert_user_in_space(
        &self,
        space_id: &str,
        user: &UserRecord,
    ) -> Result<(), SyncError> {
        let mut inner = self.lock();
        Self::take_fault(&mut inner)?;
        if !inner.spaces.contains_key(space_id) {
            return Err(SyncError::NotFound(format!("space {space_id}")));
        }
        let members = inner.users.entry(space_id.to_string()).or_default();
        match members.iter_mut().find(|m| m.id == user.id) {
            Some(existing) => {
                // Merge: refresh profile fields, keep anything the
                // caller left unset.
                existing.name = user.name.clone();
                if user.email.is_some() {
                    existing.email = user.email.clone();
                }
                if user.avatar.is_some() {
                    existing.avatar = user.avatar.clone();
                }
            }
            None => members.push(user.clone()),
        }
        self.broadcast(&mut inner, space_id);
        Ok(())
    }

    async fn get_notes_in_space(&self, space_id: &str) -> Result<Vec<NoteRecord>, SyncError> {
        let mut inner = self.lock();
        Self::take_fault(&mut inner)?;
        Ok(inner
            .notes
            .values()
            .filter(|n| n.space_id == space_id)
            .cloned()
            .collect())
    }

    async fn add_note(&self, fields: &NoteFields) -> Result<NoteRecord, SyncError> {
        self.counters.adds.fetch_add(1, Ordering::Relaxed);
        let now = self.tick();
        let mut inner = self.lock();
        Self::take_fault(&mut inner)?;
        let record = NoteRecord {
            id: format!("note-{now}"),
            client_key: fields.client_key,
            space_id: fields.space_id.clone(),
            user_id: fields.user_id.clone(),
            title: fields.title.clone(),
            content: fields.content.clone(),
            color: fields.color,
            font: fields.font,
            position: fields.position,
            created_at: now,
            updated_at: now,
        };
        inner.notes.insert(record.id.clone(), record.clone());
        let space_id = record.space_id.clone();
        self.broadcast(&mut inner, &space_id);
        Ok(record)
    }

    async fn update_note(&self, note_id: &str, patch: &NotePatch) -> Result<(), SyncError> {
        self.counters.updates.fetch_add(1, Ordering::Relaxed);
        let now = self.tick();
        let mut inner = self.lock();
        Self::take_fault(&mut inner)?;
        let record = inner
            .notes
            .get_mut(note_id)
            .ok_or_else(|| SyncError::NotFound(format!("note {note_id}")))?;
        if let Some(title) = &patch.title {
            record.title = title.clone();
        }
        if let Some(content) = &patch.content {
            record.content = content.clone();
        }
        if let Some(color) = patch.color {
            record.color = color;
        }
        if let Some(font) = patch.font {
            record.font = font;
        }
        if let Some(position) = patch.position {
            record.position = position;
        }
        record.updated_at = now;
        let space_id = record.space_id.clone();
        self.broadcast(&mut inner, &space_id);
        Ok(())
    }

    async fn delete_note(&self, note_id: &str) -> Result<(), SyncError> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        Self::take_fault(&mut inner)?;
        let record = inner
            .notes
            .remove(note_id)
            .ok_or_else(|| SyncError::NotFound(format!("note {note_id}")))?;
        self.broadcast(&mut inner, &record.space_id);
        Ok(())
    }

    async fn subscribe_to_space(&self, space_id: &str) -> Result<SpaceSubscription, SyncError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut inner = self.lock();
        // Deliver the current state immediately, like a snapshot
        // listener does on attach.
        let initial = SnapshotEvent {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            space: Self::assemble(&inner, space_id),
        };
        tx.try_send(initial).ok();
        inner
            .subscribers
            .entry(space_id.to_string())
            .or_default()
            .push(tx);
        Ok(SpaceSubscription::new(space_id, rx))
    }

    async fn force_reconnect(&self) -> Result<(), SyncError> {
        self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
        log::debug!("force_reconnect");
        Ok(())
    }
}
