//! Drag write debouncing.
//!
//! Rapid position updates for a note during a drag are buffered: each
//! change moves the note locally right away and (re)starts a per-note
//! quiet-period timer. Only the latest buffered position is persisted
//! once the timer fires, so a ten-second drag costs one remote write
//! instead of hundreds. Timers are independent per note; dragging two
//! notes debounces each on its own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use noteboard_core::model::Position;
use tokio::task::JoinHandle;

use crate::error::SyncError;
use crate::reconciler::SyncReconciler;
use crate::remote::NotePatch;
use crate::store::SpaceStore;

struct PendingDrag {
    /// Invalidates a fired timer that lost the race to a newer change.
    generation: u64,
    space_id: String,
    user_id: String,
    position: Position,
    timer: JoinHandle<()>,
}

struct Inner {
    store: Arc<SpaceStore>,
    reconciler: Arc<SyncReconciler>,
    quiet_period: Duration,
    pending: Mutex<HashMap<String, PendingDrag>>,
    generation: AtomicU64,
}

impl Inner {
    fn pending(&self) -> MutexGuard<'_, HashMap<String, PendingDrag>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Per-note debouncer for drag position writes.
pub struct DragDebouncer {
    inner: Arc<Inner>,
}

impl DragDebouncer {
    pub fn new(
        store: Arc<SpaceStore>,
        reconciler: Arc<SyncReconciler>,
        quiet_period: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                reconciler,
                quiet_period,
                pending: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Record a new drag position: applied to the local store
    /// immediately, persisted only after the quiet period elapses with
    /// no further change for this note.
    pub fn position_changed(
        &self,
        space_id: &str,
        user_id: &str,
        note_id: &str,
        position: Position,
    ) {
        self.inner
            .store
            .update_note_optimistic(space_id, user_id, note_id, &NotePatch::position(position));

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut pending = self.inner.pending();
        if let Some(prev) = pending.remove(note_id) {
            prev.timer.abort();
        }

        let inner = self.inner.clone();
        let note = note_id.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(inner.quiet_period).await;
            let fired = {
                let mut pending = inner.pending();
                match pending.get(&note) {
                    Some(p) if p.generation == generation => pending.remove(&note),
                    _ => None,
                }
            };
            if let Some(p) = fired {
                if let Err(err) = inner
                    .reconciler
                    .update_note(&p.space_id, &p.user_id, &note, NotePatch::position(p.position))
                    .await
                {
                    log::warn!("debounced position write for {note} failed: {err}");
                }
            }
        });

        pending.insert(
            note_id.to_string(),
            PendingDrag {
                generation,
                space_id: space_id.to_string(),
                user_id: user_id.to_string(),
                position,
                timer,
            },
        );
    }

    /// Persist this note's buffered position now, cancelling its
    /// timer. No-op when nothing is buffered (timer already fired or
    /// never armed).
    pub async fn flush(&self, note_id: &str) -> Result<(), SyncError> {
        let taken = {
            let mut pending = self.inner.pending();
            pending.remove(note_id)
        };
        match taken {
            Some(p) => {
                p.timer.abort();
                self.inner
                    .reconciler
                    .update_note(&p.space_id, &p.user_id, note_id, NotePatch::position(p.position))
                    .await
            }
            None => Ok(()),
        }
    }

    /// Persist every buffered position now (space switch, shutdown).
    /// Failures are logged per note; the flush keeps going.
    pub async fn flush_all(&self) {
        let drained: Vec<(String, PendingDrag)> = {
            let mut pending = self.inner.pending();
            pending.drain().collect()
        };
        for (note_id, p) in drained {
            p.timer.abort();
            if let Err(err) = self
                .inner
                .reconciler
                .update_note(&p.space_id, &p.user_id, &note_id, NotePatch::position(p.position))
                .await
            {
                log::warn!("flush of buffered position for {note_id} failed: {err}");
            }
        }
    }

    /// Number of notes with a buffered, not-yet-persisted position.
    pub fn pending_count(&self) -> usize {
        self.inner.pending().len()
    }
}
