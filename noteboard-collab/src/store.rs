//! Optimistic state store.
//!
//! Holds the canonical in-memory view of the current space. Every
//! mutation is a pure function from the previous snapshot to a new
//! one, published through a `watch` channel as an atomic `Arc` swap —
//! no subscriber ever observes a half-updated state.
//!
//! Authoritative snapshots from the remote listener replace the space
//! slice wholesale (last-writer-wins per snapshot). Before publishing,
//! the grid collision-repair pass runs over every column; the pass is
//! idempotent, so re-applying an already-clean snapshot is a no-op and
//! identical re-deliveries never wake subscribers.

use std::sync::Arc;

use noteboard_core::model::{Note, Space, UserColumn};
use noteboard_layout::GridLayout;
use tokio::sync::watch;

use crate::remote::{NotePatch, SnapshotEvent};

/// Point-in-time view of the board.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardState {
    /// Selected space id (`None` = no space entered).
    pub current_space: Option<String>,
    /// Last applied space snapshot, including optimistic edits.
    pub space: Option<Space>,
    /// Sequence number of the last applied authoritative snapshot.
    pub last_seq: u64,
}

impl BoardState {
    fn empty() -> Self {
        Self {
            current_space: None,
            space: None,
            last_seq: 0,
        }
    }

    pub fn note(&self, user_id: &str, note_id: &str) -> Option<&Note> {
        self.space.as_ref()?.note(user_id, note_id)
    }
}

/// The optimistic state store.
///
/// Cheap to share (`Arc<SpaceStore>`); all mutation goes through the
/// action methods below, which serialize on the watch channel.
pub struct SpaceStore {
    tx: watch::Sender<Arc<BoardState>>,
    grid: GridLayout,
}

impl SpaceStore {
    pub fn new(grid: GridLayout) -> Self {
        let (tx, _) = watch::channel(Arc::new(BoardState::empty()));
        Self { tx, grid }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<BoardState> {
        self.tx.borrow().clone()
    }

    /// Subscribe to snapshot changes. Receivers are only woken when
    /// the state actually changed.
    pub fn subscribe(&self) -> watch::Receiver<Arc<BoardState>> {
        self.tx.subscribe()
    }

    /// Run a pure transition; publish only if the result differs.
    fn transition<F>(&self, f: F) -> bool
    where
        F: FnOnce(&BoardState) -> Option<BoardState>,
    {
        self.tx.send_if_modified(|state| match f(state.as_ref()) {
            Some(next) if next != **state => {
                *state = Arc::new(next);
                true
            }
            _ => false,
        })
    }

    /// Select (or clear) the current space.
    ///
    /// Changing spaces drops the held snapshot and resets the sequence
    /// cursor; data for the old space must not survive the switch.
    pub fn set_current_space(&self, space_id: Option<String>) {
        self.transition(|prev| {
            if prev.current_space == space_id {
                return None;
            }
            Some(BoardState {
                current_space: space_id,
                space: None,
                last_seq: 0,
            })
        });
    }

    /// Apply an authoritative snapshot from the remote listener.
    ///
    /// Deliveries are rejected when they target a space that is no
    /// longer current (in-flight results for a stale space/user
    /// pairing are discarded on arrival) or carry a sequence number
    /// below the last applied one (late deliveries of older
    /// snapshots). Same-content re-deliveries are tolerated silently.
    pub fn set_space_data(&self, event: SnapshotEvent) {
        self.transition(|prev| {
            match &prev.current_space {
                Some(current) if *current == event.space.id => {}
                _ => {
                    log::debug!(
                        "discarding snapshot for inactive space {}",
                        event.space.id
                    );
                    return None;
                }
            }
            if event.seq < prev.last_seq {
                log::debug!(
                    "discarding stale snapshot seq {} (last applied {})",
                    event.seq,
                    prev.last_seq
                );
                return None;
            }

            let mut space = event.space;
            for column in space.users.values_mut() {
                for (note_id, position) in self.grid.repair_column(column) {
                    if let Some(note) = column.notes.get_mut(&note_id) {
                        note.position = position;
                    }
                }
            }

            Some(BoardState {
                current_space: prev.current_space.clone(),
                space: Some(space),
                last_seq: event.seq,
            })
        });
    }

    /// Whether `space_id` is the currently selected space.
    ///
    /// Optimistic applies, confirmations, and rollbacks all carry the
    /// space they originated in; results that arrive after the user
    /// switched spaces must be discarded, not applied to the new
    /// snapshot.
    fn is_current(prev: &BoardState, space_id: &str) -> bool {
        prev.current_space.as_deref() == Some(space_id)
    }

    /// Insert a note into a user's column before remote confirmation.
    ///
    /// No-op when no space snapshot is held yet or when `space_id` is
    /// no longer current.
    pub fn add_note_optimistic(&self, space_id: &str, user_id: &str, note: Note) {
        self.transition(|prev| {
            if !Self::is_current(prev, space_id) {
                return None;
            }
            let mut space = prev.space.clone()?;
            space
                .users
                .entry(user_id.to_string())
                .or_insert_with(|| UserColumn::new(user_id))
                .notes
                .insert(note.id.clone(), note);
            Some(BoardState {
                space: Some(space),
                ..prev.clone()
            })
        });
    }

    /// Merge partial fields into an existing note. Unspecified fields
    /// are preserved; absent notes and inactive spaces are left alone.
    pub fn update_note_optimistic(
        &self,
        space_id: &str,
        user_id: &str,
        note_id: &str,
        patch: &NotePatch,
    ) {
        self.transition(|prev| {
            if !Self::is_current(prev, space_id) {
                return None;
            }
            let mut space = prev.space.clone()?;
            let note = space.users.get_mut(user_id)?.notes.get_mut(note_id)?;
            patch.apply_to(note);
            Some(BoardState {
                space: Some(space),
                ..prev.clone()
            })
        });
    }

    /// Remove a note, returning it for a potential failure re-insert.
    /// `None` when the note is absent or `space_id` is not current.
    pub fn remove_note_optimistic(
        &self,
        space_id: &str,
        user_id: &str,
        note_id: &str,
    ) -> Option<Note> {
        let snapshot = self.snapshot();
        if !Self::is_current(&snapshot, space_id) {
            return None;
        }
        let removed = snapshot.note(user_id, note_id).cloned();
        self.transition(|prev| {
            if !Self::is_current(prev, space_id) {
                return None;
            }
            let mut space = prev.space.clone()?;
            space.users.get_mut(user_id)?.notes.remove(note_id)?;
            Some(BoardState {
                space: Some(space),
                ..prev.clone()
            })
        });
        removed
    }

    /// Re-insert a note removed optimistically (rollback inverse).
    pub fn restore_note(&self, space_id: &str, user_id: &str, note: Note) {
        self.add_note_optimistic(space_id, user_id, note);
    }

    /// Atomically replace a pending entry with its confirmed note.
    ///
    /// The pending entry is matched by temp id, falling back to the
    /// client idempotency key in case an authoritative refresh already
    /// rewrote the column. The confirmed note lands in the same
    /// logical slot. A confirmation arriving after the user switched
    /// away from `space_id` is discarded.
    pub fn confirm_note(&self, space_id: &str, user_id: &str, temp_id: &str, confirmed: Note) {
        self.transition(|prev| {
            if !Self::is_current(prev, space_id) {
                log::debug!(
                    "discarding confirmation of {} for inactive space {space_id}",
                    confirmed.id
                );
                return None;
            }
            let mut space = prev.space.clone()?;
            let column = space.users.get_mut(user_id)?;
            if column.notes.remove(temp_id).is_none() {
                let stale: Vec<String> = column
                    .notes
                    .iter()
                    .filter(|(id, n)| n.client_key == confirmed.client_key && **id != confirmed.id)
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in stale {
                    column.notes.remove(&id);
                }
            }
            column.notes.insert(confirmed.id.clone(), confirmed);
            Some(BoardState {
                space: Some(space),
                ..prev.clone()
            })
        });
    }
}
