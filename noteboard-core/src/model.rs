//! Space / column / note data model.
//!
//! The in-memory graph mirrors what the remote document store holds:
//! a space maps user ids to columns, a column maps note ids to notes.
//! Display order is never stored — it is derived from creation
//! timestamps (newest first), so insertion order is irrelevant.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Prefix carried by locally assigned note ids while the remote write
/// is still in flight. A confirmed note never carries it.
pub const TEMP_ID_PREFIX: &str = "pending-";

/// 2-D position of a note within its column canvas.
///
/// Coordinates are logical pixels, always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Whether both coordinates lie within `tolerance` of `other`.
    pub fn within(&self, other: &Position, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::ORIGIN
    }
}

/// Note background color tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NoteColor {
    #[default]
    Yellow,
    Blue,
    Green,
    Pink,
    Purple,
    Orange,
    Red,
    Teal,
}

impl NoteColor {
    /// All tags in display order.
    pub const ALL: [NoteColor; 8] = [
        NoteColor::Yellow,
        NoteColor::Blue,
        NoteColor::Green,
        NoteColor::Pink,
        NoteColor::Purple,
        NoteColor::Orange,
        NoteColor::Red,
        NoteColor::Teal,
    ];
}

/// Note typeface tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NoteFont {
    #[default]
    Handwriting,
    Marker,
    Serif,
    Sans,
    Mono,
}

impl NoteFont {
    pub const ALL: [NoteFont; 5] = [
        NoteFont::Handwriting,
        NoteFont::Marker,
        NoteFont::Serif,
        NoteFont::Sans,
        NoteFont::Mono,
    ];
}

/// A single sticky note.
///
/// `id` is remote-assigned once confirmed; before confirmation it is a
/// local id carrying [`TEMP_ID_PREFIX`]. `client_key` is generated at
/// creation and never changes — the reconciler matches it against the
/// confirmed record so a note keeps its logical slot across the
/// pending → confirmed transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    /// Client-generated idempotency key.
    pub client_key: Uuid,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub color: NoteColor,
    #[serde(default)]
    pub font: NoteFont,
    pub position: Position,
    /// Server-assigned monotonic timestamp, 0 until confirmed.
    pub created_at: u64,
    /// Server-assigned monotonic timestamp, 0 until confirmed.
    pub updated_at: u64,
    pub user_id: String,
}

impl Note {
    /// Whether this note is still awaiting remote confirmation.
    pub fn is_pending(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }

    /// Mint a fresh temporary id for an unconfirmed note.
    pub fn temp_id() -> String {
        format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4())
    }
}

/// Validate a note title (non-empty after trimming).
pub fn valid_title(title: &str) -> bool {
    !title.trim().is_empty()
}

/// Validate note content (non-empty after trimming).
pub fn valid_content(content: &str) -> bool {
    !content.trim().is_empty()
}

/// One user's column of notes plus display profile.
///
/// Repeated joins merge profile fields without touching `notes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserColumn {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub notes: HashMap<String, Note>,
}

impl UserColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Notes ordered newest-first by creation timestamp.
    ///
    /// Pending notes (timestamp 0) sort last; ties break on id so the
    /// ordering is deterministic across refreshes.
    pub fn notes_by_recency(&self) -> Vec<&Note> {
        let mut notes: Vec<&Note> = self.notes.values().collect();
        notes.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        notes
    }

    /// All note positions, in recency order.
    pub fn positions(&self) -> Vec<Position> {
        self.notes_by_recency().iter().map(|n| n.position).collect()
    }
}

/// A shared collaborative session.
///
/// The identifier is globally unique and immutable for the lifetime of
/// the space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Space {
    pub id: String,
    #[serde(default)]
    pub users: HashMap<String, UserColumn>,
}

impl Space {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            users: HashMap::new(),
        }
    }

    /// Number of notes owned by `user_id` (0 if the user is absent).
    pub fn note_count(&self, user_id: &str) -> usize {
        self.users.get(user_id).map_or(0, |u| u.notes.len())
    }

    pub fn note(&self, user_id: &str, note_id: &str) -> Option<&Note> {
        self.users.get(user_id)?.notes.get(note_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, created_at: u64) -> Note {
        Note {
            id: id.to_string(),
            client_key: Uuid::new_v4(),
            title: "title".into(),
            content: "content".into(),
            color: NoteColor::default(),
            font: NoteFont::default(),
            position: Position::new(20.0, 20.0),
            created_at,
            updated_at: created_at,
            user_id: "u1".into(),
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(NoteColor::default(), NoteColor::Yellow);
        assert_eq!(NoteFont::default(), NoteFont::Handwriting);
        assert_eq!(Position::default(), Position::ORIGIN);
    }

    #[test]
    fn test_enum_cardinality() {
        assert_eq!(NoteColor::ALL.len(), 8);
        assert_eq!(NoteFont::ALL.len(), 5);
    }

    #[test]
    fn test_temp_id_is_pending() {
        let mut n = note("x", 1);
        assert!(!n.is_pending());
        n.id = Note::temp_id();
        assert!(n.is_pending());
    }

    #[test]
    fn test_position_within_tolerance() {
        let a = Position::new(20.0, 20.0);
        let b = Position::new(25.0, 15.0);
        assert!(a.within(&b, 5.0));
        assert!(!a.within(&b, 4.0));
    }

    #[test]
    fn test_validation_helpers() {
        assert!(valid_title("hello"));
        assert!(!valid_title("   "));
        assert!(!valid_content(""));
    }

    #[test]
    fn test_notes_by_recency_descending() {
        let mut col = UserColumn::new("Alice");
        col.notes.insert("a".into(), note("a", 10));
        col.notes.insert("b".into(), note("b", 30));
        col.notes.insert("c".into(), note("c", 20));

        let ordered: Vec<&str> = col.notes_by_recency().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ordered, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_notes_by_recency_pending_last() {
        let mut col = UserColumn::new("Alice");
        col.notes.insert("a".into(), note("a", 10));
        let pending = note(&Note::temp_id(), 0);
        col.notes.insert(pending.id.clone(), pending);

        let ordered = col.notes_by_recency();
        assert_eq!(ordered[0].id, "a");
        assert!(ordered[1].is_pending());
    }

    #[test]
    fn test_space_note_count() {
        let mut space = Space::new("spc1");
        assert_eq!(space.note_count("u1"), 0);

        let mut col = UserColumn::new("Alice");
        col.notes.insert("a".into(), note("a", 1));
        space.users.insert("u1".into(), col);
        assert_eq!(space.note_count("u1"), 1);
        assert_eq!(space.note_count("u2"), 0);
    }

    #[test]
    fn test_note_serde_roundtrip() {
        let n = note("a", 5);
        let json = serde_json::to_string(&n).unwrap();
        let back: Note = serde_json::from_str(&json).unwrap();
        assert_eq!(n, back);
    }

    #[test]
    fn test_color_kebab_case_tags() {
        let json = serde_json::to_string(&NoteColor::Teal).unwrap();
        assert_eq!(json, "\"teal\"");
        let font = serde_json::to_string(&NoteFont::Handwriting).unwrap();
        assert_eq!(font, "\"handwriting\"");
    }
}
