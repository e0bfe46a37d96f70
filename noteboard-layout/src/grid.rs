//! Deterministic note placement on a uniform grid.
//!
//! A cell's *anchor* is its top-left corner. Occupancy is
//! tolerance-based: a note counts as occupying the cell whose anchor
//! is nearest its position, provided it lies within half a cell
//! footprint on both axes. Exact-match comparison would break under
//! drag jitter; the tolerance absorbs it.
//!
//! Every operation here is a pure function of its inputs, so replicas
//! repairing the same column independently reach the same layout.

use noteboard_core::model::{Position, UserColumn};
use noteboard_core::BoardConfig;
use rustc_hash::FxHashSet;

/// Off-grid tolerance, in pixels. Positions within this distance of
/// their nearest anchor are considered grid-aligned and left alone.
const ALIGN_TOLERANCE: f64 = 1.0;

/// Layout configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("invalid grid dimensions: {0}")]
    InvalidDimensions(String),
}

/// Grid model of a single user column canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    canvas_width: f64,
    canvas_height: f64,
    note_width: f64,
    note_height: f64,
    spacing: f64,
}

impl GridLayout {
    /// Build a grid from raw dimensions.
    pub fn new(
        canvas_width: f64,
        canvas_height: f64,
        note_width: f64,
        note_height: f64,
        spacing: f64,
    ) -> Result<Self, LayoutError> {
        if canvas_width <= 0.0 || canvas_height <= 0.0 {
            return Err(LayoutError::InvalidDimensions(format!(
                "canvas {canvas_width}x{canvas_height} must be positive"
            )));
        }
        if note_width <= 0.0 || note_height <= 0.0 {
            return Err(LayoutError::InvalidDimensions(format!(
                "note footprint {note_width}x{note_height} must be positive"
            )));
        }
        if spacing < 0.0 {
            return Err(LayoutError::InvalidDimensions(format!(
                "spacing {spacing} must be non-negative"
            )));
        }
        Ok(Self {
            canvas_width,
            canvas_height,
            note_width,
            note_height,
            spacing,
        })
    }

    /// Build a grid from a [`BoardConfig`].
    pub fn from_config(cfg: &BoardConfig) -> Result<Self, LayoutError> {
        Self::new(
            cfg.canvas_width,
            cfg.canvas_height,
            cfg.note_width,
            cfg.note_height,
            cfg.note_spacing,
        )
    }

    /// Horizontal cell footprint (note width + spacing).
    #[inline]
    fn footprint_x(&self) -> f64 {
        self.note_width + self.spacing
    }

    /// Vertical cell footprint (note height + spacing).
    #[inline]
    fn footprint_y(&self) -> f64 {
        self.note_height + self.spacing
    }

    /// Number of whole cells per row (at least 1).
    pub fn cols(&self) -> usize {
        (((self.canvas_width - self.spacing) / self.footprint_x()).floor() as usize).max(1)
    }

    /// Number of whole rows (at least 1).
    pub fn rows(&self) -> usize {
        (((self.canvas_height - self.spacing) / self.footprint_y()).floor() as usize).max(1)
    }

    /// Anchor (top-left) of the cell at `(col, row)`.
    pub fn anchor(&self, col: usize, row: usize) -> Position {
        Position::new(
            self.spacing + col as f64 * self.footprint_x(),
            self.spacing + row as f64 * self.footprint_y(),
        )
    }

    /// Cell whose anchor is nearest to `pos`, clamped into the grid.
    fn nearest_cell(&self, pos: Position) -> (usize, usize) {
        let col = ((pos.x - self.spacing) / self.footprint_x()).round();
        let row = ((pos.y - self.spacing) / self.footprint_y()).round();
        (
            (col.max(0.0) as usize).min(self.cols() - 1),
            (row.max(0.0) as usize).min(self.rows() - 1),
        )
    }

    /// Whether `pos` lies within half a cell footprint of `anchor` on
    /// both axes.
    fn claims(&self, pos: Position, anchor: Position) -> bool {
        (pos.x - anchor.x).abs() <= self.footprint_x() / 2.0
            && (pos.y - anchor.y).abs() <= self.footprint_y() / 2.0
    }

    /// Cells claimed by the given positions.
    fn occupied_cells(&self, existing: &[Position]) -> FxHashSet<(usize, usize)> {
        let mut cells = FxHashSet::default();
        for pos in existing {
            let (col, row) = self.nearest_cell(*pos);
            if self.claims(*pos, self.anchor(col, row)) {
                cells.insert((col, row));
            }
        }
        cells
    }

    /// First free cell anchor, scanning row-major.
    ///
    /// When every modeled cell is occupied, falls back to a
    /// deterministic index-based slot (`existing.len()` mapped through
    /// the grid, ignoring occupancy) clamped into canvas bounds. The
    /// fallback guarantees termination under pathological overlap.
    pub fn compute_position(&self, existing: &[Position]) -> Position {
        let occupied = self.occupied_cells(existing);
        for row in 0..self.rows() {
            for col in 0..self.cols() {
                if !occupied.contains(&(col, row)) {
                    return self.anchor(col, row);
                }
            }
        }

        let index = existing.len();
        let cols = self.cols();
        let anchor = self.anchor(index % cols, index / cols);
        self.clamp(anchor)
    }

    /// Snap `pos` to its nearest grid anchor.
    pub fn normalize_to_grid(&self, pos: Position) -> Position {
        let (col, row) = self.nearest_cell(pos);
        self.anchor(col, row)
    }

    /// Clamp a position so the note footprint stays inside the canvas.
    fn clamp(&self, pos: Position) -> Position {
        Position::new(
            pos.x.clamp(0.0, (self.canvas_width - self.note_width).max(0.0)),
            pos.y.clamp(0.0, (self.canvas_height - self.note_height).max(0.0)),
        )
    }

    /// Collision-repair pass over one user column.
    ///
    /// Notes are processed in creation order (oldest keeps its spot,
    /// ties broken by id). A note colliding with an already-processed
    /// note is re-placed via [`compute_position`](Self::compute_position)
    /// over the processed set; a note off-grid beyond
    /// [`ALIGN_TOLERANCE`] is snapped via
    /// [`normalize_to_grid`](Self::normalize_to_grid).
    ///
    /// Idempotent: a normalized, non-overlapping column yields an empty
    /// change list. Returns `(note_id, new_position)` for every note
    /// that moved.
    pub fn repair_column(&self, column: &UserColumn) -> Vec<(String, Position)> {
        let mut notes: Vec<(&String, Position)> = column
            .notes
            .iter()
            .map(|(id, n)| (id, n.position))
            .collect();
        notes.sort_by(|a, b| {
            let ca = column.notes[a.0].created_at;
            let cb = column.notes[b.0].created_at;
            ca.cmp(&cb).then_with(|| a.0.cmp(b.0))
        });

        let mut processed: Vec<Position> = Vec::with_capacity(notes.len());
        let mut claimed: FxHashSet<(usize, usize)> = FxHashSet::default();
        let mut changes = Vec::new();

        for (id, original) in notes {
            let mut pos = original;

            // Off-grid beyond tolerance: snap. Sub-pixel drift is left
            // alone so the pass stays a fixed point.
            let snapped = self.normalize_to_grid(pos);
            if !pos.within(&snapped, ALIGN_TOLERANCE) {
                pos = snapped;
            }

            let cell = self.nearest_cell(pos);
            if claimed.contains(&cell) && self.claims(pos, self.anchor(cell.0, cell.1)) {
                pos = self.compute_position(&processed);
            }

            let final_cell = self.nearest_cell(pos);
            claimed.insert(final_cell);
            processed.push(pos);

            if pos != original {
                log::debug!("repair moved note {id}: {original:?} -> {pos:?}");
                changes.push((id.clone(), pos));
            }
        }

        changes
    }
}
