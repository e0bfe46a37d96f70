//! Board configuration.
//!
//! Every tunable of the sync core lives here so tests can run with a
//! shrunk canvas and millisecond backoff while production keeps the
//! defaults. Values can be overridden through `NOTEBOARD_*` environment
//! variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the board canvas, note grid, and sync timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Hard cap on notes per user column.
    pub max_notes_per_user: usize,
    /// Logical canvas width of a user column, in pixels.
    pub canvas_width: f64,
    /// Logical canvas height of a user column, in pixels.
    pub canvas_height: f64,
    /// Fixed note footprint width.
    pub note_width: f64,
    /// Fixed note footprint height.
    pub note_height: f64,
    /// Margin between grid cells.
    pub note_spacing: f64,
    /// Quiet period before a buffered drag position is persisted.
    pub drag_quiet_period_ms: u64,
    /// Total attempts per remote operation (first try included).
    pub retry_attempts: u32,
    /// Backoff base delay; doubles per retry.
    pub retry_base_delay_ms: u64,
    /// Backoff delay cap.
    pub retry_max_delay_ms: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            max_notes_per_user: 100,
            canvas_width: 592.0,
            canvas_height: 1280.0,
            note_width: 256.0,
            note_height: 200.0,
            note_spacing: 20.0,
            drag_quiet_period_ms: 400,
            retry_attempts: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 8000,
        }
    }
}

impl BoardConfig {
    /// Build from defaults plus `NOTEBOARD_*` environment overrides.
    ///
    /// Unparseable values are logged and ignored rather than fatal, so
    /// a stray variable can't take the board down.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overrides from an arbitrary key lookup. Lets tests exercise the
    /// override logic without touching process-wide environment state.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        read_var(&lookup, "NOTEBOARD_MAX_NOTES_PER_USER", &mut cfg.max_notes_per_user);
        read_var(&lookup, "NOTEBOARD_CANVAS_WIDTH", &mut cfg.canvas_width);
        read_var(&lookup, "NOTEBOARD_CANVAS_HEIGHT", &mut cfg.canvas_height);
        read_var(&lookup, "NOTEBOARD_NOTE_WIDTH", &mut cfg.note_width);
        read_var(&lookup, "NOTEBOARD_NOTE_HEIGHT", &mut cfg.note_height);
        read_var(&lookup, "NOTEBOARD_NOTE_SPACING", &mut cfg.note_spacing);
        read_var(&lookup, "NOTEBOARD_DRAG_QUIET_MS", &mut cfg.drag_quiet_period_ms);
        read_var(&lookup, "NOTEBOARD_RETRY_ATTEMPTS", &mut cfg.retry_attempts);
        read_var(&lookup, "NOTEBOARD_RETRY_BASE_DELAY_MS", &mut cfg.retry_base_delay_ms);
        read_var(&lookup, "NOTEBOARD_RETRY_MAX_DELAY_MS", &mut cfg.retry_max_delay_ms);
        cfg
    }

    /// Check the configuration for nonsensical values.
    ///
    /// Returns the list of violations (empty = valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_notes_per_user == 0 {
            errors.push("max_notes_per_user must be at least 1".to_string());
        }
        if self.canvas_width <= 0.0 || self.canvas_height <= 0.0 {
            errors.push("canvas dimensions must be positive".to_string());
        }
        if self.note_width <= 0.0 || self.note_height <= 0.0 {
            errors.push("note footprint must be positive".to_string());
        }
        if self.note_spacing < 0.0 {
            errors.push("note_spacing must be non-negative".to_string());
        }
        if self.note_width + self.note_spacing > self.canvas_width {
            errors.push("canvas too narrow for a single note cell".to_string());
        }
        if self.retry_attempts == 0 {
            errors.push("retry_attempts must be at least 1".to_string());
        }
        errors
    }

    pub fn drag_quiet_period(&self) -> Duration {
        Duration::from_millis(self.drag_quiet_period_ms)
    }

    /// Backoff delay for the given zero-based attempt index, capped.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let ms = self
            .retry_base_delay_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.retry_max_delay_ms);
        Duration::from_millis(ms)
    }
}

fn read_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => log::warn!("ignoring unparseable {key}={raw}"),
        }
    }
}
