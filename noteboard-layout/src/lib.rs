//! # noteboard-layout — Grid layout engine for note columns
//!
//! Models a user column as a fixed-size canvas divided into uniform
//! cells sized to the note footprint plus a spacing margin. Placement,
//! snapping, and collision repair are all deterministic so every
//! replica that runs them over the same column converges on the same
//! positions.
//!
//! ```text
//! ┌─────────────────────────────┐
//! │ (20,20)    (296,20)   …     │   cell footprint = note + spacing
//! │ (20,240)   (296,240)  …     │   anchors scanned row-major
//! │   …          …              │
//! └─────────────────────────────┘
//! ```

pub mod grid;

pub use grid::{GridLayout, LayoutError};
