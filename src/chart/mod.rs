//! Depth chart rendering.
//!
//! This module handles:
//! - Chart variants and the derived series behind each panel
//! - Collision-free artifact paths with guaranteed cleanup
//! - PNG rendering with a per-call drawing surface

pub mod artifact;
pub mod render;
pub mod series;

pub use artifact::{ArtifactFile, ArtifactStore, ChartArtifact};
pub use render::ChartRenderer;
pub use series::{ChartSpec, Line, Panel, Variant};
