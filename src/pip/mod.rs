//! Point-in-Polygon (PIP) lookups per admin level.
//!
//! Dissolves boundary features into one polygon per id and provides
//! strict containment lookups using an R-tree spatial index.

mod dissolve;
mod index;

pub use dissolve::{dissolve_optional, dissolve_required};
pub use index::{DissolvedPolygon, LevelIndex, LevelSet};
