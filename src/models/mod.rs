//! Core data models for the tile assignment.

pub mod admin;
pub mod boundary;
pub mod record;

pub use admin::{AdminLevel, LevelTags};
pub use boundary::{display_name, BoundaryFeature, FeatureKind};
pub use record::{TileAssignment, ABSENT_MARKER};
