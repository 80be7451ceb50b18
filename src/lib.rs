//! admintiles - tile to administrative hierarchy assignment
//!
//! This library provides the assignment engine and shared types for the
//! find-tiles, export-admins and tile-docs binaries.

pub mod admins;
pub mod assign;
pub mod config;
pub mod error;
pub mod models;
pub mod pip;
pub mod sink;
pub mod source;
pub mod tile;

pub use assign::{AssignStats, AssignmentEngine, CancelToken, PreparedRun, TileDedup};
pub use config::Config;
pub use error::AssignError;
pub use models::{AdminLevel, BoundaryFeature, LevelTags, TileAssignment};
