//! Tile to admin-hierarchy assignment.
//!
//! [`AssignmentEngine::prepare`] settles the level tags for the input,
//! dissolves the three levels and resolves the coarse-level id. [`PreparedRun::run`] then walks the fine
//! level polygon by polygon, enumerates the tiles under each bounding box and
//! keeps those whose center lies strictly inside the polygon. A tile claimed
//! by an earlier polygon is skipped.

mod cancel;
mod coarse;
mod coverage;
mod dedup;
mod engine;
mod profile;
mod stats;

pub use cancel::CancelToken;
pub use coarse::resolve_coarse_id;
pub use coverage::{check_coverage, CoverageReport};
pub use dedup::TileDedup;
pub use engine::{AssignmentEngine, PolygonReport, PreparedRun};
pub use profile::{resolve_profile, RunProfile};
pub use stats::AssignStats;
