//! Running counters of a tile assignment run.

use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Reporting-only counters; they never affect the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssignStats {
    /// Fine-level polygons visited, including skipped ones
    pub polygons: u64,
    /// Fine-level polygons skipped for a missing or empty geometry
    pub empty_geometries: u64,
    /// Tiles whose bounds intersect a polygon's bounding box
    pub candidates: u64,
    /// Candidates whose center is strictly inside their polygon
    pub accepted: u64,
    /// Accepted tiles already emitted by an earlier polygon
    pub duplicate_skips: u64,
    /// Records handed to the sink
    pub written: u64,
}

impl AssignStats {
    pub fn tiles_per_second(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.written as f64 / secs
        } else {
            0.0
        }
    }

    pub fn log_summary(&self, elapsed: Duration) {
        info!(
            "Done: {} tiles written from {} polygons ({} empty skipped)",
            self.written, self.polygons, self.empty_geometries
        );
        info!(
            "Candidates: {}, inside: {}, duplicates skipped: {}",
            self.candidates, self.accepted, self.duplicate_skips
        );
        info!(
            "Took {:.1}s @ {:.1} tiles/s",
            elapsed.as_secs_f64(),
            self.tiles_per_second(elapsed)
        );
    }
}
