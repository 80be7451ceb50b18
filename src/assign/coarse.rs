//! Resolution of the single coarse-level id tagged on every tile.

use tracing::{info, warn};

use crate::error::AssignError;
use crate::pip::LevelIndex;

/// Pick the coarse-level id for the whole run.
///
/// A single coarse polygon wins outright. Otherwise the coarse polygon
/// containing the interior point of the first fine polygon is used, and
/// failing that the first coarse polygon. Overlapping coarse polygons are
/// resolved by index order only.
pub fn resolve_coarse_id(coarse: &LevelIndex, fine: &LevelIndex) -> Result<i64, AssignError> {
    let first = coarse
        .polygons()
        .first()
        .map(|p| p.id)
        .ok_or(AssignError::MissingLevel {
            level: coarse.level(),
            tag: coarse.tag(),
        })?;

    if coarse.len() == 1 {
        info!("Single coarse-level id: {}", first);
        return Ok(first);
    }

    let sample = fine.polygons().first().and_then(|p| p.interior_point());
    if let Some(id) = sample.and_then(|pt| coarse.find_enclosing(&pt)) {
        info!(
            "Resolved coarse-level id {} from {} candidates",
            id,
            coarse.len()
        );
        return Ok(id);
    }

    warn!(
        "No coarse polygon contains the first fine polygon; falling back to {}",
        first
    );
    Ok(first)
}
