//! Area coverage check run before any tile is emitted.
//!
//! A fine level that covers only a fraction of the country usually means a
//! truncated extract or a wrong level choice.

use geo::GeodesicArea;
use tracing::{info, warn};

use crate::config::CoverageRule;
use crate::error::AssignError;
use crate::models::{AdminLevel, LevelTags};
use crate::pip::{LevelIndex, LevelSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageReport {
    pub baseline_tag: u8,
    /// Square metres
    pub fine_area: f64,
    pub baseline_area: f64,
    /// `None` when the baseline has no area and the check was skipped
    pub ratio: Option<f64>,
}

fn level_area(index: &LevelIndex) -> f64 {
    index
        .polygons()
        .iter()
        .map(|p| p.geometry.geodesic_area_unsigned())
        .sum()
}

/// Compare the fine level's area against the baseline level.
///
/// A medium-level baseline that is absent falls back to the coarse level.
pub fn check_coverage(
    rule: &CoverageRule,
    levels: &LevelTags,
    fine: &LevelIndex,
    medium: &LevelSet,
    coarse: &LevelIndex,
) -> Result<CoverageReport, AssignError> {
    let requested = rule.baseline_tag.unwrap_or(levels.coarse);

    let (baseline_tag, baseline) = match levels.level_of(requested) {
        Some(AdminLevel::Coarse) => (levels.coarse, coarse),
        Some(AdminLevel::Medium) => match medium.as_index() {
            Some(index) => (levels.medium, index),
            None => {
                warn!(
                    "Coverage baseline admin_level={} is absent, using admin_level={}",
                    requested, levels.coarse
                );
                (levels.coarse, coarse)
            }
        },
        Some(AdminLevel::Fine) | None => {
            return Err(AssignError::InvalidConfig(format!(
                "coverage baseline admin_level={} must be the coarse or medium level",
                requested
            )));
        }
    };

    let fine_area = level_area(fine);
    let baseline_area = level_area(baseline);

    if baseline_area <= 0.0 {
        warn!("Coverage baseline has no area, skipping coverage check");
        return Ok(CoverageReport {
            baseline_tag,
            fine_area,
            baseline_area,
            ratio: None,
        });
    }

    let ratio = fine_area / baseline_area;
    info!(
        "Coverage: level {} {:.0} km² / baseline level {} {:.0} km² = {:.2}%",
        levels.fine,
        fine_area / 1e6,
        baseline_tag,
        baseline_area / 1e6,
        ratio * 100.0
    );

    if ratio < rule.min_ratio {
        return Err(AssignError::Coverage {
            baseline_tag,
            ratio,
            min_ratio: rule.min_ratio,
        });
    }

    Ok(CoverageReport {
        baseline_tag,
        fine_area,
        baseline_area,
        ratio: Some(ratio),
    })
}
