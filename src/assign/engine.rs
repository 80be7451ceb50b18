//! Hierarchy assignment: fine-level polygons to tiles tagged with all levels.

use geo::{Point, PreparedGeometry, Relate};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::coarse::resolve_coarse_id;
use super::coverage::check_coverage;
use super::profile::resolve_profile;
use super::{AssignStats, CancelToken, TileDedup};
use crate::config::{Config, TileExpectation};
use crate::error::AssignError;
use crate::models::{AdminLevel, BoundaryFeature, LevelTags, TileAssignment};
use crate::pip::{dissolve_optional, dissolve_required, DissolvedPolygon, LevelIndex, LevelSet};
use crate::sink::RecordSink;
use crate::tile::{tiles_covering, TileCoord};

/// Builds the per-level indexes for a run
pub struct AssignmentEngine {
    config: Config,
}

/// Dissolved and indexed levels, ready to be scanned
pub struct PreparedRun {
    zoom: u8,
    parallel: bool,
    levels: LevelTags,
    iso2: Option<String>,
    expected_tiles: Option<TileExpectation>,
    fine: LevelIndex,
    medium: LevelSet,
    coarse: LevelIndex,
    coarse_id: i64,
}

/// Outcome of one fine-level polygon, handed to progress observers
#[derive(Debug, Clone)]
pub struct PolygonReport {
    /// Position in the fine level, starting at 0
    pub index: usize,
    pub fine_id: i64,
    pub label: String,
    pub medium_id: Option<i64>,
    pub candidates: u64,
    pub accepted: u64,
    pub written: u64,
    pub skipped: bool,
}

/// Tiles of one polygon whose centers passed the containment test
struct PolygonScan {
    medium_id: Option<i64>,
    candidates: u64,
    inside: Vec<(TileCoord, f64, f64)>,
}

impl AssignmentEngine {
    pub fn new(config: Config) -> Result<Self, AssignError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Settle the level tags, dissolve all three levels and resolve the
    /// coarse-level id.
    ///
    /// Fails before any output is produced when a required level is missing
    /// or the coverage rule is not met. A tile count expectation replaces the
    /// coverage rule.
    pub fn prepare(&self, features: &[BoundaryFeature]) -> Result<PreparedRun, AssignError> {
        let profile = resolve_profile(&self.config, features)?;
        let levels = profile.levels;
        info!(
            "Preparing levels {}/{}/{} from {} features",
            levels.coarse,
            levels.medium,
            levels.fine,
            features.len()
        );

        let fine = dissolve_required(features, AdminLevel::Fine, levels.fine)?;
        let medium = if self.config.medium_required {
            LevelSet::Present(dissolve_required(
                features,
                AdminLevel::Medium,
                levels.medium,
            )?)
        } else {
            dissolve_optional(features, AdminLevel::Medium, levels.medium)?
        };
        let coarse = dissolve_required(features, AdminLevel::Coarse, levels.coarse)?;

        if !medium.is_present() {
            warn!(
                "Admin level {} is absent; tiles get '-' as {} id",
                levels.medium,
                AdminLevel::Medium
            );
        }

        match (&profile.coverage, &profile.expected_tiles) {
            (Some(_), Some(expectation)) => info!(
                "Skipping coverage check; the run is checked against {} expected tiles",
                expectation.expected
            ),
            (Some(rule), None) => {
                check_coverage(rule, &levels, &fine, &medium, &coarse)?;
            }
            (None, _) => {}
        }

        let coarse_id = match self.config.coarse_id {
            Some(id) => {
                info!("Using configured coarse-level id {}", id);
                id
            }
            None => resolve_coarse_id(&coarse, &fine)?,
        };

        Ok(PreparedRun {
            zoom: self.config.zoom,
            parallel: self.config.parallel,
            levels,
            iso2: profile.iso2,
            expected_tiles: profile.expected_tiles,
            fine,
            medium,
            coarse,
            coarse_id,
        })
    }
}

impl PreparedRun {
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn coarse_id(&self) -> i64 {
        self.coarse_id
    }

    /// Level tags the run was prepared with
    pub fn levels(&self) -> &LevelTags {
        &self.levels
    }

    pub fn iso2(&self) -> Option<&str> {
        self.iso2.as_deref()
    }

    /// Tile count expectation for this input and zoom, if any
    pub fn expected_tiles(&self) -> Option<&TileExpectation> {
        self.expected_tiles.as_ref()
    }

    /// Tiles under all fine-level bounding boxes, shared tiles counted once
    /// per polygon
    pub fn candidate_tiles(&self) -> usize {
        self.fine
            .polygons()
            .iter()
            .filter_map(|p| p.bbox())
            .map(|(min_x, min_y, max_x, max_y)| {
                tiles_covering(min_x, min_y, max_x, max_y, self.zoom).len()
            })
            .sum()
    }

    pub fn fine(&self) -> &LevelIndex {
        &self.fine
    }

    pub fn medium(&self) -> &LevelSet {
        &self.medium
    }

    pub fn coarse(&self) -> &LevelIndex {
        &self.coarse
    }

    /// Scan all fine-level polygons and stream accepted tiles to the sink.
    pub fn run<S: RecordSink + ?Sized>(
        &self,
        dedup: &mut TileDedup,
        sink: &mut S,
        cancel: &CancelToken,
    ) -> Result<AssignStats, AssignError> {
        self.run_observed(dedup, sink, cancel, |_| {})
    }

    /// Like [`PreparedRun::run`], calling `observe` after each fine polygon.
    pub fn run_observed<S, F>(
        &self,
        dedup: &mut TileDedup,
        sink: &mut S,
        cancel: &CancelToken,
        mut observe: F,
    ) -> Result<AssignStats, AssignError>
    where
        S: RecordSink + ?Sized,
        F: FnMut(&PolygonReport),
    {
        let mut stats = AssignStats::default();
        let polygons = self.fine.polygons();

        // Workers only compute; claiming tiles and writing stay in polygon order
        let chunk_size = if self.parallel {
            rayon::current_num_threads().max(1) * 4
        } else {
            1
        };

        info!(
            "Scanning {} fine-level polygons at zoom {}{}",
            polygons.len(),
            self.zoom,
            if self.parallel { " (parallel)" } else { "" }
        );

        for (chunk_index, chunk) in polygons.chunks(chunk_size).enumerate() {
            if cancel.is_cancelled() {
                return Self::stop(sink, &stats);
            }

            let scans: Vec<Option<PolygonScan>> = if self.parallel && chunk.len() > 1 {
                chunk.par_iter().map(|p| self.scan(p)).collect()
            } else {
                chunk.iter().map(|p| self.scan(p)).collect()
            };

            for (offset, (polygon, scan)) in chunk.iter().zip(scans).enumerate() {
                if cancel.is_cancelled() {
                    return Self::stop(sink, &stats);
                }
                let index = chunk_index * chunk_size + offset;
                let report = self.emit(index, polygon, scan, dedup, sink, &mut stats)?;
                observe(&report);
            }
        }

        sink.finish().map_err(AssignError::Sink)?;
        Ok(stats)
    }

    fn stop<S: RecordSink + ?Sized>(
        sink: &mut S,
        stats: &AssignStats,
    ) -> Result<AssignStats, AssignError> {
        warn!("Cancelled after {} polygons", stats.polygons);
        sink.finish().map_err(AssignError::Sink)?;
        Err(AssignError::Cancelled)
    }

    /// Containment scan of one polygon; `None` for an empty geometry.
    fn scan(&self, polygon: &DissolvedPolygon) -> Option<PolygonScan> {
        if polygon.is_empty() {
            return None;
        }
        let (min_x, min_y, max_x, max_y) = polygon.bbox()?;

        let medium_id = polygon
            .interior_point()
            .and_then(|pt| self.medium.find_enclosing(&pt));

        // Prepared once per polygon, dropped when the scan returns
        let prepared = PreparedGeometry::from(&polygon.geometry);

        let mut candidates = 0u64;
        let mut inside = Vec::new();
        for tile in tiles_covering(min_x, min_y, max_x, max_y, self.zoom) {
            candidates += 1;
            let (lon, lat) = tile.center();
            if prepared.relate(&Point::new(lon, lat)).is_contains() {
                inside.push((tile, lon, lat));
            }
        }

        Some(PolygonScan {
            medium_id,
            candidates,
            inside,
        })
    }

    fn emit<S: RecordSink + ?Sized>(
        &self,
        index: usize,
        polygon: &DissolvedPolygon,
        scan: Option<PolygonScan>,
        dedup: &mut TileDedup,
        sink: &mut S,
        stats: &mut AssignStats,
    ) -> Result<PolygonReport, AssignError> {
        stats.polygons += 1;

        let Some(scan) = scan else {
            stats.empty_geometries += 1;
            warn!(
                "Skipping {} {} ({}): empty geometry",
                AdminLevel::Fine,
                polygon.id,
                polygon.label()
            );
            return Ok(PolygonReport {
                index,
                fine_id: polygon.id,
                label: polygon.label(),
                medium_id: None,
                candidates: 0,
                accepted: 0,
                written: 0,
                skipped: true,
            });
        };

        let accepted = scan.inside.len() as u64;
        let mut batch = Vec::with_capacity(scan.inside.len());

        for (tile, lon, lat) in scan.inside {
            if !dedup.claim(tile) {
                stats.duplicate_skips += 1;
                continue;
            }
            batch.push(TileAssignment {
                tile,
                lon,
                lat,
                fine_id: polygon.id,
                medium_id: scan.medium_id,
                coarse_id: self.coarse_id,
            });
        }

        if !batch.is_empty() {
            sink.write_batch(&batch).map_err(AssignError::Sink)?;
        }

        let written = batch.len() as u64;
        stats.candidates += scan.candidates;
        stats.accepted += accepted;
        stats.written += written;

        debug!(
            "{} {}: cand={} inside={} written={}",
            AdminLevel::Fine,
            polygon.id,
            scan.candidates,
            accepted,
            written
        );

        Ok(PolygonReport {
            index,
            fine_id: polygon.id,
            label: polygon.label(),
            medium_id: scan.medium_id,
            candidates: scan.candidates,
            accepted,
            written,
            skipped: false,
        })
    }
}
