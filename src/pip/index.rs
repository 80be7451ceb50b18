//! Spatial index for fast per-level containment lookups.

use geo::{BoundingRect, Contains, InteriorPoint, MultiPolygon, Point};
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::models::{display_name, AdminLevel};

/// One geometry per (level, id) after dissolving
#[derive(Debug, Clone)]
pub struct DissolvedPolygon {
    pub id: i64,
    pub geometry: MultiPolygon<f64>,
    /// Names from the first feature of the group, other features only fill gaps
    pub names: HashMap<String, String>,
}

impl DissolvedPolygon {
    /// Get the bounding box of this polygon
    pub fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        self.geometry
            .bounding_rect()
            .map(|rect| (rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }

    /// A point guaranteed to lie inside the polygon; `None` when it is empty
    pub fn interior_point(&self) -> Option<Point<f64>> {
        self.geometry.interior_point()
    }

    pub fn is_empty(&self) -> bool {
        self.geometry.0.is_empty()
    }

    /// Name for log output, falling back to the id
    pub fn label(&self) -> String {
        display_name(&self.names)
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Wrapper for R-tree indexing of dissolved polygons
#[derive(Clone)]
struct IndexedPolygon {
    polygon: Arc<DissolvedPolygon>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedPolygon {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedPolygon {
    fn new(polygon: Arc<DissolvedPolygon>) -> Option<Self> {
        let (min_x, min_y, max_x, max_y) = polygon.bbox()?;
        Some(Self {
            polygon,
            envelope: AABB::from_corners([min_x, min_y], [max_x, max_y]),
        })
    }
}

/// Dissolved polygons of one level, in first-seen id order, backed by an R-tree
pub struct LevelIndex {
    level: AdminLevel,
    tag: u8,
    polygons: Vec<Arc<DissolvedPolygon>>,
    tree: RTree<IndexedPolygon>,
}

impl LevelIndex {
    /// Build spatial index over dissolved polygons
    pub fn build(level: AdminLevel, tag: u8, polygons: Vec<DissolvedPolygon>) -> Self {
        let polygons: Vec<Arc<DissolvedPolygon>> = polygons.into_iter().map(Arc::new).collect();

        let indexed: Vec<IndexedPolygon> = polygons
            .iter()
            .cloned()
            .filter_map(IndexedPolygon::new)
            .collect();
        let tree = RTree::bulk_load(indexed);

        info!(
            "Indexed {} {} polygons (admin_level={})",
            tree.size(),
            level,
            tag
        );

        Self {
            level,
            tag,
            polygons,
            tree,
        }
    }

    /// Id of the first indexed polygon that strictly contains the point.
    ///
    /// Candidates come from the R-tree in its iteration order; a point on a
    /// polygon's boundary is not contained.
    pub fn find_enclosing(&self, point: &Point<f64>) -> Option<i64> {
        let query_envelope = AABB::from_point([point.x(), point.y()]);

        self.tree
            .locate_in_envelope_intersecting(&query_envelope)
            .find(|ip| ip.polygon.geometry.contains(point))
            .map(|ip| ip.polygon.id)
    }

    pub fn level(&self) -> AdminLevel {
        self.level
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// All polygons in first-seen id order
    pub fn polygons(&self) -> &[Arc<DissolvedPolygon>] {
        &self.polygons
    }

    pub fn get(&self, id: i64) -> Option<&Arc<DissolvedPolygon>> {
        self.polygons.iter().find(|p| p.id == id)
    }

    /// Number of distinct ids
    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }
}

/// Outcome of dissolving a level that may legitimately be missing
pub enum LevelSet {
    Present(LevelIndex),
    Absent,
}

impl LevelSet {
    /// Containment lookup; an absent level never matches
    pub fn find_enclosing(&self, point: &Point<f64>) -> Option<i64> {
        match self {
            LevelSet::Present(index) => index.find_enclosing(point),
            LevelSet::Absent => None,
        }
    }

    pub fn as_index(&self) -> Option<&LevelIndex> {
        match self {
            LevelSet::Present(index) => Some(index),
            LevelSet::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, LevelSet::Present(_))
    }

    pub fn len(&self) -> usize {
        self.as_index().map(LevelIndex::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
