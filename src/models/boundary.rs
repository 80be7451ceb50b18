//! Boundary features as handed to the engine by the input readers.

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Type of OSM object a feature was exported from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Node,
    Way,
    Relation,
    Other,
}

impl FeatureKind {
    /// Parse the `@type` value written by `osmium export -a type`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "node" | "n" => FeatureKind::Node,
            "way" | "w" => FeatureKind::Way,
            "relation" | "r" => FeatureKind::Relation,
            _ => FeatureKind::Other,
        }
    }
}

impl std::fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureKind::Node => write!(f, "node"),
            FeatureKind::Way => write!(f, "way"),
            FeatureKind::Relation => write!(f, "relation"),
            FeatureKind::Other => write!(f, "other"),
        }
    }
}

/// A single labeled boundary polygon.
///
/// Polygon geometries are stored as one-part multipolygons. `geometry` is
/// `None` when the source feature had no areal geometry.
#[derive(Debug, Clone)]
pub struct BoundaryFeature {
    pub geometry: Option<MultiPolygon<f64>>,
    pub kind: FeatureKind,
    pub admin_level: Option<u8>,
    /// Numeric OSM id (without the `r`/`w`/`n` prefix)
    pub osm_id: Option<i64>,
    /// Multilingual names: {"default": "...", "fi": "...", "sv": "..."}
    pub names: HashMap<String, String>,
    /// ISO 3166-1 alpha-2 code, when tagged
    pub iso2: Option<String>,
}

impl BoundaryFeature {
    pub fn new(kind: FeatureKind) -> Self {
        Self {
            geometry: None,
            kind,
            admin_level: None,
            osm_id: None,
            names: HashMap::new(),
            iso2: None,
        }
    }

    pub fn with_geometry(mut self, geometry: MultiPolygon<f64>) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_level(mut self, admin_level: u8) -> Self {
        self.admin_level = Some(admin_level);
        self
    }

    pub fn with_id(mut self, osm_id: i64) -> Self {
        self.osm_id = Some(osm_id);
        self
    }

    pub fn with_name(mut self, lang: &str, name: &str) -> Self {
        self.names.insert(lang.to_string(), name.to_string());
        self
    }

    /// Whether the feature carries a non-empty areal geometry
    pub fn has_area(&self) -> bool {
        self.geometry
            .as_ref()
            .map(|g| g.0.iter().any(|p| p.exterior().0.len() >= 4))
            .unwrap_or(false)
    }
}

/// Pick a human readable name: English, Finnish, default, then anything.
pub fn display_name(names: &HashMap<String, String>) -> Option<&str> {
    names
        .get("en")
        .or_else(|| names.get("fi"))
        .or_else(|| names.get("default"))
        .or_else(|| {
            let mut langs: Vec<&String> = names.keys().collect();
            langs.sort();
            langs.first().and_then(|lang| names.get(*lang))
        })
        .map(|s| s.as_str())
}
