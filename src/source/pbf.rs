//! Admin boundary relations straight from an OSM PBF extract.

use anyhow::{Context, Result};
use geo::{Contains, Coord, MultiPolygon, Point};
use hashbrown::{HashMap, HashSet};
use osmpbfreader::{NodeId, OsmId, OsmObj, OsmPbfReader, Relation, RelationId, WayId};
use sled::Db;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tempfile::{Builder, TempDir};
use tracing::{debug, info};

use super::rings::assemble_rings;
use crate::models::{BoundaryFeature, FeatureKind};

/// Outer and inner member ways of one boundary relation
#[derive(Debug, Default)]
struct Members {
    outer: Vec<WayId>,
    inner: Vec<WayId>,
}

/// Node coordinates and way/relation membership of the boundary relations.
///
/// Node coordinates live in a temporary sled database so country sized
/// extracts do not have to fit in memory.
pub struct BoundaryResolver {
    node_db: Db,
    way_nodes: HashMap<WayId, Vec<NodeId>>,
    members: HashMap<RelationId, Members>,
    _dir: TempDir,
}

/// admin_level of an administrative boundary relation, if it is one
pub fn boundary_level(
    boundary: Option<&str>,
    relation_type: Option<&str>,
    admin_level: Option<&str>,
) -> Option<u8> {
    if boundary != Some("administrative") {
        return None;
    }
    if !matches!(relation_type, Some("boundary") | Some("multipolygon")) {
        return None;
    }
    admin_level?.trim().parse().ok()
}

fn relation_level(rel: &Relation) -> Option<u8> {
    boundary_level(
        rel.tags.get("boundary").map(|v| v.as_str()),
        rel.tags.get("type").map(|v| v.as_str()),
        rel.tags.get("admin_level").map(|v| v.as_str()),
    )
}

fn encode_coord(lon: f64, lat: f64) -> [u8; 16] {
    let mut value = [0u8; 16];
    value[0..8].copy_from_slice(&lon.to_be_bytes());
    value[8..16].copy_from_slice(&lat.to_be_bytes());
    value
}

fn decode_coord(bytes: &[u8]) -> Option<Coord<f64>> {
    if bytes.len() != 16 {
        return None;
    }
    let lon = f64::from_be_bytes(bytes[0..8].try_into().ok()?);
    let lat = f64::from_be_bytes(bytes[8..16].try_into().ok()?);
    Some(Coord { x: lon, y: lat })
}

impl BoundaryResolver {
    /// Scan the file three times: relations, their ways, then the nodes.
    pub fn build<R: Read + Seek>(reader: &mut OsmPbfReader<R>) -> Result<Self> {
        info!("Pass 1/3: Collecting boundary relations...");
        reader.rewind()?;

        let mut members = HashMap::new();
        let mut needed_ways = HashSet::new();

        for obj in reader.iter() {
            if let OsmObj::Relation(rel) = obj? {
                if relation_level(&rel).is_none() {
                    continue;
                }
                let mut entry = Members::default();
                for member in &rel.refs {
                    if let OsmId::Way(way_id) = member.member {
                        match member.role.as_str() {
                            "outer" | "" => entry.outer.push(way_id),
                            "inner" => entry.inner.push(way_id),
                            _ => continue,
                        }
                        needed_ways.insert(way_id);
                    }
                }
                members.insert(rel.id, entry);
            }
        }
        info!("Found {} boundary relations", members.len());

        info!("Pass 2/3: Collecting member ways...");
        reader.rewind()?;

        let mut way_nodes = HashMap::new();
        let mut needed_nodes = HashSet::new();

        for obj in reader.iter() {
            if let OsmObj::Way(way) = obj? {
                if needed_ways.contains(&way.id) {
                    needed_nodes.extend(way.nodes.iter().copied());
                    way_nodes.insert(way.id, way.nodes);
                }
            }
        }
        info!(
            "Found {} member ways referencing {} nodes",
            way_nodes.len(),
            needed_nodes.len()
        );

        info!("Pass 3/3: Storing node coordinates...");
        reader.rewind()?;

        let dir = Builder::new().prefix("admintiles-nodes-").tempdir()?;
        let node_db = sled::open(dir.path())?;
        let mut stored = 0usize;

        for obj in reader.iter() {
            if let OsmObj::Node(node) = obj? {
                if needed_nodes.contains(&node.id) {
                    node_db.insert(node.id.0.to_be_bytes(), &encode_coord(node.lon(), node.lat()))?;
                    stored += 1;
                }
            }
        }
        node_db.flush()?;
        info!("Stored {} node coordinates", stored);

        Ok(Self {
            node_db,
            way_nodes,
            members,
            _dir: dir,
        })
    }

    fn node(&self, id: NodeId) -> Option<Coord<f64>> {
        match self.node_db.get(id.0.to_be_bytes()) {
            Ok(Some(bytes)) => decode_coord(&bytes),
            _ => None,
        }
    }

    fn segments(&self, ways: &[WayId]) -> Vec<Vec<Coord<f64>>> {
        ways.iter()
            .filter_map(|way_id| self.way_nodes.get(way_id))
            .map(|nodes| nodes.iter().filter_map(|n| self.node(*n)).collect::<Vec<_>>())
            .filter(|coords| coords.len() >= 2)
            .collect()
    }

    /// Outer rings become polygons; each inner ring is cut from the outer
    /// polygon holding its first vertex.
    pub fn resolve(&self, id: RelationId) -> Option<MultiPolygon<f64>> {
        let members = self.members.get(&id)?;

        let mut polygons = assemble_rings(self.segments(&members.outer));
        if polygons.is_empty() {
            return None;
        }

        for hole in assemble_rings(self.segments(&members.inner)) {
            let Some(first) = hole.exterior().0.first().copied() else {
                continue;
            };
            let sample = Point::from(first);
            if let Some(outer) = polygons.iter_mut().find(|p| p.contains(&sample)) {
                outer.interiors_push(hole.exterior().clone());
            } else {
                debug!("Inner ring of relation {} lies outside its outer rings", id.0);
            }
        }

        Some(MultiPolygon::new(polygons))
    }
}

fn to_feature(rel: &Relation, level: u8, geometry: Option<MultiPolygon<f64>>) -> BoundaryFeature {
    let mut feature = BoundaryFeature::new(FeatureKind::Relation).with_level(level).with_id(rel.id.0);
    feature.geometry = geometry;

    for (key, value) in rel.tags.iter() {
        if key == "name" {
            feature.names.insert("default".to_string(), value.to_string());
        } else if let Some(lang) = key.strip_prefix("name:") {
            feature.names.insert(lang.to_string(), value.to_string());
        }
    }

    feature.iso2 = rel
        .tags
        .get("ISO3166-1:alpha2")
        .or_else(|| rel.tags.get("ISO3166-1"))
        .map(|code| code.to_ascii_uppercase());

    feature
}

/// Read every administrative boundary relation of a PBF file.
pub fn read_boundaries(path: &Path) -> Result<Vec<BoundaryFeature>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = OsmPbfReader::new(file);

    let resolver = BoundaryResolver::build(&mut reader)?;

    info!("Assembling boundary geometries...");
    reader.rewind()?;

    let mut features = Vec::new();
    let mut unresolved = 0usize;

    for obj in reader.iter() {
        let OsmObj::Relation(rel) = obj? else {
            continue;
        };
        let Some(level) = relation_level(&rel) else {
            continue;
        };

        let geometry = resolver.resolve(rel.id);
        if geometry.is_none() {
            unresolved += 1;
            debug!("Could not resolve geometry for relation {}", rel.id.0);
        }
        features.push(to_feature(&rel, level, geometry));
    }

    info!(
        "Read {} boundary relations ({} without geometry)",
        features.len(),
        unresolved
    );
    Ok(features)
}
