//! Per-level dissolving of boundary features.
//!
//! Selects the relation polygons tagged with one admin level, unions all
//! parts that share an OSM id and indexes the result.

use geo::{BooleanOps, MultiPolygon};
use hashbrown::HashMap;
use std::collections::HashMap as StdHashMap;
use tracing::{debug, info};

use super::index::{DissolvedPolygon, LevelIndex, LevelSet};
use crate::error::AssignError;
use crate::models::{AdminLevel, BoundaryFeature, FeatureKind};

/// Dissolve a level that must be present.
pub fn dissolve_required(
    features: &[BoundaryFeature],
    level: AdminLevel,
    tag: u8,
) -> Result<LevelIndex, AssignError> {
    match dissolve_optional(features, level, tag)? {
        LevelSet::Present(index) => Ok(index),
        LevelSet::Absent => Err(AssignError::MissingLevel { level, tag }),
    }
}

/// Dissolve a level that may be missing from the input.
pub fn dissolve_optional(
    features: &[BoundaryFeature],
    level: AdminLevel,
    tag: u8,
) -> Result<LevelSet, AssignError> {
    let selected: Vec<&BoundaryFeature> = features
        .iter()
        .filter(|f| f.kind == FeatureKind::Relation)
        .filter(|f| f.admin_level == Some(tag))
        .filter(|f| f.geometry.is_some())
        .collect();

    if selected.is_empty() {
        info!("No relation polygons for {} (admin_level={})", level, tag);
        return Ok(LevelSet::Absent);
    }

    let polygons = group_by_id(&selected, level, tag)?;

    info!(
        "Dissolved {} {} features into {} polygons",
        selected.len(),
        level,
        polygons.len()
    );

    Ok(LevelSet::Present(LevelIndex::build(level, tag, polygons)))
}

struct Group {
    id: i64,
    parts: Vec<MultiPolygon<f64>>,
    names: StdHashMap<String, String>,
}

fn group_by_id(
    selected: &[&BoundaryFeature],
    level: AdminLevel,
    tag: u8,
) -> Result<Vec<DissolvedPolygon>, AssignError> {
    let mut position: HashMap<i64, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for feature in selected {
        let id = feature
            .osm_id
            .ok_or(AssignError::MissingIdentifier { level, tag })?;
        let Some(geometry) = feature.geometry.clone() else {
            continue;
        };

        match position.get(&id) {
            Some(&idx) => {
                let group = &mut groups[idx];
                group.parts.push(geometry);
                for (lang, name) in &feature.names {
                    group
                        .names
                        .entry(lang.clone())
                        .or_insert_with(|| name.clone());
                }
            }
            None => {
                position.insert(id, groups.len());
                groups.push(Group {
                    id,
                    parts: vec![geometry],
                    names: feature.names.clone(),
                });
            }
        }
    }

    Ok(groups.into_iter().map(dissolve_group).collect())
}

fn dissolve_group(group: Group) -> DissolvedPolygon {
    let part_count = group.parts.len();
    let geometry = group
        .parts
        .into_iter()
        .reduce(|a, b| a.union(&b))
        .unwrap_or_else(|| MultiPolygon::new(vec![]));

    if part_count > 1 {
        debug!("Unioned {} parts of id {}", part_count, group.id);
    }

    DissolvedPolygon {
        id: group.id,
        geometry,
        names: group.names,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area, Contains, Point};

    fn square_feature(id: i64, tag: u8, min: (f64, f64), max: (f64, f64)) -> BoundaryFeature {
        let square = polygon![
            (x: min.0, y: min.1),
            (x: max.0, y: min.1),
            (x: max.0, y: max.1),
            (x: min.0, y: max.1),
        ];
        BoundaryFeature::new(FeatureKind::Relation)
            .with_geometry(MultiPolygon::new(vec![square]))
            .with_level(tag)
            .with_id(id)
    }

    #[test]
    fn test_required_level_missing() {
        let features = vec![square_feature(1, 2, (0.0, 0.0), (1.0, 1.0))];
        let err = dissolve_required(&features, AdminLevel::Fine, 8)
            .err()
            .expect("level 8 is missing");
        assert!(matches!(
            err,
            AssignError::MissingLevel {
                level: AdminLevel::Fine,
                tag: 8
            }
        ));
    }

    #[test]
    fn test_optional_level_absent() {
        let features = vec![square_feature(1, 2, (0.0, 0.0), (1.0, 1.0))];
        let set = dissolve_optional(&features, AdminLevel::Medium, 4).expect("optional");
        assert!(!set.is_present());
    }

    #[test]
    fn test_non_relation_features_are_ignored() {
        let mut way = square_feature(1, 8, (0.0, 0.0), (1.0, 1.0));
        way.kind = FeatureKind::Way;
        let err = dissolve_required(&[way], AdminLevel::Fine, 8);
        assert!(matches!(err, Err(AssignError::MissingLevel { .. })));
    }

    #[test]
    fn test_missing_geometry_is_ignored() {
        let feature = BoundaryFeature::new(FeatureKind::Relation)
            .with_level(8)
            .with_id(5);
        let set = dissolve_optional(&[feature], AdminLevel::Fine, 8).expect("optional");
        assert!(!set.is_present());
    }

    #[test]
    fn test_missing_identifier() {
        let mut feature = square_feature(1, 8, (0.0, 0.0), (1.0, 1.0));
        feature.osm_id = None;
        let err = dissolve_required(&[feature], AdminLevel::Fine, 8);
        assert!(matches!(
            err,
            Err(AssignError::MissingIdentifier { tag: 8, .. })
        ));
    }

    #[test]
    fn test_same_id_parts_are_unioned() {
        let features = vec![
            square_feature(10, 8, (0.0, 0.0), (1.0, 1.0)),
            square_feature(20, 8, (5.0, 5.0), (6.0, 6.0)),
            square_feature(10, 8, (1.0, 0.0), (2.0, 1.0)),
        ];
        let index = dissolve_required(&features, AdminLevel::Fine, 8).expect("present");

        assert_eq!(index.len(), 2);
        let ids: Vec<i64> = index.polygons().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![10, 20]);

        let merged = index.get(10).expect("id 10");
        assert!((merged.geometry.unsigned_area() - 2.0).abs() < 1e-9);
        // The shared edge is interior after the union
        assert!(merged.geometry.contains(&Point::new(1.0, 0.5)));
        assert_eq!(index.find_enclosing(&Point::new(1.0, 0.5)), Some(10));
    }

    #[test]
    fn test_dissolve_never_loses_area() {
        let features = vec![
            square_feature(10, 8, (0.0, 0.0), (2.0, 2.0)),
            square_feature(10, 8, (1.0, 1.0), (3.0, 3.0)),
            square_feature(10, 8, (10.0, 10.0), (11.0, 11.0)),
        ];
        let index = dissolve_required(&features, AdminLevel::Fine, 8).expect("present");
        let merged = index.get(10).expect("id 10");

        for feature in &features {
            let part = feature.geometry.as_ref().expect("geometry");
            let missing = part.difference(&merged.geometry);
            assert!(missing.unsigned_area() < 1e-9);
        }
        // 4 + 4 - 1 overlap + 1 separate island
        assert!((merged.geometry.unsigned_area() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_names_win() {
        let features = vec![
            square_feature(10, 8, (0.0, 0.0), (1.0, 1.0)).with_name("default", "Espoo"),
            square_feature(10, 8, (1.0, 0.0), (2.0, 1.0))
                .with_name("default", "Esbo")
                .with_name("sv", "Esbo"),
        ];
        let index = dissolve_required(&features, AdminLevel::Fine, 8).expect("present");
        let merged = index.get(10).expect("id 10");
        assert_eq!(merged.names.get("default").map(String::as_str), Some("Espoo"));
        assert_eq!(merged.names.get("sv").map(String::as_str), Some("Esbo"));
    }
}
