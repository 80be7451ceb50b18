//! Catalog of the admin areas referenced by tile assignments.
//!
//! One document per (level, id) with all names seen for it, so tile ids can
//! be turned back into names.

use anyhow::{bail, Result};
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::AssignError;
use crate::models::{display_name, BoundaryFeature, FeatureKind, LevelTags};

fn keeps(keep_langs: Option<&HashSet<String>>, lang: &str) -> bool {
    lang == "default" || keep_langs.map_or(true, |keep| keep.contains(lang))
}

/// `(level, id)` from a key such as `l8_123`
fn parse_key(key: &str) -> Option<(u8, i64)> {
    let (level, id) = key.strip_prefix('l')?.split_once('_')?;
    Some((level.parse().ok()?, id.parse().ok()?))
}

/// Admin area document keyed `l{level}_{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminDoc {
    pub level: u8,
    pub id: i64,
    /// `"default"` plus language codes
    pub names: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl AdminDoc {
    pub fn key(&self) -> String {
        format!("l{}_{}", self.level, self.id)
    }
}

#[derive(Debug, Default)]
pub struct AdminCatalog {
    docs: Vec<AdminDoc>,
    positions: HashMap<(u8, i64), usize>,
    /// Features at a configured level that were merged into an existing doc
    pub merged: usize,
}

impl AdminCatalog {
    /// Collect relation features at the three configured levels.
    ///
    /// `keep_langs` limits the language names; the default name is always
    /// kept. Features of the same key are merged, later names overwrite.
    pub fn build(
        features: &[BoundaryFeature],
        levels: &LevelTags,
        keep_langs: Option<&HashSet<String>>,
    ) -> Result<Self, AssignError> {
        let mut catalog = Self::default();

        for feature in features {
            if feature.kind != FeatureKind::Relation || !feature.has_area() {
                continue;
            }
            let Some((tag, level)) = feature
                .admin_level
                .and_then(|tag| levels.level_of(tag).map(|level| (tag, level)))
            else {
                continue;
            };
            let id = feature
                .osm_id
                .ok_or(AssignError::MissingIdentifier { level, tag })?;

            let names: std::collections::HashMap<String, String> = feature
                .names
                .iter()
                .filter(|(lang, _)| keeps(keep_langs, lang))
                .map(|(lang, name)| (lang.clone(), name.clone()))
                .collect();
            let display = display_name(&names).map(str::to_string);

            catalog.insert(tag, id, names, display);
        }

        info!(
            "Built {} admin documents ({} merged features)",
            catalog.docs.len(),
            catalog.merged
        );
        Ok(catalog)
    }

    /// Merge an admins map `{ "l8_123": {level, id, names, display_name}, ... }`.
    ///
    /// Values that are not objects are skipped, as are entries whose level or
    /// id is neither given nor readable from the key. Returns the number of
    /// entries taken.
    pub fn merge_map(
        &mut self,
        map: &Value,
        keep_langs: Option<&HashSet<String>>,
    ) -> Result<usize> {
        let Some(entries) = map.as_object() else {
            bail!("admins map is not a JSON object");
        };

        let mut taken = 0;
        for (key, entry) in entries {
            let Some(fields) = entry.as_object() else {
                debug!("Skipping {}: not an object", key);
                continue;
            };

            let from_key = parse_key(key);
            let level = fields
                .get("level")
                .and_then(Value::as_u64)
                .and_then(|l| u8::try_from(l).ok())
                .or(from_key.map(|(level, _)| level));
            let id = fields
                .get("id")
                .and_then(Value::as_i64)
                .or(from_key.map(|(_, id)| id));
            let (Some(level), Some(id)) = (level, id) else {
                debug!("Skipping {}: no level or id", key);
                continue;
            };

            let names: std::collections::HashMap<String, String> = fields
                .get("names")
                .and_then(Value::as_object)
                .into_iter()
                .flatten()
                .filter_map(|(lang, name)| Some((lang.clone(), name.as_str()?.to_string())))
                .filter(|(lang, _)| keeps(keep_langs, lang))
                .collect();
            let display = fields
                .get("display_name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| display_name(&names).map(str::to_string));

            self.insert(level, id, names, display);
            taken += 1;
        }

        info!(
            "Merged {} of {} admins map entries ({} documents)",
            taken,
            entries.len(),
            self.docs.len()
        );
        Ok(taken)
    }

    fn insert(
        &mut self,
        level: u8,
        id: i64,
        names: std::collections::HashMap<String, String>,
        display: Option<String>,
    ) {
        if let Some(&position) = self.positions.get(&(level, id)) {
            let doc = &mut self.docs[position];
            doc.names.extend(names);
            if doc.display_name.is_none() {
                doc.display_name = display;
            }
            self.merged += 1;
            return;
        }

        self.positions.insert((level, id), self.docs.len());
        self.docs.push(AdminDoc {
            level,
            id,
            names: names.into_iter().collect(),
            display_name: display,
        });
    }

    /// Documents in first-seen order
    pub fn docs(&self) -> &[AdminDoc] {
        &self.docs
    }

    pub fn get(&self, level: u8, id: i64) -> Option<&AdminDoc> {
        self.positions.get(&(level, id)).map(|&i| &self.docs[i])
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Document counts per level tag
    pub fn level_counts(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::new();
        for doc in &self.docs {
            *counts.entry(doc.level).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn area(id: Option<i64>, level: u8, names: &[(&str, &str)]) -> BoundaryFeature {
        let mut feature = BoundaryFeature::new(FeatureKind::Relation)
            .with_geometry(MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
            ]]))
            .with_level(level);
        feature.osm_id = id;
        for (lang, name) in names {
            feature = feature.with_name(lang, name);
        }
        feature
    }

    #[test]
    fn test_docs_per_level_and_id() {
        let features = vec![
            area(Some(54224), 2, &[("default", "Suomi"), ("en", "Finland")]),
            area(Some(34914), 8, &[("default", "Helsinki"), ("sv", "Helsingfors")]),
            area(Some(999), 6, &[("default", "Uusimaa")]),
        ];
        let catalog = AdminCatalog::build(&features, &LevelTags::default(), None).expect("built");

        assert_eq!(catalog.len(), 2);
        let country = catalog.get(2, 54224).expect("country");
        assert_eq!(country.key(), "l2_54224");
        assert_eq!(country.display_name.as_deref(), Some("Finland"));

        let city = catalog.get(8, 34914).expect("city");
        assert_eq!(city.display_name.as_deref(), Some("Helsinki"));
        assert_eq!(city.names.len(), 2);
        assert_eq!(catalog.level_counts().get(&8), Some(&1));
    }

    #[test]
    fn test_same_key_is_merged() {
        let features = vec![
            area(Some(1), 8, &[("default", "Espoo")]),
            area(Some(1), 8, &[("sv", "Esbo"), ("default", "Espoo kaupunki")]),
        ];
        let catalog = AdminCatalog::build(&features, &LevelTags::default(), None).expect("built");

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.merged, 1);
        let doc = &catalog.docs()[0];
        assert_eq!(doc.names.get("sv").map(String::as_str), Some("Esbo"));
        assert_eq!(doc.names.get("default").map(String::as_str), Some("Espoo kaupunki"));
        // First display name stays
        assert_eq!(doc.display_name.as_deref(), Some("Espoo"));
    }

    #[test]
    fn test_keep_langs() {
        let keep: HashSet<String> = ["fi".to_string()].into_iter().collect();
        let features = vec![area(
            Some(1),
            8,
            &[("default", "Vantaa"), ("fi", "Vantaa"), ("sv", "Vanda")],
        )];
        let catalog =
            AdminCatalog::build(&features, &LevelTags::default(), Some(&keep)).expect("built");
        let doc = &catalog.docs()[0];
        assert!(doc.names.contains_key("default"));
        assert!(doc.names.contains_key("fi"));
        assert!(!doc.names.contains_key("sv"));
    }

    #[test]
    fn test_non_relations_are_ignored() {
        let mut way = area(Some(5), 8, &[("default", "Tie")]);
        way.kind = FeatureKind::Way;
        let catalog = AdminCatalog::build(&[way], &LevelTags::default(), None).expect("built");
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_missing_id_is_an_error() {
        let features = vec![area(None, 4, &[("default", "Uusimaa")])];
        let result = AdminCatalog::build(&features, &LevelTags::default(), None);
        assert!(matches!(
            result,
            Err(AssignError::MissingIdentifier { tag: 4, .. })
        ));
    }

    #[test]
    fn test_doc_serialization() {
        let doc = AdminDoc {
            level: 8,
            id: 7,
            names: BTreeMap::new(),
            display_name: None,
        };
        let json = serde_json::to_value(&doc).expect("json");
        assert!(json.get("display_name").is_none());
        assert_eq!(json["level"], 8);
    }

    #[test]
    fn test_admins_map_entries() {
        let map = serde_json::json!({
            "l8_34914": { "names": { "default": "Helsinki", "sv": "Helsingfors" } },
            "l4_37355": {
                "level": 4,
                "id": 37355,
                "names": { "default": "Uusimaa" },
                "display_name": "Nyland"
            },
            "l8_1": "not a document",
            "capital": { "names": { "default": "Helsinki" } }
        });
        let keep: HashSet<String> = ["fi".to_string()].into_iter().collect();

        let mut catalog = AdminCatalog::default();
        let taken = catalog.merge_map(&map, Some(&keep)).expect("merged");
        assert_eq!(taken, 2);
        assert_eq!(catalog.len(), 2);

        let city = catalog.get(8, 34914).expect("key gives level and id");
        assert_eq!(city.display_name.as_deref(), Some("Helsinki"));
        assert!(!city.names.contains_key("sv"));
        let region = catalog.get(4, 37355).expect("region");
        assert_eq!(region.display_name.as_deref(), Some("Nyland"));
    }

    #[test]
    fn test_admins_map_merges_into_built_docs() {
        let features = vec![area(Some(1), 8, &[("default", "Espoo")])];
        let mut catalog =
            AdminCatalog::build(&features, &LevelTags::default(), None).expect("built");
        let map = serde_json::json!({ "l8_1": { "names": { "sv": "Esbo" } } });
        catalog.merge_map(&map, None).expect("merged");

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.merged, 1);
        let doc = catalog.get(8, 1).expect("doc");
        assert_eq!(doc.names.get("sv").map(String::as_str), Some("Esbo"));
        assert_eq!(doc.display_name.as_deref(), Some("Espoo"));
    }

    #[test]
    fn test_admins_map_must_be_an_object() {
        let mut catalog = AdminCatalog::default();
        assert!(catalog.merge_map(&serde_json::json!([1, 2]), None).is_err());
    }
}
