//! Per-run choice of level tags and checks.
//!
//! Explicit settings win. A country rule matched on the ISO code of the
//! coarse-level relation fills what is unset, and the level tags still
//! missing after that are picked from the relation counts per admin_level.

use std::collections::BTreeMap;
use tracing::info;

use crate::config::{check_levels, Config, CoverageRule, TileExpectation};
use crate::error::AssignError;
use crate::models::{BoundaryFeature, FeatureKind, LevelTags};

/// Level tags and checks that apply to one input
#[derive(Debug, Clone, PartialEq)]
pub struct RunProfile {
    pub levels: LevelTags,
    /// ISO code of the coarse-level relation, if tagged
    pub iso2: Option<String>,
    pub coverage: Option<CoverageRule>,
    /// Tile count expectation matching the run's zoom
    pub expected_tiles: Option<TileExpectation>,
}

/// Relation features with an areal geometry per admin_level
pub fn relation_counts(features: &[BoundaryFeature]) -> BTreeMap<u8, usize> {
    let mut counts = BTreeMap::new();
    for feature in features {
        if feature.kind != FeatureKind::Relation || !feature.has_area() {
            continue;
        }
        if let Some(tag) = feature.admin_level {
            *counts.entry(tag).or_insert(0) += 1;
        }
    }
    counts
}

/// ISO code of the first coarse-level relation that carries one
pub fn country_code(features: &[BoundaryFeature], coarse: u8) -> Option<String> {
    features
        .iter()
        .filter(|f| f.kind == FeatureKind::Relation && f.admin_level == Some(coarse))
        .find_map(|f| f.iso2.clone())
}

/// Fine level from the counts: 8 or 7, whichever has more relations
pub fn choose_fine(counts: &BTreeMap<u8, usize>) -> u8 {
    let count = |tag: u8| counts.get(&tag).copied().unwrap_or(0);
    if count(7) > count(8) {
        7
    } else {
        8
    }
}

/// Medium level from the counts: 4, else 6, else the lowest level present
/// strictly between the coarse and fine levels.
///
/// With none of these present an empty tag is returned, so the medium level
/// resolves as absent.
pub fn choose_medium(counts: &BTreeMap<u8, usize>, coarse: u8, fine: u8) -> u8 {
    let present = |tag: u8| counts.get(&tag).copied().unwrap_or(0) > 0;
    let usable = |tag: u8| tag != coarse && tag != fine;

    if let Some(tag) = [4, 6]
        .into_iter()
        .find(|&tag| usable(tag) && tag < fine && present(tag))
    {
        return tag;
    }
    if let Some(tag) = (coarse.saturating_add(1)..fine).find(|&tag| present(tag)) {
        return tag;
    }

    [4, 6, 3, 5, 7, 8]
        .into_iter()
        .find(|&tag| usable(tag) && !present(tag))
        .unwrap_or(if fine > 4 { 4 } else { 6 })
}

/// Settle the level tags and checks for `features`.
pub fn resolve_profile(
    config: &Config,
    features: &[BoundaryFeature],
) -> Result<RunProfile, AssignError> {
    let iso2 = country_code(features, config.coarse_level);
    let rule = iso2.as_deref().and_then(|code| config.country_rule(code));

    let counts = relation_counts(features);
    let fine = config
        .fine_level
        .or_else(|| rule.and_then(|r| r.fine_level))
        .unwrap_or_else(|| choose_fine(&counts));
    let medium = config
        .medium_level
        .or_else(|| rule.and_then(|r| r.medium_level))
        .unwrap_or_else(|| choose_medium(&counts, config.coarse_level, fine));

    let levels = LevelTags {
        coarse: config.coarse_level,
        medium,
        fine,
    };
    check_levels(levels.coarse, Some(levels.medium), Some(levels.fine))?;

    let coverage = config
        .coverage
        .clone()
        .or_else(|| rule.and_then(|r| r.coverage.clone()));
    let expected_tiles = config
        .expected_tiles
        .clone()
        .or_else(|| rule.and_then(|r| r.expected_tiles.clone()))
        .filter(|e| e.applies_to(config.zoom));

    info!(
        "Levels for iso={}{}: coarse={} medium={} fine={}",
        iso2.as_deref().unwrap_or("?"),
        if rule.is_some() { " (country rule)" } else { "" },
        levels.coarse,
        levels.medium,
        levels.fine
    );

    Ok(RunProfile {
        levels,
        iso2,
        coverage,
        expected_tiles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CountryRule;
    use geo::{polygon, MultiPolygon};

    fn relation(tag: u8, id: i64) -> BoundaryFeature {
        BoundaryFeature::new(FeatureKind::Relation)
            .with_geometry(MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
            ]]))
            .with_level(tag)
            .with_id(id)
    }

    fn country(iso2: &str) -> BoundaryFeature {
        let mut feature = relation(2, 1);
        feature.iso2 = Some(iso2.to_string());
        feature
    }

    fn counts(pairs: &[(u8, usize)]) -> BTreeMap<u8, usize> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_fine_level_by_relation_count() {
        assert_eq!(choose_fine(&counts(&[(8, 300), (7, 15)])), 8);
        assert_eq!(choose_fine(&counts(&[(8, 3), (7, 79)])), 7);
        assert_eq!(choose_fine(&counts(&[(8, 5), (7, 5)])), 8);
        assert_eq!(choose_fine(&counts(&[(2, 1)])), 8);
    }

    #[test]
    fn test_medium_level_preference() {
        assert_eq!(choose_medium(&counts(&[(4, 19), (6, 70), (8, 300)]), 2, 8), 4);
        assert_eq!(choose_medium(&counts(&[(6, 15), (7, 79)]), 2, 7), 6);
        assert_eq!(choose_medium(&counts(&[(5, 3), (7, 40)]), 2, 7), 5);
        assert_eq!(choose_medium(&counts(&[(3, 2), (5, 3), (8, 40)]), 2, 8), 3);
    }

    #[test]
    fn test_missing_medium_level_gets_an_empty_tag() {
        let sparse = counts(&[(2, 1), (8, 40)]);
        assert_eq!(choose_medium(&sparse, 2, 8), 4);

        // Fine level 4 with only level 6 above it
        let deep = counts(&[(2, 1), (4, 81), (6, 900)]);
        let medium = choose_medium(&deep, 2, 4);
        assert_eq!(medium, 3);
        assert!(!deep.contains_key(&medium));
    }

    #[test]
    fn test_counts_only_areal_relations() {
        let mut way = relation(8, 5);
        way.kind = FeatureKind::Way;
        let no_area = BoundaryFeature::new(FeatureKind::Relation).with_level(8);
        let counts = relation_counts(&[relation(8, 1), relation(8, 2), way, no_area]);
        assert_eq!(counts.get(&8), Some(&2));
    }

    #[test]
    fn test_counted_levels_without_settings() {
        let features = vec![
            country("EE"),
            relation(6, 10),
            relation(7, 20),
            relation(7, 21),
            relation(8, 30),
        ];
        let profile = resolve_profile(&Config::default(), &features).expect("profile");
        assert_eq!(
            profile.levels,
            LevelTags {
                coarse: 2,
                medium: 6,
                fine: 7
            }
        );
        assert_eq!(profile.iso2.as_deref(), Some("EE"));
        assert_eq!(profile.coverage, None);
    }

    #[test]
    fn test_country_rule_fills_unset_values() {
        let mut config = Config::default();
        config.countries.insert(
            "DK".to_string(),
            CountryRule {
                fine_level: Some(7),
                medium_level: Some(4),
                coverage: Some(CoverageRule {
                    baseline_tag: Some(4),
                    min_ratio: 0.95,
                }),
                expected_tiles: None,
            },
        );
        let features = vec![country("DK"), relation(4, 10), relation(7, 20), relation(8, 30)];

        let profile = resolve_profile(&config, &features).expect("profile");
        assert_eq!(profile.levels.fine, 7);
        assert_eq!(profile.levels.medium, 4);
        assert_eq!(profile.coverage.map(|c| c.baseline_tag), Some(Some(4)));

        // An explicit fine level beats the country rule
        config.fine_level = Some(8);
        let profile = resolve_profile(&config, &features).expect("profile");
        assert_eq!(profile.levels.fine, 8);
        assert_eq!(profile.levels.medium, 4);
    }

    #[test]
    fn test_tile_expectation_follows_zoom() {
        let mut config = Config::default();
        config.countries.insert(
            "EE".to_string(),
            CountryRule {
                expected_tiles: Some(TileExpectation {
                    expected: 26826,
                    tolerance: 0.10,
                    zoom: Some(14),
                }),
                ..CountryRule::default()
            },
        );
        let features = vec![country("EE"), relation(8, 30)];

        let profile = resolve_profile(&config, &features).expect("profile");
        assert_eq!(profile.expected_tiles.map(|e| e.expected), Some(26826));

        config.zoom = 12;
        let profile = resolve_profile(&config, &features).expect("profile");
        assert!(profile.expected_tiles.is_none());
    }

    #[test]
    fn test_unknown_country_uses_counts() {
        let mut config = Config::default();
        config
            .countries
            .insert("DK".to_string(), CountryRule::default());
        let features = vec![country("SE"), relation(4, 10), relation(7, 20)];
        let profile = resolve_profile(&config, &features).expect("profile");
        assert_eq!(profile.levels.fine, 7);
        assert_eq!(profile.levels.medium, 4);
    }
}
