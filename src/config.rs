//! Run configuration, loadable from a TOML file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::AssignError;
use crate::models::LevelTags;
use crate::tile::MAX_ZOOM;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tile zoom level for the whole run
    pub zoom: u8,
    /// admin_level of the coarse (country) level
    pub coarse_level: u8,
    /// admin_level of the medium level; picked from the input when unset
    pub medium_level: Option<u8>,
    /// admin_level of the fine level; picked from the input when unset
    pub fine_level: Option<u8>,
    /// Fail when the medium level is missing instead of tagging tiles with `-`
    pub medium_required: bool,
    /// Use this coarse-level id instead of resolving it from the geometry
    pub coarse_id: Option<i64>,
    /// Scan fine-level polygons on the rayon thread pool
    pub parallel: bool,
    pub coverage: Option<CoverageRule>,
    pub expected_tiles: Option<TileExpectation>,
    /// Per-country defaults keyed by ISO 3166-1 alpha-2 code
    pub countries: BTreeMap<String, CountryRule>,
}

/// Minimum share of the baseline level's area the fine level must cover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRule {
    /// admin_level used as the reference area; defaults to the coarse level
    pub baseline_tag: Option<u8>,
    pub min_ratio: f64,
}

/// Expected number of written tiles with a relative tolerance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileExpectation {
    pub expected: u64,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Only applies at this zoom; any zoom when unset
    #[serde(default)]
    pub zoom: Option<u8>,
}

/// Settings used for one country unless the run sets them explicitly
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountryRule {
    pub fine_level: Option<u8>,
    pub medium_level: Option<u8>,
    pub coverage: Option<CoverageRule>,
    pub expected_tiles: Option<TileExpectation>,
}

fn default_tolerance() -> f64 {
    0.10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zoom: 14,
            coarse_level: 2,
            medium_level: None,
            fine_level: None,
            medium_required: false,
            coarse_id: None,
            parallel: false,
            coverage: None,
            expected_tiles: None,
            countries: BTreeMap::new(),
        }
    }
}

fn check_tag(tag: u8) -> Result<(), AssignError> {
    if (2..=8).contains(&tag) {
        Ok(())
    } else {
        Err(AssignError::InvalidConfig(format!(
            "admin_level {} is outside 2..=8",
            tag
        )))
    }
}

pub(crate) fn check_levels(
    coarse: u8,
    medium: Option<u8>,
    fine: Option<u8>,
) -> Result<(), AssignError> {
    for tag in [Some(coarse), medium, fine].into_iter().flatten() {
        check_tag(tag)?;
    }
    let clash =
        medium == Some(coarse) || fine == Some(coarse) || (fine.is_some() && medium == fine);
    if clash {
        return Err(AssignError::InvalidConfig(format!(
            "admin levels must be distinct (got coarse={} medium={:?} fine={:?})",
            coarse, medium, fine
        )));
    }
    Ok(())
}

fn check_coverage_rule(rule: &CoverageRule) -> Result<(), AssignError> {
    if !(0.0..=1.0).contains(&rule.min_ratio) {
        return Err(AssignError::InvalidConfig(format!(
            "coverage min_ratio {} is outside 0..=1",
            rule.min_ratio
        )));
    }
    Ok(())
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Check zoom range, level tags and country rules
    pub fn validate(&self) -> Result<(), AssignError> {
        if self.zoom > MAX_ZOOM {
            return Err(AssignError::InvalidConfig(format!(
                "zoom {} is above the maximum {}",
                self.zoom, MAX_ZOOM
            )));
        }

        check_levels(self.coarse_level, self.medium_level, self.fine_level)?;
        if let Some(rule) = &self.coverage {
            check_coverage_rule(rule)?;
        }

        for (code, rule) in &self.countries {
            check_levels(self.coarse_level, rule.medium_level, rule.fine_level).map_err(|e| {
                AssignError::InvalidConfig(format!("country {}: {}", code, e))
            })?;
            if let Some(coverage) = &rule.coverage {
                check_coverage_rule(coverage)?;
            }
        }

        Ok(())
    }

    /// Level tags when both medium and fine are set explicitly
    pub fn fixed_levels(&self) -> Option<LevelTags> {
        Some(LevelTags {
            coarse: self.coarse_level,
            medium: self.medium_level?,
            fine: self.fine_level?,
        })
    }

    /// Rule for a country code, matched case-insensitively
    pub fn country_rule(&self, iso2: &str) -> Option<&CountryRule> {
        self.countries
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(iso2))
            .map(|(_, rule)| rule)
    }

    /// Default output prefix, e.g. `z14_level248_ids`
    pub fn output_prefix(&self, levels: &LevelTags) -> String {
        format!("z{}_level{}_ids", self.zoom, levels.label())
    }
}

impl TileExpectation {
    /// Relative deviation of `written` from the expectation
    pub fn deviation(&self, written: u64) -> f64 {
        if self.expected == 0 {
            return if written == 0 { 0.0 } else { f64::INFINITY };
        }
        (written as f64 - self.expected as f64).abs() / self.expected as f64
    }

    pub fn is_met(&self, written: u64) -> bool {
        self.deviation(written) <= self.tolerance
    }

    pub fn applies_to(&self, zoom: u8) -> bool {
        self.zoom.map_or(true, |z| z == zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.zoom, 14);
        assert_eq!(config.coarse_level, 2);
        assert_eq!(config.fixed_levels(), None);
        assert!(!config.medium_required);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.output_prefix(&LevelTags::default()),
            "z14_level248_ids"
        );
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
zoom = 12
parallel = true
medium_level = 6
fine_level = 7

[expected_tiles]
expected = 26826

[countries.DK]
fine_level = 7
medium_level = 4

[countries.DK.coverage]
baseline_tag = 4
min_ratio = 0.95

[countries.EE.expected_tiles]
expected = 26826
zoom = 14
"#
        )
        .expect("write config");

        let config = Config::load_from_file(file.path()).expect("valid config");
        assert_eq!(config.zoom, 12);
        assert!(config.parallel);
        assert_eq!(
            config.fixed_levels(),
            Some(LevelTags {
                coarse: 2,
                medium: 6,
                fine: 7
            })
        );
        let expectation = config.expected_tiles.as_ref().expect("expectation");
        assert_eq!(expectation.expected, 26826);
        assert_eq!(expectation.tolerance, 0.10);
        assert!(expectation.applies_to(3));

        let dk = config.country_rule("dk").expect("DK rule");
        assert_eq!(dk.fine_level, Some(7));
        assert_eq!(dk.coverage.as_ref().map(|c| c.baseline_tag), Some(Some(4)));

        let ee = config.country_rule("EE").expect("EE rule");
        let ee_tiles = ee.expected_tiles.as_ref().expect("EE tiles");
        assert!(ee_tiles.applies_to(14));
        assert!(!ee_tiles.applies_to(12));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_levels() {
        let config = Config {
            fine_level: Some(9),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AssignError::InvalidConfig(_))
        ));

        let config = Config {
            medium_level: Some(2),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            medium_level: Some(7),
            fine_level: Some(7),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            zoom: 30,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.countries.insert(
            "XX".to_string(),
            CountryRule {
                fine_level: Some(2),
                ..CountryRule::default()
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tile_expectation() {
        let expectation = TileExpectation {
            expected: 1000,
            tolerance: 0.10,
            zoom: None,
        };
        assert!(expectation.is_met(1100));
        assert!(expectation.is_met(900));
        assert!(!expectation.is_met(1101));
        assert!((expectation.deviation(1050) - 0.05).abs() < 1e-12);
    }
}
