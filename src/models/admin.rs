//! Administrative hierarchy levels used by the tile assignment.

use serde::{Deserialize, Serialize};

/// The three fixed granularities a tile is tagged with.
/// See: https://wiki.openstreetmap.org/wiki/Tag:boundary%3Dadministrative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AdminLevel {
    /// Country (admin_level=2 by default)
    Coarse,
    /// Region / state / province (admin_level=4 by default)
    Medium,
    /// Municipality (admin_level=8 by default)
    Fine,
}

impl AdminLevel {
    /// Get all levels in hierarchical order (country first)
    pub fn all() -> &'static [AdminLevel] {
        &[AdminLevel::Coarse, AdminLevel::Medium, AdminLevel::Fine]
    }

    /// Get the field name for this level
    pub fn field_name(&self) -> &'static str {
        match self {
            AdminLevel::Coarse => "country",
            AdminLevel::Medium => "region",
            AdminLevel::Fine => "municipality",
        }
    }
}

impl std::fmt::Display for AdminLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Mapping from semantic level to the OSM `admin_level` tag it is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelTags {
    pub coarse: u8,
    pub medium: u8,
    pub fine: u8,
}

impl Default for LevelTags {
    fn default() -> Self {
        Self {
            coarse: 2,
            medium: 4,
            fine: 8,
        }
    }
}

impl LevelTags {
    /// Get the OSM admin_level number for a level
    pub fn tag(&self, level: AdminLevel) -> u8 {
        match level {
            AdminLevel::Coarse => self.coarse,
            AdminLevel::Medium => self.medium,
            AdminLevel::Fine => self.fine,
        }
    }

    /// Convert an OSM admin_level number to the configured level, if any
    pub fn level_of(&self, tag: u8) -> Option<AdminLevel> {
        AdminLevel::all()
            .iter()
            .copied()
            .find(|level| self.tag(*level) == tag)
    }

    /// Compact label such as `248`, used in output file names
    pub fn label(&self) -> String {
        format!("{}{}{}", self.coarse, self.medium, self.fine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tags() {
        let tags = LevelTags::default();
        assert_eq!(tags.tag(AdminLevel::Coarse), 2);
        assert_eq!(tags.tag(AdminLevel::Medium), 4);
        assert_eq!(tags.tag(AdminLevel::Fine), 8);
        assert_eq!(tags.label(), "248");
    }

    #[test]
    fn test_level_of() {
        let tags = LevelTags {
            coarse: 2,
            medium: 6,
            fine: 7,
        };
        assert_eq!(tags.level_of(6), Some(AdminLevel::Medium));
        assert_eq!(tags.level_of(7), Some(AdminLevel::Fine));
        assert_eq!(tags.level_of(8), None);
    }
}
