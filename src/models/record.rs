//! Tile assignment records produced by the engine.

use serde::{Deserialize, Serialize};

use crate::tile::TileCoord;

/// Placeholder written for a missing medium-level id
pub const ABSENT_MARKER: &str = "-";

/// One tile tagged with its enclosing admin areas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileAssignment {
    pub tile: TileCoord,
    /// Tile center longitude
    pub lon: f64,
    /// Tile center latitude
    pub lat: f64,
    pub fine_id: i64,
    /// `None` when no medium-level polygon encloses the fine polygon
    pub medium_id: Option<i64>,
    pub coarse_id: i64,
}

impl TileAssignment {
    /// Medium id as written to text outputs
    pub fn medium_label(&self) -> String {
        self.medium_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| ABSENT_MARKER.to_string())
    }

    /// CSV row matching [`crate::sink::CsvSink`]'s header
    pub fn to_row(&self) -> [String; 8] {
        [
            self.tile.zoom.to_string(),
            self.tile.col.to_string(),
            self.tile.row.to_string(),
            self.lon.to_string(),
            self.lat.to_string(),
            self.fine_id.to_string(),
            self.medium_label(),
            self.coarse_id.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_medium_is_dash() {
        let record = TileAssignment {
            tile: TileCoord::new(14, 9300, 4700),
            lon: 24.3,
            lat: 60.1,
            fine_id: 100,
            medium_id: None,
            coarse_id: 1,
        };
        let row = record.to_row();
        assert_eq!(row[0], "14");
        assert_eq!(row[1], "9300");
        assert_eq!(row[2], "4700");
        assert_eq!(row[6], "-");
        assert_eq!(row[7], "1");
    }

    #[test]
    fn test_present_medium() {
        let record = TileAssignment {
            tile: TileCoord::new(14, 1, 2),
            lon: 0.0,
            lat: 0.0,
            fine_id: 100,
            medium_id: Some(40),
            coarse_id: 1,
        };
        assert_eq!(record.medium_label(), "40");
    }
}
