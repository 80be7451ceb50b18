//! Web Mercator tile math.
//!
//! Conversions between XYZ tile coordinates and geographic bounds, and
//! enumeration of the tiles covering a geographic bounding box.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Maximum latitude representable in Web Mercator
pub const MAX_LAT: f64 = 85.051129;

/// Minimum latitude representable in Web Mercator
pub const MIN_LAT: f64 = -85.051129;

/// Highest zoom level accepted by the configuration
pub const MAX_ZOOM: u8 = 24;

/// Nudge applied to the east/south edges of a covering box so a box ending
/// exactly on a tile edge does not include the neighbouring tile.
const LL_EPSILON: f64 = 1e-11;

/// Guard against floating point noise right below a tile edge.
const EPSILON: f64 = 1e-14;

/// A tile in the standard web-map pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub zoom: u8,
    pub col: u32,
    pub row: u32,
}

/// Geographic bounds of a tile in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl TileCoord {
    pub fn new(zoom: u8, col: u32, row: u32) -> Self {
        Self { zoom, col, row }
    }

    pub fn bounds(&self) -> TileBounds {
        tile_bounds(self.col, self.row, self.zoom)
    }

    /// Center point as (lon, lat)
    pub fn center(&self) -> (f64, f64) {
        tile_center(self.col, self.row, self.zoom)
    }

    /// Document key used by downstream stores: `"{col}_{row}"`
    pub fn key(&self) -> String {
        format!("{}_{}", self.col, self.row)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.col, self.row)
    }
}

#[inline]
fn tiles_per_axis(zoom: u8) -> f64 {
    (1u64 << zoom) as f64
}

/// Converts a tile to its bounding box.
#[inline]
pub fn tile_bounds(col: u32, row: u32, zoom: u8) -> TileBounds {
    let n = tiles_per_axis(zoom);

    let lon_of = |x: f64| x / n * 360.0 - 180.0;
    let lat_of = |y: f64| (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();

    TileBounds {
        west: lon_of(col as f64),
        south: lat_of(row as f64 + 1.0),
        east: lon_of(col as f64 + 1.0),
        north: lat_of(row as f64),
    }
}

/// Midpoint of the tile's bounding box as (lon, lat).
///
/// This is the midpoint in degrees, not the Mercator midpoint.
#[inline]
pub fn tile_center(col: u32, row: u32, zoom: u8) -> (f64, f64) {
    let b = tile_bounds(col, row, zoom);
    ((b.west + b.east) / 2.0, (b.south + b.north) / 2.0)
}

/// Tile (col, row) containing a geographic point, clamped to the pyramid.
fn tile_at(lon: f64, lat: f64, zoom: u8) -> (u32, u32) {
    let n = tiles_per_axis(zoom);

    let x = lon / 360.0 + 0.5;
    let sin_lat = lat.to_radians().sin();
    let y = 0.5 - 0.25 * ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / PI;

    let clamp = |v: f64| -> u32 {
        if v <= 0.0 {
            0
        } else if v >= 1.0 {
            (n - 1.0) as u32
        } else {
            ((v + EPSILON) * n).floor().min(n - 1.0) as u32
        }
    };

    (clamp(x), clamp(y))
}

/// Enumerates every tile at `zoom` whose bounds intersect the box.
///
/// Boxes crossing the antimeridian (`min_x > max_x`) and boxes with
/// non-finite corners yield nothing.
pub fn tiles_covering(min_x: f64, min_y: f64, max_x: f64, max_y: f64, zoom: u8) -> TileCover {
    let finite = [min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite());
    if !finite || min_x > max_x || min_y > max_y {
        return TileCover::empty(zoom);
    }

    let west = min_x.max(-180.0);
    let south = min_y.max(MIN_LAT);
    let east = max_x.min(180.0);
    let north = max_y.min(MAX_LAT);
    if west > east || south > north {
        return TileCover::empty(zoom);
    }

    let (min_col, min_row) = tile_at(west, north, zoom);
    let (max_col, max_row) = tile_at(east - LL_EPSILON, south + LL_EPSILON, zoom);

    TileCover {
        zoom,
        min_col,
        max_col: max_col.max(min_col),
        max_row: max_row.max(min_row),
        next_col: min_col,
        next_row: min_row,
        done: false,
    }
}

/// Row-major iterator over a rectangular block of tiles.
#[derive(Debug, Clone)]
pub struct TileCover {
    zoom: u8,
    min_col: u32,
    max_col: u32,
    max_row: u32,
    next_col: u32,
    next_row: u32,
    done: bool,
}

impl TileCover {
    fn empty(zoom: u8) -> Self {
        Self {
            zoom,
            min_col: 0,
            max_col: 0,
            max_row: 0,
            next_col: 0,
            next_row: 0,
            done: true,
        }
    }

    fn remaining(&self) -> usize {
        if self.done {
            return 0;
        }
        let width = (self.max_col - self.min_col) as usize + 1;
        let full_rows = (self.max_row - self.next_row) as usize;
        let this_row = (self.max_col - self.next_col) as usize + 1;
        full_rows * width + this_row
    }
}

impl Iterator for TileCover {
    type Item = TileCoord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let tile = TileCoord::new(self.zoom, self.next_col, self.next_row);

        if self.next_col < self.max_col {
            self.next_col += 1;
        } else if self.next_row < self.max_row {
            self.next_col = self.min_col;
            self.next_row += 1;
        } else {
            self.done = true;
        }

        Some(tile)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for TileCover {}
