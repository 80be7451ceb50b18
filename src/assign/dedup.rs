//! Run-wide set of tiles already emitted.

use hashbrown::HashSet;

use crate::tile::TileCoord;

/// Tiles emitted so far; the first polygon to claim a tile keeps it.
#[derive(Debug, Default)]
pub struct TileDedup {
    seen: HashSet<TileCoord>,
}

impl TileDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-sized for about `capacity` tiles
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Claim a tile. Returns false if it was already claimed.
    pub fn claim(&mut self, tile: TileCoord) -> bool {
        self.seen.insert(tile)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
