//! Record sinks receiving tile assignments in per-polygon batches.

mod csv;
mod docs;
mod import;

pub use self::csv::{header, CsvSink};
pub use docs::{DocumentWriter, TileDoc, DEFAULT_BATCH_SIZE};
pub use import::{import_tiles, ImportStats};

use anyhow::Result;

use crate::models::TileAssignment;

/// Destination of tile assignments.
///
/// The engine hands over all accepted tiles of one fine-level polygon in a
/// single `write_batch` call. Batches arrive in polygon order and never
/// repeat a tile.
pub trait RecordSink {
    fn write_batch(&mut self, records: &[TileAssignment]) -> Result<()>;

    /// Flush buffered output; called once after the last batch
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Collects records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<TileAssignment>,
    pub batches: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for MemorySink {
    fn write_batch(&mut self, records: &[TileAssignment]) -> Result<()> {
        self.records.extend_from_slice(records);
        self.batches += 1;
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn write_batch(&mut self, records: &[TileAssignment]) -> Result<()> {
        (**self).write_batch(records)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}
