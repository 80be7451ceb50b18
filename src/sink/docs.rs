//! Batched NDJSON document output.
//!
//! Each document is one line `{"_id": "...", ...fields}`, ready for a bulk
//! loader of a key/value store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::RecordSink;
use crate::models::TileAssignment;

/// Default documents per committed batch
pub const DEFAULT_BATCH_SIZE: usize = 450;

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    #[serde(rename = "_id")]
    id: &'a str,
    #[serde(flatten)]
    doc: &'a T,
}

/// Per-tile document keyed by `"{x}_{y}"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileDoc {
    pub fine_id: Option<i64>,
    pub medium_id: Option<i64>,
    pub coarse_id: Option<i64>,
    pub lon: f64,
    pub lat: f64,
}

impl From<&TileAssignment> for TileDoc {
    fn from(record: &TileAssignment) -> Self {
        Self {
            fine_id: Some(record.fine_id),
            medium_id: record.medium_id,
            coarse_id: Some(record.coarse_id),
            lon: record.lon,
            lat: record.lat,
        }
    }
}

/// Buffered document writer committing in fixed-size batches
pub struct DocumentWriter<W: Write> {
    out: Option<W>,
    batch_size: usize,
    buffer: Vec<String>,
    total_written: usize,
    total_batches: usize,
}

impl DocumentWriter<BufWriter<File>> {
    /// Write documents to a new file
    pub fn create<P: AsRef<Path>>(path: P, batch_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file), batch_size))
    }
}

impl DocumentWriter<std::io::Sink> {
    /// Count documents without writing them
    pub fn dry_run(batch_size: usize) -> Self {
        Self {
            out: None,
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            total_written: 0,
            total_batches: 0,
        }
    }
}

impl<W: Write> DocumentWriter<W> {
    pub fn new(out: W, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            out: Some(out),
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            total_written: 0,
            total_batches: 0,
        }
    }

    /// Add a document to the buffer, flushing if batch is full
    pub fn add<T: Serialize>(&mut self, id: &str, doc: &T) -> Result<()> {
        let line = serde_json::to_string(&Envelope { id, doc })?;
        self.buffer.push(line);

        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }

        Ok(())
    }

    /// Commit the buffered documents
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let docs = std::mem::take(&mut self.buffer);
        let count = docs.len();

        if let Some(out) = self.out.as_mut() {
            for line in &docs {
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }

        self.total_written += count;
        self.total_batches += 1;
        debug!(
            "Committed {} documents (total {})",
            count, self.total_written
        );

        self.buffer = Vec::with_capacity(self.batch_size);
        Ok(())
    }

    /// Finish writing and return (documents, batches)
    pub fn finish(mut self) -> Result<(usize, usize)> {
        self.flush()?;
        info!(
            "Committed {} documents in {} batches",
            self.total_written, self.total_batches
        );
        Ok((self.total_written, self.total_batches))
    }

    /// Get current statistics
    pub fn stats(&self) -> (usize, usize) {
        (self.total_written, self.total_batches)
    }

    /// Give back the underlying writer after flushing
    pub fn into_inner(mut self) -> Result<Option<W>> {
        self.flush()?;
        Ok(self.out.take())
    }
}

impl<W: Write> RecordSink for DocumentWriter<W> {
    fn write_batch(&mut self, records: &[TileAssignment]) -> Result<()> {
        for record in records {
            self.add(&record.tile.key(), &TileDoc::from(record))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileCoord;

    #[derive(Serialize)]
    struct Doc {
        value: u32,
    }

    #[test]
    fn test_batches_are_committed_at_size() {
        let mut writer = DocumentWriter::new(Vec::new(), 2);
        writer.add("a", &Doc { value: 1 }).expect("add");
        assert_eq!(writer.stats(), (0, 0));
        writer.add("b", &Doc { value: 2 }).expect("add");
        assert_eq!(writer.stats(), (2, 1));
        writer.add("c", &Doc { value: 3 }).expect("add");

        let out = writer.into_inner().expect("flush").expect("writer");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], r#"{"_id":"a","value":1}"#);
        assert_eq!(lines[2], r#"{"_id":"c","value":3}"#);
    }

    #[test]
    fn test_dry_run_counts_only() {
        let mut writer = DocumentWriter::dry_run(DEFAULT_BATCH_SIZE);
        for i in 0..1000 {
            writer.add(&i.to_string(), &Doc { value: i }).expect("add");
        }
        assert_eq!(writer.finish().expect("finish"), (1000, 3));
    }

    #[test]
    fn test_tile_records_become_keyed_docs() {
        let mut writer = DocumentWriter::new(Vec::new(), 10);
        let record = TileAssignment {
            tile: TileCoord::new(14, 9326, 4742),
            lon: 24.9,
            lat: 60.1,
            fine_id: 100,
            medium_id: None,
            coarse_id: 1,
        };
        writer.write_batch(&[record]).expect("write");
        let out = writer.into_inner().expect("flush").expect("writer");
        let value: serde_json::Value =
            serde_json::from_slice(&out).expect("one json document");
        assert_eq!(value["_id"], "9326_4742");
        assert_eq!(value["fine_id"], 100);
        assert!(value["medium_id"].is_null());
        assert_eq!(value["coarse_id"], 1);
    }
}
