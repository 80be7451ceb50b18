//! CSV output of tile assignments.

use anyhow::{Context, Result};
use ::csv::Writer;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::RecordSink;
use crate::models::{LevelTags, TileAssignment};

/// Writes `z,x,y,lon,lat,level{f}_id,level{m}_id,level{c}_id` rows.
///
/// Every batch is flushed and synced to disk, so an interrupted run leaves
/// only whole polygons behind.
pub struct CsvSink {
    writer: Writer<File>,
    path: PathBuf,
    rows: u64,
}

impl CsvSink {
    pub fn create<P: AsRef<Path>>(path: P, levels: &LevelTags) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = Writer::from_writer(file);

        writer.write_record(header(levels))?;
        writer.flush()?;

        Ok(Self {
            writer,
            path,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows written so far
    pub fn rows(&self) -> u64 {
        self.rows
    }
}

/// Column names for the configured level tags
pub fn header(levels: &LevelTags) -> [String; 8] {
    [
        "z".to_string(),
        "x".to_string(),
        "y".to_string(),
        "lon".to_string(),
        "lat".to_string(),
        format!("level{}_id", levels.fine),
        format!("level{}_id", levels.medium),
        format!("level{}_id", levels.coarse),
    ]
}

impl RecordSink for CsvSink {
    fn write_batch(&mut self, records: &[TileAssignment]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        for record in records {
            self.writer.write_record(record.to_row())?;
        }
        self.writer.flush()?;
        self.writer
            .get_ref()
            .sync_all()
            .with_context(|| format!("Failed to sync {}", self.path.display()))?;

        self.rows += records.len() as u64;
        debug!("Wrote {} rows to {}", records.len(), self.path.display());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileCoord;

    fn record(col: u32, medium_id: Option<i64>) -> TileAssignment {
        TileAssignment {
            tile: TileCoord::new(14, col, 4742),
            lon: 24.5,
            lat: 60.25,
            fine_id: 100,
            medium_id,
            coarse_id: 1,
        }
    }

    #[test]
    fn test_writes_header_and_rows() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tiles.csv");

        let mut sink = CsvSink::create(&path, &LevelTags::default()).expect("create sink");
        sink.write_batch(&[record(9326, None), record(9327, Some(40))])
            .expect("write batch");
        sink.write_batch(&[]).expect("empty batch");
        sink.finish().expect("finish");
        assert_eq!(sink.rows(), 2);

        let content = std::fs::read_to_string(&path).expect("read back");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "z,x,y,lon,lat,level8_id,level4_id,level2_id");
        assert_eq!(lines[1], "14,9326,4742,24.5,60.25,100,-,1");
        assert_eq!(lines[2], "14,9327,4742,24.5,60.25,100,40,1");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_header_follows_level_tags() {
        let levels = LevelTags {
            coarse: 2,
            medium: 6,
            fine: 7,
        };
        let header = header(&levels);
        assert_eq!(header[5], "level7_id");
        assert_eq!(header[6], "level6_id");
        assert_eq!(header[7], "level2_id");
    }
}
