//! Conversion of a tiles CSV back into per-tile documents.

use anyhow::{bail, Context, Result};
use ::csv::{ReaderBuilder, StringRecord};
use hashbrown::HashSet;
use serde::Serialize;
use std::io::{Read, Write};
use std::time::Instant;
use tracing::{debug, info};

use super::csv::header;
use super::{DocumentWriter, TileDoc};
use crate::models::{LevelTags, ABSENT_MARKER};

/// Row counters of one CSV import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub rows: u64,
    pub written: u64,
    pub other_zoom: u64,
    pub bad_rows: u64,
    pub duplicates: u64,
}

impl ImportStats {
    fn log_progress(&self, started: Instant) {
        let secs = started.elapsed().as_secs_f64();
        let rate = if secs > 0.0 {
            self.written as f64 / secs
        } else {
            0.0
        };
        info!(
            "rows={} written={} other_zoom={} bad={} dups={} | {:.1}s @ {:.1}/s",
            self.rows, self.written, self.other_zoom, self.bad_rows, self.duplicates, secs, rate
        );
    }
}

/// Column positions of the eight expected fields
struct Columns([usize; 8]);

impl Columns {
    fn locate(headers: &StringRecord, levels: &LevelTags) -> Result<Self> {
        let expected = header(levels);
        let mut positions = [0usize; 8];
        let mut missing = Vec::new();

        for (slot, name) in positions.iter_mut().zip(expected.iter()) {
            match headers.iter().position(|h| h.trim() == name.as_str()) {
                Some(i) => *slot = i,
                None => missing.push(name.as_str()),
            }
        }

        if !missing.is_empty() {
            bail!("CSV is missing columns: {}", missing.join(", "));
        }
        Ok(Self(positions))
    }

    fn field<'r>(&self, row: &'r StringRecord, column: usize) -> Result<&'r str> {
        row.get(self.0[column])
            .map(str::trim)
            .context("row is shorter than the header")
    }
}

/// Level tags from the `level{N}_id` columns, in fine, medium, coarse order
fn infer_levels(headers: &StringRecord) -> Result<LevelTags> {
    let tags: Vec<u8> = headers
        .iter()
        .filter_map(|h| h.trim().strip_prefix("level")?.strip_suffix("_id")?.parse().ok())
        .collect();
    match tags[..] {
        [fine, medium, coarse] => {
            debug!("Levels from header: coarse={} medium={} fine={}", coarse, medium, fine);
            Ok(LevelTags {
                coarse,
                medium,
                fine,
            })
        }
        _ => bail!(
            "Cannot tell the level tags from the header: expected three level<N>_id columns, found {}",
            tags.len()
        ),
    }
}

fn parse_id(value: &str) -> Result<Option<i64>> {
    if value.is_empty() || value == ABSENT_MARKER {
        return Ok(None);
    }
    Ok(Some(value.parse().with_context(|| format!("bad id {:?}", value))?))
}

/// Parsed row: zoom, key and document
fn parse_row(columns: &Columns, row: &StringRecord) -> Result<(u8, String, TileDoc)> {
    let zoom: u8 = columns.field(row, 0)?.parse()?;
    let x: u32 = columns.field(row, 1)?.parse()?;
    let y: u32 = columns.field(row, 2)?.parse()?;
    let doc = TileDoc {
        lon: columns.field(row, 3)?.parse()?,
        lat: columns.field(row, 4)?.parse()?,
        fine_id: parse_id(columns.field(row, 5)?)?,
        medium_id: parse_id(columns.field(row, 6)?)?,
        coarse_id: parse_id(columns.field(row, 7)?)?,
    };
    Ok((zoom, format!("{}_{}", x, y), doc))
}

/// Read tile rows and write one document per `x_y` key.
///
/// Without `levels` the tags are read from the header. Rows at another zoom,
/// unparsable rows and repeated keys are counted and skipped. A missing
/// column in the header is fatal.
pub fn import_tiles<R: Read, W: Write>(
    input: R,
    levels: Option<&LevelTags>,
    zoom: u8,
    writer: &mut DocumentWriter<W>,
    progress_every: u64,
) -> Result<ImportStats> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(input);
    let headers = reader.headers()?;
    let levels = match levels {
        Some(levels) => *levels,
        None => infer_levels(headers)?,
    };
    let columns = Columns::locate(headers, &levels)?;

    let mut stats = ImportStats::default();
    let mut seen = HashSet::new();
    let started = Instant::now();

    for row in reader.records() {
        stats.rows += 1;

        match row.map_err(anyhow::Error::from).and_then(|r| parse_row(&columns, &r)) {
            Ok((row_zoom, _, _)) if row_zoom != zoom => stats.other_zoom += 1,
            Ok((_, key, doc)) => {
                if seen.insert(key.clone()) {
                    writer.add(&key, &doc)?;
                    stats.written += 1;
                } else {
                    stats.duplicates += 1;
                }
            }
            Err(e) => {
                stats.bad_rows += 1;
                debug!("Skipping row {}: {:#}", stats.rows, e);
            }
        }

        if progress_every > 0 && stats.rows % progress_every == 0 {
            stats.log_progress(started);
        }
    }

    writer.flush()?;
    stats.log_progress(started);
    Ok(stats)
}
