//! Tile to admin-hierarchy assignment.
//!
//! Reads admin boundaries, finds every tile whose center lies inside a
//! fine-level area and writes `{prefix}_{coarse_id}.csv`.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use admintiles::assign::{AssignmentEngine, CancelToken, TileDedup};
use admintiles::config::{Config, TileExpectation};
use admintiles::sink::{CsvSink, DocumentWriter, RecordSink};
use admintiles::source::load_features;
use admintiles::TileAssignment;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "find-tiles")]
#[command(about = "Assign map tiles to their admin hierarchy")]
struct Args {
    /// Boundary file (.geojson, .geojsonseq, .ndjson, optionally .gz, or .osm.pbf)
    #[arg(short, long)]
    input: PathBuf,

    /// TOML config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tile zoom level
    #[arg(short, long)]
    zoom: Option<u8>,

    /// admin_level of the coarse (country) level
    #[arg(long)]
    coarse_level: Option<u8>,

    /// admin_level of the medium (region) level; picked from the input if unset
    #[arg(long)]
    medium_level: Option<u8>,

    /// admin_level of the fine (municipality) level; picked from the input if unset
    #[arg(long)]
    fine_level: Option<u8>,

    /// Fail if the medium level is missing
    #[arg(long)]
    medium_required: bool,

    /// Coarse-level id to write instead of resolving it
    #[arg(long)]
    coarse_id: Option<i64>,

    /// Scan polygons on all cores
    #[arg(long)]
    parallel: bool,

    /// Output file prefix (default: z{zoom}_level{levels}_ids)
    #[arg(long)]
    out_prefix: Option<String>,

    /// Output directory
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Also write per-tile NDJSON documents to this file
    #[arg(long)]
    docs: Option<PathBuf>,

    /// Expected tile count; the run fails outside the configured tolerance
    #[arg(long)]
    expect_tiles: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<(Config, Self)> {
        let mut config = match &self.config {
            Some(path) => Config::load_from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(zoom) = self.zoom {
            config.zoom = zoom;
        }
        if let Some(tag) = self.coarse_level {
            config.coarse_level = tag;
        }
        if self.medium_level.is_some() {
            config.medium_level = self.medium_level;
        }
        if self.fine_level.is_some() {
            config.fine_level = self.fine_level;
        }
        if self.medium_required {
            config.medium_required = true;
        }
        if self.coarse_id.is_some() {
            config.coarse_id = self.coarse_id;
        }
        if self.parallel {
            config.parallel = true;
        }
        if let Some(expected) = self.expect_tiles {
            let tolerance = config
                .expected_tiles
                .as_ref()
                .map(|e| e.tolerance)
                .unwrap_or(0.10);
            config.expected_tiles = Some(TileExpectation {
                expected,
                tolerance,
                zoom: None,
            });
        }

        Ok((config, self))
    }
}

/// CSV output plus the optional document file
struct Outputs {
    csv: CsvSink,
    docs: Option<DocumentWriter<std::io::BufWriter<std::fs::File>>>,
    bar: ProgressBar,
}

impl RecordSink for Outputs {
    fn write_batch(&mut self, records: &[TileAssignment]) -> Result<()> {
        self.csv.write_batch(records)?;
        if let Some(docs) = self.docs.as_mut() {
            docs.write_batch(records)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.csv.finish()?;
        if let Some(docs) = self.docs.as_mut() {
            RecordSink::finish(docs)?;
        }
        self.bar.finish_and_clear();
        Ok(())
    }
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let (config, args) = Args::parse().into_config()?;

    info!("Tile assignment");
    info!("Input: {}", args.input.display());
    info!("Zoom {}", config.zoom);

    let started_at = Utc::now();
    let timer = Instant::now();

    let features = load_features(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;

    let engine = AssignmentEngine::new(config.clone())?;
    let prepared = engine.prepare(&features)?;
    drop(features);
    let levels = *prepared.levels();

    let prefix = args
        .out_prefix
        .clone()
        .unwrap_or_else(|| config.output_prefix(&levels));
    let out_path = args
        .out_dir
        .join(format!("{}_{}.csv", prefix, prepared.coarse_id()));

    let bar = ProgressBar::new(prepared.fine().len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )?
            .progress_chars("#>-"),
    );

    let mut outputs = Outputs {
        csv: CsvSink::create(&out_path, &levels)?,
        docs: args
            .docs
            .as_ref()
            .map(|path| DocumentWriter::create(path, admintiles::sink::DEFAULT_BATCH_SIZE))
            .transpose()?,
        bar: bar.clone(),
    };

    let cancel = CancelToken::new();
    let mut dedup = TileDedup::with_capacity(prepared.candidate_tiles());
    let mut written = 0u64;

    let stats = prepared.run_observed(&mut dedup, &mut outputs, &cancel, |report| {
        written += report.written;
        bar.set_message(format!("{} tiles", written));
        bar.inc(1);
    })?;

    let elapsed = timer.elapsed();
    stats.log_summary(elapsed);
    info!(
        "Started {}, finished {}",
        started_at.format("%Y-%m-%d %H:%M:%S"),
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("Wrote {}", out_path.display());
    if let (Some(docs), Some(path)) = (&outputs.docs, &args.docs) {
        let (count, batches) = docs.stats();
        info!(
            "Wrote {} tile documents in {} batches to {}",
            count,
            batches,
            path.display()
        );
    }

    if let Some(expectation) = prepared.expected_tiles() {
        let deviation = expectation.deviation(stats.written);
        if !expectation.is_met(stats.written) {
            bail!(
                "Wrote {} tiles, expected about {} (deviation {:.1}% > {:.1}%)",
                stats.written,
                expectation.expected,
                deviation * 100.0,
                expectation.tolerance * 100.0
            );
        }
        info!(
            "Tile count within {:.1}% of the expected {}",
            deviation * 100.0,
            expectation.expected
        );
    } else if stats.written == 0 {
        warn!("No tile centers fell inside any fine-level area");
    }

    Ok(())
}
