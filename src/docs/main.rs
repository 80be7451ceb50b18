//! Turn a find-tiles CSV into per-tile NDJSON documents keyed `x_y`.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use admintiles::config::Config;
use admintiles::sink::{import_tiles, DocumentWriter, ImportStats, DEFAULT_BATCH_SIZE};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "tile-docs")]
#[command(about = "Convert a tiles CSV into per-tile documents")]
struct Args {
    /// CSV written by find-tiles
    #[arg(short, long)]
    tiles_csv: PathBuf,

    /// NDJSON output file
    #[arg(short, long, default_value = "tiles.ndjson")]
    output: PathBuf,

    /// TOML config file for zoom and level tags; tags come from the CSV header
    /// unless the config sets medium and fine levels
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only rows at this zoom are kept
    #[arg(short, long)]
    zoom: Option<u8>,

    /// Documents per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Log progress every N rows
    #[arg(long, default_value_t = 10_000)]
    progress_every: u64,

    /// Parse only, don't write
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    if let Some(zoom) = args.zoom {
        config.zoom = zoom;
    }
    config.validate()?;

    let file = File::open(&args.tiles_csv)
        .with_context(|| format!("Failed to open {}", args.tiles_csv.display()))?;
    let input = BufReader::new(file);

    info!(
        "Importing {} at zoom {}",
        args.tiles_csv.display(),
        config.zoom
    );

    let levels = config.fixed_levels();

    let stats: ImportStats = if args.dry_run {
        let mut writer = DocumentWriter::dry_run(args.batch_size);
        let stats = import_tiles(input, levels.as_ref(), config.zoom, &mut writer, args.progress_every)?;
        writer.finish()?;
        stats
    } else {
        let mut writer = DocumentWriter::create(&args.output, args.batch_size)?;
        let stats = import_tiles(input, levels.as_ref(), config.zoom, &mut writer, args.progress_every)?;
        writer.finish()?;
        info!("Output: {}", args.output.display());
        stats
    };

    info!(
        "Done: rows={} written={} other_zoom={} bad={} dups={}",
        stats.rows, stats.written, stats.other_zoom, stats.bad_rows, stats.duplicates
    );

    Ok(())
}
