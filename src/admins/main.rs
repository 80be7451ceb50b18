//! Export the admin areas of a boundary file or admins map as NDJSON documents.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use hashbrown::HashSet;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use admintiles::admins::AdminCatalog;
use admintiles::assign::resolve_profile;
use admintiles::config::Config;
use admintiles::sink::{DocumentWriter, DEFAULT_BATCH_SIZE};
use admintiles::source::load_features;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "export-admins")]
#[command(about = "Export admin area names keyed by level and OSM id")]
struct Args {
    /// Boundary file (same formats as find-tiles)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Admins map JSON (`{"l8_123": {...}}`) merged after the boundary file
    #[arg(long)]
    admins_map: Vec<PathBuf>,

    /// NDJSON output file
    #[arg(short, long, default_value = "admins.ndjson")]
    output: PathBuf,

    /// TOML config file for the level tags
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep only these name languages, e.g. "fi,sv,en"
    #[arg(long, value_delimiter = ',')]
    keep_langs: Vec<String>,

    /// Documents per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Count documents without writing
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    config.validate()?;

    let keep_langs: Option<HashSet<String>> = if args.keep_langs.is_empty() {
        None
    } else {
        Some(args.keep_langs.iter().map(|l| l.trim().to_string()).collect())
    };

    if args.input.is_none() && args.admins_map.is_empty() {
        bail!("Nothing to export: give --input and/or --admins-map");
    }

    let mut catalog = match &args.input {
        Some(input) => {
            let features = load_features(input)
                .with_context(|| format!("Failed to load {}", input.display()))?;
            let levels = resolve_profile(&config, &features)?.levels;
            AdminCatalog::build(&features, &levels, keep_langs.as_ref())?
        }
        None => AdminCatalog::default(),
    };

    for path in &args.admins_map {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let map: serde_json::Value = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        catalog
            .merge_map(&map, keep_langs.as_ref())
            .with_context(|| format!("Failed to merge {}", path.display()))?;
    }

    for (level, count) in catalog.level_counts() {
        info!("admin_level {}: {} documents", level, count);
    }

    let (docs, batches) = if args.dry_run {
        let mut writer = DocumentWriter::dry_run(args.batch_size);
        for doc in catalog.docs() {
            writer.add(&doc.key(), doc)?;
        }
        writer.finish()?
    } else {
        let mut writer = DocumentWriter::create(&args.output, args.batch_size)?;
        for doc in catalog.docs() {
            writer.add(&doc.key(), doc)?;
        }
        writer.finish()?
    };

    if args.dry_run {
        info!("Dry run: {} documents in {} batches", docs, batches);
    } else {
        info!("Wrote {} documents to {}", docs, args.output.display());
    }

    Ok(())
}
