//! Environmental data harmonizer.
//!
//! Runs one harmonization request for a region and date against
//! file-backed acquisition collaborators and prints a JSON summary of the
//! resulting features and their quality.

mod sources;
mod summary;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use harmonization::{HarmonizerConfig, UnifiedDataHarmonizer};
use harmonize_common::{BoundingBox, DateRange};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sources::file_clients;
use summary::RunSummary;

#[derive(Parser, Debug)]
#[command(name = "harmonizer")]
#[command(about = "Harmonize climate, rainfall, vegetation, prevalence and population data")]
struct Args {
    /// Region as west,south,east,north in degrees
    #[arg(long, allow_hyphen_values = true)]
    bbox: String,

    /// Target date (YYYY-MM-DD); the window ends on this day
    #[arg(long)]
    date: String,

    /// Days of history before the target date
    #[arg(long, env = "HARMONIZE_LOOKBACK_DAYS", default_value_t = 30)]
    lookback_days: u32,

    /// Grid resolution: 100m, 1km or 5km
    #[arg(long)]
    resolution: Option<String>,

    /// Directory holding <source>.json acquisition results
    #[arg(long, env = "HARMONIZE_SOURCES_DIR", default_value = "./sources")]
    sources_dir: PathBuf,

    /// Cache directory (overrides configuration)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// YAML configuration file; environment variables are used otherwise
    #[arg(short, long, env = "HARMONIZE_CONFIG")]
    config: Option<PathBuf>,

    /// Bypass the result cache
    #[arg(long)]
    no_cache: bool,

    /// Remove expired cache entries before running
    #[arg(long)]
    purge_expired: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&args)?;
    info!(
        resolution = %config.resolution,
        granularity = config.granularity.as_str(),
        cache_dir = %config.cache_dir.display(),
        cache_enabled = config.cache_enabled,
        "Loaded configuration"
    );

    let bounds = BoundingBox::from_str_list(&args.bbox)
        .with_context(|| format!("invalid --bbox '{}'", args.bbox))?;
    let target_date = DateRange::parse_date(&args.date)?;

    let harmonizer = UnifiedDataHarmonizer::new(config, file_clients(&args.sources_dir))?;

    if args.purge_expired {
        let removed = harmonizer
            .cache()
            .purge_expired()
            .await
            .context("failed to purge cache")?;
        info!(removed, "Purged expired cache entries");
    }

    let result = harmonizer
        .get_harmonized_features(&bounds, target_date, args.lookback_days)
        .await
        .context("harmonization failed")?;

    let summary = RunSummary::from_result(&result);
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let stats = harmonizer.cache().stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        writes = stats.writes,
        "Done"
    );
    Ok(())
}

/// Configuration from YAML or the environment, with flags on top.
fn load_config(args: &Args) -> Result<HarmonizerConfig> {
    let mut config = match &args.config {
        Some(path) => HarmonizerConfig::from_yaml_file(path)?,
        None => HarmonizerConfig::from_env()?,
    };

    if let Some(resolution) = &args.resolution {
        config.resolution = resolution.parse()?;
    }
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = dir.clone();
    }
    if args.no_cache {
        config.cache_enabled = false;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;
    Ok(config)
}
