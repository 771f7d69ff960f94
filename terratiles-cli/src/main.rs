//! Terratiles CLI
//!
//! Retrieves an elevation raster for a region and prints a summary of it.
//!
//! ```text
//! terratiles --bbox -105 39 -103 41 --zoom 9 --source aws
//! ```

mod error;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use terratiles::config::RetrievalConfig;
use terratiles::{
    BoundingBox, Clip, Crs, ElevationRetriever, FailurePolicy, MosaicRaster, RetrievalError,
    RetrievalOptions, TileSource,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::error::CliError;

/// Fetch XYZ terrain tiles and merge them into one elevation raster.
#[derive(Debug, Parser)]
#[command(name = "terratiles", version, about)]
struct Args {
    /// Region as MIN_X MIN_Y MAX_X MAX_Y
    #[arg(
        long,
        num_args = 4,
        value_names = ["MIN_X", "MIN_Y", "MAX_X", "MAX_Y"],
        allow_negative_numbers = true,
        required = true
    )]
    bbox: Vec<f64>,

    /// Coordinate reference of --bbox
    #[arg(long, value_enum, default_value = "wgs84")]
    crs: CrsArg,

    /// Zoom level (0-15)
    #[arg(short, long)]
    zoom: u8,

    /// Tile source (defaults to the configured source)
    #[arg(long, value_enum)]
    source: Option<SourceArg>,

    /// Nextzen API key (falls back to config, then NEXTZEN_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Margin added to every side of the region before selecting tiles
    #[arg(long)]
    expand: Option<f64>,

    /// Crop to the region or keep whole tiles
    #[arg(long, value_enum, default_value = "bbox")]
    clip: ClipArg,

    /// Fail if any tile is missing instead of leaving holes
    #[arg(long)]
    fail_fast: bool,

    /// Treat negative elevations as no-data
    #[arg(long)]
    neg_to_nodata: bool,

    /// Skip the maximum tile count check
    #[arg(long)]
    force: bool,

    /// Maximum concurrent tile requests
    #[arg(long)]
    concurrency: Option<usize>,

    /// Maximum tiles per request
    #[arg(long)]
    max_tiles: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Config file (default: <config dir>/terratiles/config.ini if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CrsArg {
    /// EPSG:4326 longitude/latitude degrees
    Wgs84,
    /// EPSG:3857 meters
    WebMercator,
}

impl From<CrsArg> for Crs {
    fn from(arg: CrsArg) -> Self {
        match arg {
            CrsArg::Wgs84 => Crs::Wgs84,
            CrsArg::WebMercator => Crs::WebMercator,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    /// Nextzen terrain tiles (API key recommended)
    Nextzen,
    /// AWS Open Data terrain tiles (no key)
    Aws,
}

impl From<SourceArg> for TileSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Nextzen => TileSource::Nextzen,
            SourceArg::Aws => TileSource::Aws,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ClipArg {
    Bbox,
    Tile,
}

impl From<ClipArg> for Clip {
    fn from(arg: ClipArg) -> Self {
        match arg {
            ClipArg::Bbox => Clip::Bbox,
            ClipArg::Tile => Clip::Tile,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<RetrievalConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => RetrievalConfig::load(path).map_err(RetrievalError::from)?,
        None => match RetrievalConfig::default_path().filter(|p| p.exists()) {
            Some(path) => {
                debug!(path = %path.display(), "Loading config");
                RetrievalConfig::load(&path).map_err(RetrievalError::from)?
            }
            None => RetrievalConfig::default(),
        },
    };

    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(max_tiles) = args.max_tiles {
        config = config.with_max_tiles(max_tiles);
    }
    if let Some(timeout) = args.timeout {
        config = config.with_timeout(Duration::from_secs(timeout));
    }
    if args.verbose > 0 {
        config = config.with_verbose(true);
    }
    Ok(config)
}

fn run(args: Args) -> Result<(), CliError> {
    let config = load_config(&args)?;
    let source = args.source.map(TileSource::from).unwrap_or(config.default_source);

    let &[min_x, min_y, max_x, max_y] = args.bbox.as_slice() else {
        return Err(CliError::Config("--bbox takes exactly four values".to_string()));
    };
    let region = BoundingBox::new(min_x, min_y, max_x, max_y, args.crs.into())
        .map_err(RetrievalError::from)?;

    let mut options = RetrievalOptions::new()
        .with_clip(args.clip.into())
        .with_neg_to_nodata(args.neg_to_nodata)
        .with_override_size_check(args.force);
    if let Some(key) = args.api_key {
        options = options.with_api_key(key);
    }
    if let Some(margin) = args.expand {
        options = options.with_expand(margin);
    }
    if args.fail_fast {
        options = options.with_policy(FailurePolicy::FailFast);
    }

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("Cancelling...");
        handler_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let retriever = ElevationRetriever::new(config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    let raster = runtime.block_on(retriever.get_elevation_raster_with_cancel(
        &region,
        args.zoom,
        source,
        &options,
        &cancel,
    ))?;

    print_summary(&raster, source, args.zoom);
    Ok(())
}

fn print_summary(raster: &MosaicRaster, source: TileSource, zoom: u8) {
    let gt = raster.geotransform;
    let (min_x, min_y, max_x, max_y) = raster.extent();

    println!("Source:       {} (zoom {})", source, zoom);
    println!("Size:         {} x {} pixels", raster.width(), raster.height());
    println!("Pixel size:   {:.4} m", gt.pixel_width);
    println!("Origin:       ({:.3}, {:.3}) EPSG:3857", gt.origin_x, gt.origin_y);
    println!(
        "Extent:       [{:.3}, {:.3}, {:.3}, {:.3}]",
        min_x, min_y, max_x, max_y
    );
    println!("GeoTransform: {:?}", gt.to_gdal());
    match raster.grid.min_max() {
        Some((lo, hi)) => println!("Elevation:    {:.1} m .. {:.1} m", lo, hi),
        None => println!("Elevation:    no valid cells"),
    }
    println!(
        "Valid cells:  {} / {}",
        raster.grid.valid_count(),
        raster.width() * raster.height()
    );
    println!(
        "Tiles:        {} fetched, {} failed, {:.1} KiB in {:.2}s",
        raster.stats.succeeded,
        raster.stats.failed,
        raster.stats.bytes as f64 / 1024.0,
        raster.stats.elapsed.as_secs_f64()
    );
    for failure in &raster.failures {
        println!("  missing {}", failure);
    }
}
