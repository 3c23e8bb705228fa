//! Command-line front end: associate a pick catalog and locate the resulting events.
//!
//! Usage:
//!   octoloc --picks picks.csv --inventory stations.csv --center-latlon 46.8,8.2 --output origins.csv
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use octoloc::{
    association::{AssociatorParams, EngineEvent},
    config::LocatorConfig,
    constants::{DEFAULT_MAX_DEPTH_KM, DEFAULT_MAX_DISTANCE_KM, DEFAULT_PICK_AUTHOR},
    octoloc_errors::OctolocError,
    octree::SearchVolume,
    origin::origin_writer::{write_origins, write_origins_csv},
    picks::pick_reader::read_picks_csv,
    scheduler::{PlaybackOptions, RunMode},
    stations::{inventory_reader::read_inventory_csv, whitelist::StreamWhitelist},
    time::parse_time,
    velocity_model::ConstantVelocityModel,
};

/// Seismic pick association and octree hypocenter search
#[derive(Parser, Debug)]
#[command(name = "octoloc", version)]
#[command(about = "Associate seismic picks into events and locate them with an octree search")]
struct Args {
    /// Pick catalog (CSV)
    #[arg(long)]
    picks: Utf8PathBuf,

    /// Station inventory (CSV)
    #[arg(long)]
    inventory: Utf8PathBuf,

    /// Stream whitelist file
    #[arg(long)]
    whitelist: Option<Utf8PathBuf>,

    /// Allowed pick authors, comma or space separated globs; empty accepts all
    #[arg(long, default_value = DEFAULT_PICK_AUTHOR)]
    pick_authors: String,

    /// Network center as "lat,lon"
    #[arg(long)]
    center_latlon: String,

    /// Network radius from the center (km)
    #[arg(long, default_value_t = DEFAULT_MAX_DISTANCE_KM)]
    max_distance: f64,

    /// Minimum hypocenter depth (km)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    min_depth: f64,

    /// Maximum hypocenter depth (km)
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH_KM)]
    max_depth: f64,

    /// Constant velocity model "vp[,vs[,rh]]" (km/s, km/s, km)
    #[arg(long, default_value = "6.0")]
    velocity_model: ConstantVelocityModel,

    /// Minimum number of picks (P or S)
    #[arg(long, default_value_t = 4)]
    min_picks: usize,

    /// Minimum number of P picks
    #[arg(long, default_value_t = 4)]
    min_p_picks: usize,

    /// Minimum number of S picks
    #[arg(long, default_value_t = 0)]
    min_s_picks: usize,

    /// Minimum number of stations with both P and S picks
    #[arg(long, default_value_t = 0)]
    min_p_and_s_picks: usize,

    /// Largest absolute residual of an associated pick (s)
    #[arg(long, default_value_t = 2.0)]
    acceptance_residual: f64,

    /// Inactivity after which a candidate event is closed (s)
    #[arg(long, default_value_t = 120.0)]
    quiescence: f64,

    /// Largest distance from a new pick's station to the nearest station of a forming
    /// candidate (km); half the network radius if absent
    #[arg(long)]
    proximity_distance: Option<f64>,

    /// Ignore picks before this time
    #[arg(long)]
    start_time: Option<String>,

    /// Ignore picks after this time
    #[arg(long)]
    end_time: Option<String>,

    /// Run in playback mode
    #[arg(long)]
    playback: bool,

    /// Pace playback by pick time instead of creation time
    #[arg(long)]
    use_pick_time: bool,

    /// Release playback picks without waiting
    #[arg(long)]
    accelerate: bool,

    /// Playback speed factor
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Output CSV file, standard output if absent
    #[arg(long)]
    output: Option<Utf8PathBuf>,

    /// Debug logging, overriding RUST_LOG
    #[arg(long)]
    debug: bool,
}

fn parse_center(text: &str) -> Result<(f64, f64), OctolocError> {
    let invalid = || OctolocError::InvalidConfiguration(format!("invalid center-latlon: {text}"));
    let (lat, lon) = text.split_once(',').ok_or_else(invalid)?;
    let lat = lat.trim().parse().map_err(|_| invalid())?;
    let lon = lon.trim().parse().map_err(|_| invalid())?;
    Ok((lat, lon))
}

fn build_config(args: &Args) -> Result<LocatorConfig, OctolocError> {
    let (lat, lon) = parse_center(&args.center_latlon)?;
    let volume = SearchVolume::new(lat, lon, args.max_distance, args.min_depth, args.max_depth)?;

    let mut associator = AssociatorParams::builder()
        .min_picks(args.min_picks)
        .min_p_picks(args.min_p_picks)
        .min_s_picks(args.min_s_picks)
        .min_p_and_s_picks(args.min_p_and_s_picks)
        .acceptance_residual(args.acceptance_residual)
        .quiescence(args.quiescence);
    if let Some(distance) = args.proximity_distance {
        associator = associator.proximity_distance(distance);
    }
    let associator = associator.build()?;

    let mode = if args.playback {
        RunMode::Playback(PlaybackOptions {
            accelerate: args.accelerate,
            use_pick_time: args.use_pick_time,
            speed: args.speed,
        })
    } else {
        RunMode::Offline
    };

    let whitelist = args
        .whitelist
        .as_deref()
        .map(StreamWhitelist::from_file)
        .transpose()?;
    let start = args.start_time.as_deref().map(parse_time).transpose()?;
    let end = args.end_time.as_deref().map(parse_time).transpose()?;

    let authors = args
        .pick_authors
        .replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect();

    LocatorConfig::builder(volume)
        .velocity_model(args.velocity_model)
        .associator(associator)
        .mode(mode)
        .authors(authors)
        .whitelist(whitelist)
        .time_range(start, end)
        .build()
}

/// `--debug` wins over RUST_LOG, which wins over the `info` default.
fn log_filter(debug: bool, rust_log: Option<&str>) -> EnvFilter {
    if debug {
        return EnvFilter::new("debug");
    }
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn main() -> Result<(), OctolocError> {
    let args = Args::parse();

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(args.debug, rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let config = build_config(&args)?;
    info!("configuration\n{config:#}");

    let catalog = Arc::new(config.catalog(read_inventory_csv(&args.inventory)?)?);
    info!(stations = catalog.len(), "station catalog ready");

    let mut buffer = config.pick_buffer(Arc::clone(&catalog))?;
    buffer.extend(read_picks_csv(&args.picks)?);
    info!(intake = %buffer.stats(), "picks loaded");

    let source = config.pick_source(buffer)?;
    let mut scheduler = config.scheduler();
    let report = scheduler.run_with(source, |event| {
        if let EngineEvent::Revision(origin) = event {
            if matches!(config.mode, RunMode::Playback(_)) {
                info!("new origin revision\n{origin}");
            }
        }
    });
    info!("run report\n{report}");

    match &args.output {
        Some(path) => write_origins_csv(path, &report.origins)?,
        None => write_origins(std::io::stdout().lock(), &report.origins)?,
    }
    Ok(())
}
