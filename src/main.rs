//! GPSTrack - GPS Activity Tracking Core
//!
//! Operator CLI for the durable session store and a simulation harness
//! that drives the tracker with synthetic provider callbacks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rand::Rng;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use gpstrack::bus::{BusMessage, EventBus, LifecycleRequest};
use gpstrack::config::{GpsTrackConfig, LoggingConfig};
use gpstrack::error::Result;
use gpstrack::location::{Fix, SimulatedLocationSource};
use gpstrack::logging::init_logging;
use gpstrack::sensor::SimulatedSensorSource;
use gpstrack::store::{
    MemoryPreferenceStore, PreferenceStore, PreferenceValue, SqlitePreferenceStore,
};
use gpstrack::time::{SystemClock, TimeSource};
use gpstrack::tracker::{GpsTracker, SessionStore};

/// GPSTrack - GPS Activity Tracking Core
#[derive(Parser)]
#[command(name = "gpstrack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "gpstrack.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "gpstrack.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show configuration summary
    Info,

    /// Show the persisted session state
    Status,

    /// Zero the persisted session distance
    Reset,

    /// Run the tracker against simulated providers, printing bus events as JSON
    Simulate {
        /// JSON-lines file of fixes to replay (a random ride is generated otherwise)
        #[arg(short, long)]
        track: Option<PathBuf>,

        /// Number of fixes to generate when no track is given
        #[arg(short, long, default_value = "30")]
        points: usize,

        /// Delay between replayed fixes in milliseconds
        #[arg(long, default_value = "200")]
        step_ms: u64,

        /// Simulate a device without a pressure sensor
        #[arg(long)]
        no_barometer: bool,

        /// Keep session state in memory instead of the configured data directory
        #[arg(long)]
        ephemeral: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let logging = match &cli.command {
        Commands::Init { .. } => LoggingConfig::default(),
        _ => GpsTrackConfig::from_file(&cli.config)
            .map(|config| config.logging)
            .unwrap_or_default(),
    };
    let _log_guard = init_logging(&logging, cli.log_level.as_deref())?;

    match cli.command {
        Commands::Init { output } => run_init(output),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
        Commands::Status => run_status(cli.config),
        Commands::Reset => run_reset(cli.config),
        Commands::Simulate {
            track,
            points,
            step_ms,
            no_barometer,
            ephemeral,
        } => run_simulate(cli.config, track, points, step_ms, no_barometer, ephemeral).await,
    }
}

/// Load the configuration, falling back to defaults when the file is absent
fn load_config(config_path: &Path) -> Result<GpsTrackConfig> {
    if config_path.exists() {
        GpsTrackConfig::from_file(config_path)
    } else {
        tracing::warn!("{:?} not found, using default configuration", config_path);
        Ok(GpsTrackConfig::default())
    }
}

fn run_init(output: PathBuf) -> Result<()> {
    let config_content = r#"# GPSTrack Configuration
# Generated configuration file

[tracking]
refresh_interval_ms = 1000
# Fixed; every location request uses 2 meters
min_distance_m = 2.0
# fastest, game, ui or normal
sensor_sampling = "normal"
nmea_republish = true
session_resume_window_secs = 43200

[storage]
data_dir = "/var/lib/gpstrack"

[logging]
# Overridden by --log-level or RUST_LOG
level = "info"
# pretty or json
format = "pretty"
# Also write logs here
# file = "/var/log/gpstrack/gpstrack.log"
"#;

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("Then try: gpstrack --config {} simulate --ephemeral", output.display());

    Ok(())
}

fn run_validate(config_path: PathBuf) -> Result<()> {
    match GpsTrackConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Refresh interval: {}ms", config.tracking.refresh_interval_ms);
            println!("  Data directory: {}", config.data_dir().display());
            Ok(())
        }
        Err(e) => {
            println!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

fn run_info(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;

    println!("GPSTrack Configuration");
    println!("======================");
    println!("Refresh interval:   {}ms", config.tracking.refresh_interval_ms);
    println!("Min distance:       {}m", config.tracking.min_distance_m);
    println!("Sensor sampling:    {:?}", config.tracking.sensor_sampling);
    println!("NMEA republish:     {}", config.tracking.nmea_republish);
    println!(
        "Resume window:      {}h",
        config.session_resume_window().as_secs() / 3600
    );
    println!("Data directory:     {}", config.data_dir().display());
    println!("Log level:          {}", config.logging.level);
    println!("Log format:         {:?}", config.logging.format);
    if let Some(file) = &config.logging.file {
        println!("Log file:           {}", file.display());
    }

    Ok(())
}

fn run_status(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;
    let store = SqlitePreferenceStore::new(config.data_dir().clone())?;

    println!("Session store: {}", store.path().display());
    let entries = store.entries()?;
    if entries.is_empty() {
        println!("No session recorded yet");
        return Ok(());
    }

    for entry in entries {
        let value = match entry.value {
            PreferenceValue::Float(meters) => format!("{:.1} m", meters),
            PreferenceValue::Long(millis) => chrono::DateTime::from_timestamp_millis(millis)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| millis.to_string()),
        };
        println!("  {:<16} {:<32} (updated {})", entry.key, value, entry.updated_at);
    }

    Ok(())
}

fn run_reset(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;
    let store = Arc::new(SqlitePreferenceStore::new(config.data_dir().clone())?);

    SessionStore::new(store, config.session_resume_window()).reset()?;
    println!("Session distance reset");

    Ok(())
}

async fn run_simulate(
    config_path: PathBuf,
    track: Option<PathBuf>,
    points: usize,
    step_ms: u64,
    no_barometer: bool,
    ephemeral: bool,
) -> Result<()> {
    let config = load_config(&config_path)?;

    let store: Arc<dyn PreferenceStore> = if ephemeral {
        Arc::new(MemoryPreferenceStore::new())
    } else {
        Arc::new(SqlitePreferenceStore::new(config.data_dir().clone())?)
    };

    let clock = Arc::new(SystemClock);
    let fixes = match track {
        Some(path) => read_track(&path)?,
        None => generate_track(points, step_ms as i64, clock.now_millis()),
    };
    tracing::info!("Simulating {} fixes", fixes.len());

    let location = Arc::new(SimulatedLocationSource::new(true));
    let sensor = Arc::new(SimulatedSensorSource::new(!no_barometer));
    let bus = EventBus::new();

    let tracker = Arc::new(GpsTracker::new(
        &config.tracking,
        location.clone(),
        sensor.clone(),
        store,
        clock,
        bus.clone(),
    ));

    // Print outbound events the way a wearable relay would see them
    let mut events = BroadcastStream::new(bus.subscribe());
    let printer = tokio::spawn(async move {
        while let Some(received) = events.next().await {
            match received {
                Ok(message @ (BusMessage::GpsStatus(_) | BusMessage::NewLocation(_))) => {
                    match serde_json::to_string(&message) {
                        Ok(line) => println!("{}", line),
                        Err(e) => tracing::warn!("Failed to encode {}: {}", message.type_name(), e),
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Event printer lagged: {}", e),
            }
        }
    });

    let handle = tracker.spawn()?;
    bus.request(LifecycleRequest::Start);

    let mut rng = rand::thread_rng();
    let mut pressure_hpa: f32 = 1008.0;
    let replay = async {
        for fix in &fixes {
            tokio::time::sleep(Duration::from_millis(step_ms)).await;
            if location.deliver_fix(fix) == 0 {
                tracing::warn!("Fix at {} dropped, no location listener", fix.timestamp_ms);
            }
            location.deliver_nmea(fix.timestamp_ms, "$GPGGA");
            pressure_hpa += rng.gen_range(-0.15..0.15);
            sensor.deliver_pressure(pressure_hpa, fix.timestamp_ms * 1_000_000);
        }
    };

    tokio::select! {
        _ = replay => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    bus.request(LifecycleRequest::Stop);
    // Give the tracker a moment to process the stop before shutting down
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.shutdown().await;

    let session = tracker.persisted_session();
    tracing::info!(
        "Session distance {:.1}m ({} locations published, {} re-published)",
        session.elapsed_distance_m,
        tracker.pipeline().published_count(),
        tracker.pipeline().republished_count()
    );

    // Let the printer drain what was already posted
    drop(tracker);
    drop(bus);
    if tokio::time::timeout(Duration::from_millis(200), printer).await.is_err() {
        tracing::debug!("Event printer still attached, exiting");
    }

    Ok(())
}

/// Read fixes from a JSON-lines file
fn read_track(path: &Path) -> Result<Vec<Fix>> {
    let content = std::fs::read_to_string(path)?;
    let mut fixes = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        fixes.push(serde_json::from_str(line)?);
    }
    Ok(fixes)
}

/// Generate a noisy ride heading roughly north-east at cycling pace
fn generate_track(points: usize, step_ms: i64, start_ms: i64) -> Vec<Fix> {
    const METERS_PER_DEGREE: f64 = 111_195.0;

    let mut rng = rand::thread_rng();
    let mut latitude = 51.5007;
    let mut longitude = -0.1246;
    let mut heading: f64 = 45.0;
    let mut fixes = Vec::with_capacity(points);

    for i in 0..points {
        let speed_mps: f64 = rng.gen_range(4.0..8.0);
        heading += rng.gen_range(-10.0..10.0);
        let step_m = speed_mps * step_ms as f64 / 1000.0;

        latitude += step_m * heading.to_radians().cos() / METERS_PER_DEGREE;
        longitude += step_m * heading.to_radians().sin()
            / (METERS_PER_DEGREE * latitude.to_radians().cos());

        fixes.push(Fix {
            latitude,
            longitude,
            altitude: 35.0 + rng.gen_range(-2.0..2.0),
            timestamp_ms: start_ms + i as i64 * step_ms,
            accuracy: rng.gen_range(3.0..12.0),
            speed_mps: Some(speed_mps as f32),
        });
    }

    fixes
}
