//! seathunter-etl - batch jobs for Seat Hunter
//!
//! Loads historical counts (CSV export or the monthly ridership API),
//! classifies stations, collects real-time arrivals and produces congestion
//! reports and car recommendations.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use seathunter_common::classifier::{
    CategoryTable, ClassifierStrategy, PlaceSearchClassifier, StaticClassifier,
};
use seathunter_common::config::{resolve_config_path, resolve_root_folder, DataLayout, TomlConfig};
use seathunter_common::coordinates::CoordinateTable;
use seathunter_common::history::WideRow;
use seathunter_common::realtime::load_snapshot_dir;
use seathunter_common::{db, history, presenter};
use seathunter_common::{reconcile, Classifier, ProfileDirectory, ScoringEngine, StationProfile};
use seathunter_etl::{
    history_months, read_wide_csv, run_collector, CardHistoryClient, CollectorSettings,
    KakaoPlaceSearch, RetryPolicy, SeoulArrivalClient,
};
use sqlx::SqlitePool;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const CONGESTION_REPORT_FILE: &str = "realtime_congestion_report.csv";
const STATION_FEATURE_FILE: &str = "station_feature.csv";

/// Command-line arguments for seathunter-etl
#[derive(Parser, Debug)]
#[command(name = "seathunter-etl")]
#[command(about = "Seat Hunter data pipeline")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data folder holding the database, snapshots and exports
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Aggregate a wide hourly CSV export into the historical dataset
    LoadHistory {
        /// CSV export path
        csv: PathBuf,
    },

    /// Download monthly hourly ridership and rebuild the historical dataset
    FetchHistory {
        /// Whole months to fetch, ending with last month (default: history_api.months)
        #[arg(long)]
        months: Option<u32>,
    },

    /// Classify stations and store their feature profiles
    Classify {
        /// Classification strategy (static, place_search)
        #[arg(long)]
        strategy: Option<ClassifierStrategy>,

        /// Stations to classify (default: every station in the historical dataset)
        #[arg(long = "station")]
        stations: Vec<String>,
    },

    /// Poll real-time arrivals and save snapshots
    CollectArrivals {
        /// Number of cycles to run (default: until Ctrl+C)
        #[arg(long)]
        cycles: Option<u32>,
    },

    /// Reconcile snapshots with history and export the congestion report
    Report {
        /// Snapshot folder (default: <root>/raw)
        #[arg(long)]
        snapshots: Option<PathBuf>,

        /// Rows printed to the terminal
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Recommend a car for one station
    Recommend {
        station: String,

        /// Hour key for the alighting volume (default: configured reference hour)
        #[arg(long)]
        hour: Option<u8>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = TomlConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("seathunter-etl {}", env!("CARGO_PKG_VERSION"));
    if config_path.exists() {
        info!("Config: {}", config_path.display());
    } else {
        warn!("Config file {} not found, using defaults", config_path.display());
    }

    let layout = DataLayout::new(resolve_root_folder(cli.root_folder.as_deref(), &config));
    layout
        .ensure_directories()
        .with_context(|| format!("Failed to prepare {}", layout.root().display()))?;
    info!("Root folder: {}", layout.root().display());

    let pool = db::init_database(&layout.database_path())
        .await
        .context("Failed to open database")?;

    match cli.command {
        Command::LoadHistory { csv } => load_history(&pool, &csv).await,
        Command::FetchHistory { months } => {
            let months = months.unwrap_or(config.history_api.months);
            fetch_history(&pool, &config, months).await
        }
        Command::Classify { strategy, stations } => {
            classify(&pool, &config, &layout, strategy, stations).await
        }
        Command::CollectArrivals { cycles } => collect_arrivals(&config, &layout, cycles).await,
        Command::Report { snapshots, limit } => {
            let dir = snapshots.unwrap_or_else(|| layout.snapshot_dir());
            report(&pool, &config, &layout, &dir, limit).await
        }
        Command::Recommend { station, hour, json } => {
            let hour = hour.unwrap_or(config.scoring.reference_hour);
            recommend(&pool, &station, hour, json).await
        }
    }
}

async fn load_history(pool: &SqlitePool, csv: &Path) -> Result<()> {
    let rows = read_wide_csv(csv).with_context(|| format!("Failed to read {}", csv.display()))?;
    store_history(pool, &rows).await
}

async fn fetch_history(pool: &SqlitePool, config: &TomlConfig, months: u32) -> Result<()> {
    if months == 0 {
        bail!("--months must be positive");
    }
    let settings = &config.history_api;
    let api_key = settings
        .resolved_api_key()
        .context("history_api.api_key or SEOUL_API_KEY is required")?;

    let months = history_months(chrono::Local::now().date_naive(), months);
    info!(
        "Fetching ridership for {} months ({} to {})",
        months.len(),
        months.first().map(String::as_str).unwrap_or("-"),
        months.last().map(String::as_str).unwrap_or("-")
    );

    let retry = RetryPolicy::new(
        settings.max_retries,
        Duration::from_millis(settings.initial_backoff_ms),
    );
    let client = CardHistoryClient::new(api_key, retry)?.with_lines(settings.lines.clone());
    let fetch = client.fetch_months(&months).await;
    if !fetch.months_failed.is_empty() {
        warn!("Months left out after errors: {}", fetch.months_failed.join(", "));
    }
    if fetch.rows.is_empty() {
        bail!("No ridership rows downloaded");
    }
    store_history(pool, &fetch.wide_rows()).await
}

async fn store_history(pool: &SqlitePool, rows: &[WideRow]) -> Result<()> {
    let aggregation = history::aggregate(rows)?;
    if !aggregation.dropped.is_empty() {
        warn!("{} cells could not be parsed and were left out", aggregation.dropped.len());
    }
    let stored = db::replace_aggregates(pool, &aggregation.aggregates).await?;
    info!("✓ Loaded {} aggregates from {} rows", stored, rows.len());
    Ok(())
}

async fn classify(
    pool: &SqlitePool,
    config: &TomlConfig,
    layout: &DataLayout,
    strategy: Option<ClassifierStrategy>,
    stations: Vec<String>,
) -> Result<()> {
    let partial = !stations.is_empty();
    let stations = if partial {
        stations
    } else {
        db::station_names(pool).await?
    };
    if stations.is_empty() {
        bail!("No stations to classify; run load-history first or pass --station");
    }

    let strategy = strategy.unwrap_or(config.classifier.strategy);
    info!("Classifying {} stations ({})", stations.len(), strategy);

    let profiles = match strategy {
        ClassifierStrategy::Static => {
            let table = match &config.classifier.category_table {
                Some(path) => CategoryTable::load(path)
                    .with_context(|| format!("Failed to load category table {}", path.display()))?,
                None => CategoryTable::seoul_lines_1_to_4(),
            };
            StaticClassifier::new(Arc::new(table)).classify_all(&stations)
        }
        ClassifierStrategy::PlaceSearch => {
            let settings = config.place_search.clone();
            let api_key = settings
                .resolved_api_key()
                .context("place_search.api_key or KAKAO_API_KEY is required")?;
            // The blocking HTTP client must live off the async runtime
            tokio::task::spawn_blocking(move || -> Result<Vec<StationProfile>> {
                let retry = RetryPolicy::new(
                    settings.max_retries,
                    Duration::from_millis(settings.initial_backoff_ms),
                );
                let search = KakaoPlaceSearch::new(api_key, settings.requests_per_second, retry)?;
                let classifier = PlaceSearchClassifier::new(search).with_radius(settings.radius_m);
                Ok(classifier.classify_all(&stations))
            })
            .await
            .context("Classification task panicked")??
        }
    };

    let profiles = if partial {
        let mut merged = db::load_profiles(pool).await?;
        merged.extend(profiles);
        ProfileDirectory::from_profiles(merged).into_profiles()
    } else {
        profiles
    };

    db::replace_profiles(pool, &profiles).await?;

    let export_path = layout.export_dir().join(STATION_FEATURE_FILE);
    presenter::write_profiles_csv(&profiles, File::create(&export_path)?)?;
    info!("✓ Exported {}", export_path.display());
    Ok(())
}

async fn collect_arrivals(config: &TomlConfig, layout: &DataLayout, cycles: Option<u32>) -> Result<()> {
    let api_key = config
        .realtime
        .resolved_api_key()
        .context("realtime.api_key or SEOUL_API_KEY is required")?;
    if config.realtime.stations.is_empty() {
        bail!("realtime.stations is empty");
    }

    let client = SeoulArrivalClient::new(api_key, config.realtime.max_arrivals)?;
    let settings = CollectorSettings {
        stations: config.realtime.stations.clone(),
        interval: Duration::from_secs(config.realtime.interval_secs),
        cycles,
        snapshot_dir: layout.snapshot_dir(),
    };

    let summary = run_collector(&client, &settings).await?;
    info!(
        "✓ Collector finished: {} cycles, {} snapshots, {} arrivals",
        summary.cycles_run,
        summary.snapshots_written.len(),
        summary.arrivals_collected
    );
    Ok(())
}

async fn report(
    pool: &SqlitePool,
    config: &TomlConfig,
    layout: &DataLayout,
    snapshot_dir: &Path,
    limit: usize,
) -> Result<()> {
    let historical = db::load_aggregates(pool).await?;
    if historical.is_empty() {
        warn!("Historical dataset is empty; every row will be unmatched");
    }

    let batch = load_snapshot_dir(snapshot_dir)?;
    if batch.observations.is_empty() {
        bail!("No arrivals in any snapshot under {}", snapshot_dir.display());
    }

    let rows = reconcile(&historical, &batch.observations);
    print!("{}", presenter::render_congestion_table(&rows, limit));

    let coordinates = match &config.report.coordinates {
        Some(path) => CoordinateTable::load(path)
            .with_context(|| format!("Failed to load coordinate table {}", path.display()))?,
        None => CoordinateTable::seoul_landmarks(),
    };

    let export_path = layout.export_dir().join(CONGESTION_REPORT_FILE);
    presenter::write_congestion_csv(&rows, &coordinates, File::create(&export_path)?)?;
    info!("✓ Exported {} rows to {}", rows.len(), export_path.display());
    Ok(())
}

async fn recommend(pool: &SqlitePool, station: &str, hour: u8, json: bool) -> Result<()> {
    let profile = db::find_profile(pool, station).await?;
    let volume = db::alighting_volume(pool, &profile.station_name, hour)
        .await?
        .unwrap_or(0);
    let recommendation = ScoringEngine::default().score(&profile, volume);

    if json {
        println!("{}", serde_json::to_string_pretty(&recommendation)?);
    } else {
        print!("{}", presenter::render_recommendation(&recommendation));
    }
    Ok(())
}
