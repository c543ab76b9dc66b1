//! Periodic real-time arrival collection into snapshot files

use crate::seoul_api::{ArrivalApiError, SeoulArrivalClient};
use chrono::Local;
use seathunter_common::realtime::{write_snapshot, ArrivalRecord, ArrivalSnapshot};
use seathunter_common::Result;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Anything that can list upcoming arrivals for a station
#[allow(async_fn_in_trait)]
pub trait ArrivalSource {
    async fn fetch_arrivals(&self, station_name: &str) -> std::result::Result<Vec<ArrivalRecord>, ArrivalApiError>;
}

impl ArrivalSource for SeoulArrivalClient {
    async fn fetch_arrivals(&self, station_name: &str) -> std::result::Result<Vec<ArrivalRecord>, ArrivalApiError> {
        SeoulArrivalClient::fetch_arrivals(self, station_name).await
    }
}

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub stations: Vec<String>,
    pub interval: Duration,
    /// Stop after this many cycles; None runs until Ctrl+C
    pub cycles: Option<u32>,
    pub snapshot_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorSummary {
    pub cycles_run: u32,
    pub arrivals_collected: usize,
    pub snapshots_written: Vec<PathBuf>,
}

/// Poll every station once; a failing station is logged and left out
pub async fn collect_once<S: ArrivalSource>(source: &S, stations: &[String]) -> Vec<ArrivalRecord> {
    let mut arrivals = Vec::new();
    for station in stations {
        match source.fetch_arrivals(station).await {
            Ok(found) if found.is_empty() => info!(station = %station, "No arrivals reported"),
            Ok(found) => {
                info!(station = %station, trains = found.len(), "Collected arrivals");
                arrivals.extend(found);
            }
            Err(e) => warn!(station = %station, "Arrival lookup failed: {}", e),
        }
    }
    arrivals
}

/// Run collection cycles until Ctrl+C or the cycle limit
pub async fn run_collector<S: ArrivalSource>(source: &S, settings: &CollectorSettings) -> Result<CollectorSummary> {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };
    run_collector_until(source, settings, ctrl_c).await
}

/// Run collection cycles, writing one snapshot per non-empty cycle
///
/// `shutdown` is watched while waiting for the next tick and while a cycle
/// is polling stations; an interrupted cycle writes nothing.
pub async fn run_collector_until<S, F>(
    source: &S,
    settings: &CollectorSettings,
    shutdown: F,
) -> Result<CollectorSummary>
where
    S: ArrivalSource,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut summary = CollectorSummary::default();
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        stations = settings.stations.len(),
        interval_secs = settings.interval.as_secs(),
        "Starting arrival collector"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("Interrupted, stopping collector");
                break;
            }
        }

        let collected_at = Local::now().naive_local();
        let arrivals = tokio::select! {
            arrivals = collect_once(source, &settings.stations) => arrivals,
            _ = &mut shutdown => {
                info!("Interrupted mid-cycle, stopping collector");
                break;
            }
        };
        summary.cycles_run += 1;

        if arrivals.is_empty() {
            warn!(cycle = summary.cycles_run, "No arrivals this cycle, snapshot skipped");
        } else {
            summary.arrivals_collected += arrivals.len();
            let snapshot = ArrivalSnapshot::new(collected_at, arrivals);
            let path = write_snapshot(&settings.snapshot_dir, &snapshot, Local::now().naive_local())?;
            info!("✓ Saved snapshot {} ({} arrivals)", path.display(), snapshot.arrivals.len());
            summary.snapshots_written.push(path);
        }

        if settings.cycles.is_some_and(|limit| summary.cycles_run >= limit) {
            break;
        }
    }

    Ok(summary)
}
