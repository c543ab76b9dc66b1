//! Queries over the two persisted datasets
//!
//! Writers replace a whole table inside one transaction so readers never see
//! a half-written batch.

use crate::classifier::StationProfile;
use crate::history::{Direction, HistoricalAggregate, POST_MIDNIGHT_HOUR_KEY};
use crate::station;
use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

// ========================================
// Station features
// ========================================

/// Replace the station-feature dataset
pub async fn replace_profiles(pool: &SqlitePool, profiles: &[StationProfile]) -> Result<usize> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM station_feature")
        .execute(&mut *tx)
        .await?;

    for profile in profiles {
        sqlx::query(
            "INSERT OR REPLACE INTO station_feature (station_name, feature_list, target_list) VALUES (?, ?, ?)",
        )
        .bind(&profile.station_name)
        .bind(profile.feature_list())
        .bind(profile.target_list())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!("✓ Stored {} station profiles", profiles.len());
    Ok(profiles.len())
}

/// All profiles, ordered by station name
pub async fn load_profiles(pool: &SqlitePool) -> Result<Vec<StationProfile>> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT station_name, feature_list, target_list FROM station_feature ORDER BY station_name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(name, features, targets)| StationProfile::from_lists(&name, &features, &targets))
        .collect())
}

/// One profile by name
///
/// "서울", "서울역" and "Seoul Station"-style variants resolve to the same
/// stored row.
pub async fn find_profile(pool: &SqlitePool, station_name: &str) -> Result<StationProfile> {
    let exact: Option<(String, String, String)> = sqlx::query_as(
        "SELECT station_name, feature_list, target_list FROM station_feature WHERE station_name = ?",
    )
    .bind(station::display_name(station_name))
    .fetch_optional(pool)
    .await?;

    if let Some((name, features, targets)) = exact {
        return Ok(StationProfile::from_lists(&name, &features, &targets));
    }

    let key = station::join_key(station_name);
    debug!(station = station_name, key = %key, "No exact profile match, comparing join keys");
    load_profiles(pool)
        .await?
        .into_iter()
        .find(|profile| profile.join_key() == key)
        .ok_or_else(|| Error::NotFound(format!("No profile for station: {}", station_name)))
}

// ========================================
// Historical aggregates
// ========================================

/// Replace the historical aggregate dataset
pub async fn replace_aggregates(
    pool: &SqlitePool,
    aggregates: &[HistoricalAggregate],
) -> Result<usize> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM historical_aggregate")
        .execute(&mut *tx)
        .await?;

    for aggregate in aggregates {
        let count = i64::try_from(aggregate.average_count).map_err(|_| {
            Error::InvalidInput(format!(
                "Average count out of range for {}: {}",
                aggregate.station_name, aggregate.average_count
            ))
        })?;
        sqlx::query(
            "INSERT OR REPLACE INTO historical_aggregate (station_name, hour, direction, average_count) VALUES (?, ?, ?, ?)",
        )
        .bind(&aggregate.station_name)
        .bind(i64::from(aggregate.hour))
        .bind(aggregate.direction.as_str())
        .bind(count)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!("✓ Stored {} historical aggregates", aggregates.len());
    Ok(aggregates.len())
}

/// All aggregates ordered by (station, hour, direction)
///
/// Rows with an unrecognised direction, an hour outside 0-24 or a negative
/// count are skipped.
pub async fn load_aggregates(pool: &SqlitePool) -> Result<Vec<HistoricalAggregate>> {
    let rows: Vec<(String, i64, String, i64)> = sqlx::query_as(
        "SELECT station_name, hour, direction, average_count FROM historical_aggregate ORDER BY station_name, hour, direction",
    )
    .fetch_all(pool)
    .await?;

    let mut aggregates = Vec::with_capacity(rows.len());
    for (station_name, hour, direction, average_count) in rows {
        let direction = match direction.parse::<Direction>() {
            Ok(direction) => direction,
            Err(e) => {
                warn!(station = %station_name, "Skipping stored aggregate: {}", e);
                continue;
            }
        };
        let Some(hour) = u8::try_from(hour).ok().filter(|h| *h <= POST_MIDNIGHT_HOUR_KEY) else {
            warn!(station = %station_name, hour, "Skipping stored aggregate: hour out of range");
            continue;
        };
        let Ok(average_count) = u64::try_from(average_count) else {
            warn!(station = %station_name, average_count, "Skipping stored aggregate: negative count");
            continue;
        };
        aggregates.push(HistoricalAggregate {
            station_name,
            hour,
            direction,
            average_count,
        });
    }
    Ok(aggregates)
}

/// Distinct station names present in the historical dataset
pub async fn station_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT station_name FROM historical_aggregate ORDER BY station_name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Average alighting count for a station at one hour key
///
/// An exact name match wins over a join-key match.
pub async fn alighting_volume(pool: &SqlitePool, station_name: &str, hour: u8) -> Result<Option<u64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT station_name, average_count FROM historical_aggregate WHERE hour = ? AND direction = 'alighting'",
    )
    .bind(i64::from(hour))
    .fetch_all(pool)
    .await?;

    let rows: Vec<(String, u64)> = rows
        .into_iter()
        .filter_map(|(name, count)| match u64::try_from(count) {
            Ok(count) => Some((name, count)),
            Err(_) => {
                warn!(station = %name, count, "Ignoring stored aggregate with negative count");
                None
            }
        })
        .collect();

    let wanted = station::display_name(station_name);
    let key = station::join_key(station_name);
    let exact = rows.iter().find(|(name, _)| *name == wanted);
    let matched = exact.or_else(|| rows.iter().find(|(name, _)| station::join_key(name) == key));

    Ok(matched.map(|(_, count)| *count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use crate::tags::{Feature, TargetCode};
    use std::collections::BTreeSet;

    async fn setup() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("test.db")).await.unwrap();
        (dir, pool)
    }

    fn agg(station: &str, hour: u8, direction: Direction, count: u64) -> HistoricalAggregate {
        HistoricalAggregate {
            station_name: station.to_string(),
            hour,
            direction,
            average_count: count,
        }
    }

    #[tokio::test]
    async fn test_profiles_roundtrip_and_replace() {
        let (_dir, pool) = setup().await;
        let seoul = StationProfile::new(
            "서울역",
            BTreeSet::from([Feature::Terminal, Feature::TransferHub]),
            BTreeSet::from([TargetCode::Traveler, TargetCode::Transfer]),
        );
        replace_profiles(&pool, &[seoul.clone(), StationProfile::general("도봉산")])
            .await
            .unwrap();

        let loaded = load_profiles(&pool).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains(&seoul));

        replace_profiles(&pool, &[StationProfile::general("시청")]).await.unwrap();
        let loaded = load_profiles(&pool).await.unwrap();
        assert_eq!(loaded, vec![StationProfile::general("시청")]);
    }

    #[tokio::test]
    async fn test_find_profile_suffix_fallback() {
        let (_dir, pool) = setup().await;
        let profile = StationProfile::new(
            "서울역",
            BTreeSet::from([Feature::Terminal]),
            BTreeSet::from([TargetCode::Traveler]),
        );
        replace_profiles(&pool, &[profile.clone()]).await.unwrap();

        assert_eq!(find_profile(&pool, "서울역").await.unwrap(), profile);
        assert_eq!(find_profile(&pool, " 서울 ").await.unwrap(), profile);
        assert!(matches!(
            find_profile(&pool, "부산").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_aggregates_and_volume() {
        let (_dir, pool) = setup().await;
        replace_aggregates(
            &pool,
            &[
                agg("서울역", 8, Direction::Alighting, 6000),
                agg("서울역", 8, Direction::Boarding, 2000),
                agg("강남", 8, Direction::Alighting, 3500),
                agg("강남", 24, Direction::Alighting, 120),
            ],
        )
        .await
        .unwrap();

        assert_eq!(load_aggregates(&pool).await.unwrap().len(), 4);
        assert_eq!(
            station_names(&pool).await.unwrap(),
            vec!["강남".to_string(), "서울역".to_string()]
        );
        assert_eq!(alighting_volume(&pool, "서울", 8).await.unwrap(), Some(6000));
        assert_eq!(alighting_volume(&pool, "강남역", 8).await.unwrap(), Some(3500));
        assert_eq!(alighting_volume(&pool, "강남", 9).await.unwrap(), None);
        assert_eq!(alighting_volume(&pool, "잠실", 8).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replace_aggregates_clears_previous_batch() {
        let (_dir, pool) = setup().await;
        replace_aggregates(&pool, &[agg("서울역", 8, Direction::Alighting, 6000)])
            .await
            .unwrap();
        replace_aggregates(&pool, &[]).await.unwrap();
        assert!(load_aggregates(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_aggregate_rows_are_skipped() {
        let (_dir, pool) = setup().await;
        replace_aggregates(&pool, &[agg("서울역", 8, Direction::Alighting, 6000)])
            .await
            .unwrap();

        // Rows written by an older schema without CHECK constraints
        let mut conn = pool.acquire().await.unwrap();
        sqlx::query("PRAGMA ignore_check_constraints = ON")
            .execute(&mut *conn)
            .await
            .unwrap();
        for (station, hour, direction, count) in [
            ("강남", 25_i64, "alighting", 100_i64),
            ("강남", 300, "alighting", 100),
            ("시청", 8, "alighting", -5),
            ("잠실", 8, "sideways", 100),
        ] {
            sqlx::query(
                "INSERT INTO historical_aggregate (station_name, hour, direction, average_count) VALUES (?, ?, ?, ?)",
            )
            .bind(station)
            .bind(hour)
            .bind(direction)
            .bind(count)
            .execute(&mut *conn)
            .await
            .unwrap();
        }
        sqlx::query("PRAGMA ignore_check_constraints = OFF")
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        let loaded = load_aggregates(&pool).await.unwrap();
        assert_eq!(loaded, vec![agg("서울역", 8, Direction::Alighting, 6000)]);
        assert_eq!(alighting_volume(&pool, "시청", 8).await.unwrap(), None);
    }
}
