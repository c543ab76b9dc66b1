//! Database initialization

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the database and its tables
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_station_feature_table(&pool).await?;
    create_historical_aggregate_table(&pool).await?;

    Ok(pool)
}

async fn create_station_feature_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS station_feature (
            station_name TEXT PRIMARY KEY,
            feature_list TEXT NOT NULL DEFAULT '',
            target_list TEXT NOT NULL DEFAULT 'General'
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_historical_aggregate_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS historical_aggregate (
            station_name TEXT NOT NULL,
            hour INTEGER NOT NULL CHECK (hour >= 0 AND hour <= 24),
            direction TEXT NOT NULL CHECK (direction IN ('boarding', 'alighting')),
            average_count INTEGER NOT NULL CHECK (average_count >= 0),
            PRIMARY KEY (station_name, hour, direction)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_historical_hour ON historical_aggregate(hour, direction)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("seathunter.db");

        let pool = init_database(&path).await.unwrap();
        pool.close().await;
        assert!(path.exists());

        let pool = init_database(&path).await.unwrap();
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(names, vec!["historical_aggregate", "station_feature"]);
    }
}
