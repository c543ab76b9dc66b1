//! Configuration loading and root folder resolution
//!
//! Every field has a default so a missing or partial `config.toml` still
//! yields a usable configuration.

use crate::classifier::ClassifierStrategy;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the data root folder
pub const ROOT_FOLDER_ENV: &str = "SEATHUNTER_ROOT";
/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "SEATHUNTER_CONFIG";
/// Environment variable holding the place-search REST key
pub const PLACE_SEARCH_KEY_ENV: &str = "KAKAO_API_KEY";
/// Environment variable holding the real-time arrival API key
pub const REALTIME_KEY_ENV: &str = "SEOUL_API_KEY";

const APP_DIR: &str = "seathunter";

/// Bootstrap configuration read from TOML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TomlConfig {
    /// Data folder for the database, snapshots and exports
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub classifier: ClassifierConfig,
    pub place_search: PlaceSearchConfig,
    pub realtime: RealtimeConfig,
    pub history_api: HistoryApiConfig,
    pub scoring: ScoringConfig,
    pub report: ReportConfig,
    pub api: ApiConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ClassifierConfig {
    pub strategy: ClassifierStrategy,
    /// TOML category table replacing the built-in Lines 1-4 table
    pub category_table: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaceSearchConfig {
    pub api_key: Option<String>,
    pub radius_m: u32,
    pub requests_per_second: u32,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for PlaceSearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            radius_m: crate::classifier::DEFAULT_SEARCH_RADIUS_M,
            requests_per_second: 20,
            max_retries: 3,
            initial_backoff_ms: 500,
        }
    }
}

impl PlaceSearchConfig {
    /// Configured key, falling back to `KAKAO_API_KEY`
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), PLACE_SEARCH_KEY_ENV)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub api_key: Option<String>,
    /// Stations polled on every collection cycle
    pub stations: Vec<String>,
    pub interval_secs: u64,
    pub max_arrivals: u32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            stations: ["서울역", "강남", "홍대입구", "잠실", "신도림"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            interval_secs: 600,
            max_arrivals: 10,
        }
    }
}

impl RealtimeConfig {
    /// Configured key, falling back to `SEOUL_API_KEY`
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), REALTIME_KEY_ENV)
    }
}

/// Monthly ridership download (`fetch-history`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryApiConfig {
    pub api_key: Option<String>,
    /// Whole months fetched, ending with last month
    pub months: u32,
    /// Line names kept (e.g. "2호선"); empty keeps every line
    pub lines: Vec<String>,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for HistoryApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            months: 6,
            lines: ["1호선", "2호선", "3호선", "4호선"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_retries: 3,
            initial_backoff_ms: 500,
        }
    }
}

impl HistoryApiConfig {
    /// Configured key, falling back to `SEOUL_API_KEY`
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), REALTIME_KEY_ENV)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Hour whose alighting average feeds the off-board volume
    pub reference_hour: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { reference_hour: 8 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ReportConfig {
    /// TOML coordinate table replacing the built-in station positions
    pub coordinates: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 5730 }
    }
}

fn resolve_key(configured: Option<&str>, env_var_name: &str) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(env_var_name).ok().filter(|k| !k.trim().is_empty()))
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Read a config file, or fall back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let config = Self::load(path)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scoring.reference_hour > 24 {
            return Err(Error::Config(format!(
                "scoring.reference_hour must be 0-24, got {}",
                self.scoring.reference_hour
            )));
        }
        if self.place_search.requests_per_second == 0 {
            return Err(Error::Config(
                "place_search.requests_per_second must be positive".to_string(),
            ));
        }
        if self.realtime.interval_secs == 0 {
            return Err(Error::Config(
                "realtime.interval_secs must be positive".to_string(),
            ));
        }
        if self.history_api.months == 0 {
            return Err(Error::Config(
                "history_api.months must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Config file resolution: CLI argument, then `SEATHUNTER_CONFIG`, then the
/// per-user config directory
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR).join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Root folder resolution priority:
/// 1. Command-line argument
/// 2. `SEATHUNTER_ROOT`
/// 3. `root_folder` from the TOML config
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        return PathBuf::from(path);
    }
    if let Some(path) = &config.root_folder {
        return path.clone();
    }
    default_root_folder()
}

fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./seathunter_data"))
}

/// File layout beneath the root folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("seathunter.db")
    }

    /// Raw real-time arrival snapshots
    pub fn snapshot_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    /// CSV exports (congestion report, station features)
    pub fn export_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(self.snapshot_dir())?;
        std::fs::create_dir_all(self.export_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.classifier.strategy, ClassifierStrategy::Static);
        assert_eq!(config.place_search.radius_m, 500);
        assert_eq!(config.place_search.requests_per_second, 20);
        assert_eq!(config.realtime.interval_secs, 600);
        assert_eq!(config.realtime.max_arrivals, 10);
        assert_eq!(config.scoring.reference_hour, 8);
        assert_eq!(config.history_api.months, 6);
        assert_eq!(config.history_api.lines.len(), 4);
        assert!(config.report.coordinates.is_none());
        assert_eq!(config.api.port, 5730);
        assert!(config.root_folder.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = TomlConfig::from_toml_str(
            r#"
            root_folder = "/srv/seathunter"

            [classifier]
            strategy = "place_search"

            [realtime]
            stations = ["시청"]

            [history_api]
            months = 3
            lines = []

            [report]
            coordinates = "/srv/seathunter/coords.toml"

            [api]
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/seathunter")));
        assert_eq!(config.classifier.strategy, ClassifierStrategy::PlaceSearch);
        assert_eq!(config.realtime.stations, vec!["시청".to_string()]);
        assert_eq!(config.realtime.interval_secs, 600);
        assert_eq!(config.history_api.months, 3);
        assert!(config.history_api.lines.is_empty());
        assert_eq!(config.history_api.max_retries, 3);
        assert_eq!(
            config.report.coordinates,
            Some(PathBuf::from("/srv/seathunter/coords.toml"))
        );
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn test_rejects_out_of_range_hour() {
        let err = TomlConfig::from_toml_str("[scoring]\nreference_hour = 30\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = TomlConfig::from_toml_str("[history_api]\nmonths = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TomlConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.api.port, 5730);
    }

    #[test]
    fn test_unreadable_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api\nport = ").unwrap();
        assert!(matches!(TomlConfig::load_or_default(&path), Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_root_folder_priority() {
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };

        std::env::set_var(ROOT_FOLDER_ENV, "/from/env");
        assert_eq!(
            resolve_root_folder(Some(Path::new("/from/cli")), &config),
            PathBuf::from("/from/cli")
        );
        assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/env"));

        std::env::remove_var(ROOT_FOLDER_ENV);
        assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/toml"));
        assert!(resolve_root_folder(None, &TomlConfig::default()).ends_with("seathunter")
            || resolve_root_folder(None, &TomlConfig::default()).ends_with("seathunter_data"));
    }

    #[test]
    #[serial]
    fn test_api_key_env_fallback() {
        std::env::set_var(PLACE_SEARCH_KEY_ENV, "env-key");
        let mut place = PlaceSearchConfig::default();
        assert_eq!(place.resolved_api_key().as_deref(), Some("env-key"));

        place.api_key = Some("toml-key".to_string());
        assert_eq!(place.resolved_api_key().as_deref(), Some("toml-key"));

        place.api_key = Some("   ".to_string());
        assert_eq!(place.resolved_api_key().as_deref(), Some("env-key"));
        std::env::remove_var(PLACE_SEARCH_KEY_ENV);
    }

    #[test]
    fn test_data_layout() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        layout.ensure_directories().unwrap();

        assert_eq!(layout.database_path(), dir.path().join("seathunter.db"));
        assert!(layout.snapshot_dir().is_dir());
        assert!(layout.export_dir().is_dir());
    }
}
