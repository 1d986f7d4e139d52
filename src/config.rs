use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_API_PORT, DEFAULT_COUNT_REFRESH_INTERVAL, DEFAULT_PROBE_INTERVAL,
    DEFAULT_STORAGE_CAP_BYTES, DEFAULT_WRITE_TIMEOUT,
};
use crate::coordinator::CoordinatorOptions;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    /// Offline queue + sync configuration
    OfflineSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite database file (default)
    Sqlite,
    /// Directory of JSON files
    File,
    /// In-process only, lost on exit
    Memory,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_api_port() -> u16 {
    DEFAULT_API_PORT
}

fn default_storage_cap() -> u64 {
    DEFAULT_STORAGE_CAP_BYTES
}

/// Local storage configuration (maps to [storage] section in TOML)
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend: sqlite, file or memory (default: sqlite)
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    /// Database file for sqlite, directory for file
    pub path: Option<PathBuf>,
}

/// Remote service configuration (maps to [remote] section in TOML)
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the hosted backend (e.g., https://project.supabase.co)
    pub url: String,
    /// Credential profile name to look up the API key from ~/.config/guardian_sync/credentials.toml
    pub credential_profile: Option<String>,
    /// Per-write timeout in seconds (default: 30)
    pub write_timeout_secs: Option<u64>,
}

/// Sync behavior (maps to optional [sync] section in TOML)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncSettings {
    /// Unsynced count refresh interval in seconds (default: 5)
    pub count_refresh_secs: Option<u64>,
    /// Connectivity probe interval in seconds (default: 10)
    pub probe_interval_secs: Option<u64>,
    /// Start a drain on refresh ticks when online with pending records (default: false)
    pub drain_on_refresh: Option<bool>,
}

/// Configuration file structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Configuration type (must be "offline_sync")
    pub config_type: ConfigType,
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    /// Advisory storage capacity used for usage reporting (default: 5 MiB)
    #[serde(default = "default_storage_cap")]
    pub storage_cap_bytes: u64,
    /// HTTP API port for the serve command (default: 3000)
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if matches!(
            self.storage.backend,
            StorageBackend::Sqlite | StorageBackend::File
        ) && self.storage.path.is_none()
        {
            return Err(ConfigError::Invalid(
                "[storage] path is required for sqlite and file backends".to_string(),
            ));
        }

        url::Url::parse(&self.remote.url).map_err(|e| {
            ConfigError::Invalid(format!("[remote] url '{}' is invalid: {}", self.remote.url, e))
        })?;

        let zero_intervals = [
            ("remote.write_timeout_secs", self.remote.write_timeout_secs),
            ("sync.count_refresh_secs", self.sync.count_refresh_secs),
            ("sync.probe_interval_secs", self.sync.probe_interval_secs),
        ];
        for (name, value) in zero_intervals {
            if value == Some(0) {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
            }
        }

        Ok(())
    }

    pub fn write_timeout(&self) -> Duration {
        self.remote
            .write_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_WRITE_TIMEOUT)
    }

    pub fn probe_interval(&self) -> Duration {
        self.sync
            .probe_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_PROBE_INTERVAL)
    }

    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            write_timeout: self.write_timeout(),
            count_refresh_interval: self
                .sync
                .count_refresh_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_COUNT_REFRESH_INTERVAL),
            drain_on_refresh: self.sync.drain_on_refresh.unwrap_or(false),
        }
    }
}
