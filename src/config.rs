//! Monitor configuration loaded from a TOML file.
//!
//! Config keys: `base_url`, `poll_interval_ms`, `metric_keys`,
//! `progress_ramp_percent_per_minute`. A missing file yields defaults;
//! out-of-range values are clamped on load.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;

/// Default filename used to store the monitor configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Accepted polling cadence range in milliseconds.
pub const MIN_POLL_INTERVAL_MS: u64 = 1000;
/// Upper bound of the accepted polling cadence.
pub const MAX_POLL_INTERVAL_MS: u64 = 3000;

/// Configuration for one training-session monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Base URL of the training service.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Fixed delay between the end of one poll and the next dispatch.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Canonical metric names shown in the result table.
    #[serde(default = "default_metric_keys")]
    pub metric_keys: Vec<String>,
    /// Ramp used to estimate progress from wall-clock time when the service
    /// has not reported epoch counts yet.
    #[serde(default = "default_progress_ramp")]
    pub progress_ramp_percent_per_minute: f32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            metric_keys: default_metric_keys(),
            progress_ramp_percent_per_minute: default_progress_ramp(),
        }
    }
}

impl MonitorConfig {
    /// Clamp values into their accepted ranges.
    pub fn normalized(mut self) -> Self {
        self.poll_interval_ms = self
            .poll_interval_ms
            .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS);
        self.progress_ramp_percent_per_minute =
            self.progress_ramp_percent_per_minute.clamp(1.0, 50.0);
        self
    }

    /// Polling cadence as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_metric_keys() -> Vec<String> {
    ["map50", "precision", "recall", "loss"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_progress_ramp() -> f32 {
    5.0
}

/// Errors raised while loading or saving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The application directory could not be resolved or created.
    #[error(transparent)]
    AppDir(#[from] app_dirs::AppDirError),
    /// Failed to read the config file.
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The config file is not valid TOML for the expected schema.
    #[error("Failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to write the config file.
    #[error("Failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to serialize the configuration.
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Resolve the configuration file path, ensuring the parent directory exists.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from the default location, returning defaults if missing.
pub fn load_or_default() -> Result<MonitorConfig, ConfigError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(MonitorConfig::default());
    }
    load_from_path(&path)
}

/// Load configuration from a specific file.
pub fn load_from_path(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: MonitorConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(config.normalized())
}

/// Save configuration to a specific path, creating parent directories as needed.
pub fn save_to_path(config: &MonitorConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let text = toml::to_string_pretty(config)?;
    std::fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_reviewed_service() {
        let config = MonitorConfig::default();
        assert_eq!(config.poll_interval_ms, 3000);
        assert_eq!(config.base_url, "http://127.0.0.1:5000");
        assert_eq!(
            config.metric_keys,
            vec!["map50", "precision", "recall", "loss"]
        );
    }

    #[test]
    fn normalization_clamps_poll_interval() {
        let fast = MonitorConfig {
            poll_interval_ms: 10,
            ..MonitorConfig::default()
        }
        .normalized();
        assert_eq!(fast.poll_interval_ms, MIN_POLL_INTERVAL_MS);

        let slow = MonitorConfig {
            poll_interval_ms: 60_000,
            ..MonitorConfig::default()
        }
        .normalized();
        assert_eq!(slow.poll_interval_ms, MAX_POLL_INTERVAL_MS);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "base_url = \"http://10.0.0.2:8080\"\n").unwrap();
        let config = load_from_path(&path).unwrap();
        assert_eq!(config.base_url, "http://10.0.0.2:8080");
        assert_eq!(config.poll_interval_ms, 3000);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = MonitorConfig {
            base_url: "http://trainer.local".to_string(),
            poll_interval_ms: 1500,
            metric_keys: vec!["map50".to_string()],
            progress_ramp_percent_per_minute: 10.0,
        };
        save_to_path(&config, &path).unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "poll_interval_ms = \"soon\"\n").unwrap();
        assert!(matches!(
            load_from_path(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
