//! Configuration types for the camwatch console

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub snapshot_backup: SnapshotBackupConfig,
}

/// Where the surveillance backend lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Background refresh cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_refresh_interval")]
    pub devices_interval_seconds: u64,
    #[serde(default = "default_refresh_interval")]
    pub snapshots_interval_seconds: u64,
    #[serde(default = "default_refresh_interval")]
    pub records_interval_seconds: u64,
    #[serde(default = "default_recording_tick")]
    pub recording_tick_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            devices_interval_seconds: default_refresh_interval(),
            snapshots_interval_seconds: default_refresh_interval(),
            records_interval_seconds: default_refresh_interval(),
            recording_tick_ms: default_recording_tick(),
        }
    }
}

impl PollingConfig {
    pub fn recording_tick(&self) -> Duration {
        Duration::from_millis(self.recording_tick_ms)
    }
}

/// Parameters sent with a start-recording request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    #[serde(default = "default_segment_time")]
    pub segment_time_seconds: u64,
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            segment_time_seconds: default_segment_time(),
            file_extension: default_file_extension(),
        }
    }
}

/// Client-side behavior switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Re-fetch from the backend after a settings update instead of keeping
    /// the submitted values
    #[serde(default)]
    pub refresh_after_update: bool,
    /// External player launched on the stream URL, e.g. "mpv" or "ffplay"
    #[serde(default)]
    pub player: Option<String>,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            refresh_after_update: false,
            player: None,
            download_dir: default_download_dir(),
        }
    }
}

/// Periodic snapshot backup of the selected device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotBackupConfig {
    /// Client tick between backup requests, also sent as the backend capture interval
    #[serde(default = "default_backup_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: u64,
    /// Backend-side directory; `snapshots/<username>` when unset
    #[serde(default)]
    pub output_dir: Option<String>,
}

impl Default for SnapshotBackupConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_backup_interval(),
            max_snapshots: default_max_snapshots(),
            output_dir: None,
        }
    }
}

impl SnapshotBackupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn output_dir_for(&self, username: &str) -> String {
        self.output_dir
            .clone()
            .unwrap_or_else(|| format!("snapshots/{}", username))
    }
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_refresh_interval() -> u64 {
    15
}

fn default_recording_tick() -> u64 {
    1000
}

fn default_segment_time() -> u64 {
    3600
}

fn default_file_extension() -> String {
    "mp4".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_backup_interval() -> u64 {
    10
}

fn default_max_snapshots() -> u64 {
    30
}

impl Config {
    /// Reject values the console cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let url = reqwest::Url::parse(&self.backend.base_url).map_err(|e| {
            crate::CamwatchError::Config(format!(
                "Invalid backend base_url {:?}: {}",
                self.backend.base_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(crate::CamwatchError::Config(format!(
                "Unsupported backend scheme '{}'",
                url.scheme()
            )));
        }

        let intervals = [
            ("devices_interval_seconds", self.polling.devices_interval_seconds),
            ("snapshots_interval_seconds", self.polling.snapshots_interval_seconds),
            ("records_interval_seconds", self.polling.records_interval_seconds),
            ("recording_tick_ms", self.polling.recording_tick_ms),
            ("request_timeout_seconds", self.backend.request_timeout_seconds),
            ("snapshot_backup.interval_seconds", self.snapshot_backup.interval_seconds),
            ("snapshot_backup.max_snapshots", self.snapshot_backup.max_snapshots),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(crate::CamwatchError::Config(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::CamwatchError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
