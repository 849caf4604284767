//! Configuration management module.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const APP_NAME: &str = "gcode-uploader";

/// Configuration load result.
#[derive(Debug)]
pub enum ConfigLoadResult {
    /// Config loaded successfully.
    Loaded(AppConfig),
    /// Config file missing (first run).
    Missing,
    /// Config file exists but invalid.
    Invalid(ConfigError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub sacp: SacpConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Ports and reachability timeouts shared by both protocols.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// SACP TCP port (default: 8888).
    #[serde(default = "default_sacp_port")]
    pub sacp_port: u16,
    /// HTTP API port (default: 8080).
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Dial and handshake timeout in seconds (default: 5).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Reachability probe timeout in milliseconds (default: 1000).
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
}

fn default_sacp_port() -> u16 {
    crate::sacp::DEFAULT_PORT
}

fn default_http_port() -> u16 {
    8080
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_ping_timeout_ms() -> u64 {
    1000
}

/// SACP session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SacpConfig {
    /// Identity announced in the hello frame.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Per-read timeout while an upload runs, in seconds (default: 10).
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

fn default_client_name() -> String {
    APP_NAME.to_string()
}

fn default_read_timeout_secs() -> u64 {
    10
}

/// HTTP session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout for connect/status/disconnect requests in seconds (default: 10).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Total timeout for one file upload request in seconds (default: 60).
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    /// Approval polling interval in milliseconds (default: 2000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Status heartbeat interval during upload in milliseconds (default: 1000).
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Retries after a stale-token rejection (default: 3).
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    /// Wait between connect retries in milliseconds (default: 1000).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Minimum gap between progress reports in milliseconds (default: 35).
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_upload_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_heartbeat_interval_ms() -> u64 {
    1000
}

fn default_connect_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_progress_interval_ms() -> u64 {
    35
}

/// UDP discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Port devices listen on (default: 20054).
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    /// Total time to collect replies in milliseconds (default: 3000).
    #[serde(default = "default_discovery_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_discovery_port() -> u16 {
    crate::discovery::DEFAULT_PORT
}

fn default_discovery_timeout_ms() -> u64 {
    3000
}

/// Known-device storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Known-devices file; the platform data directory when unset.
    #[serde(default)]
    pub known_devices: Option<PathBuf>,
}

impl AppConfig {
    /// Get config file path in the platform config directory.
    pub fn default_path() -> PathBuf {
        project_dirs()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Attempt to load config with detailed result.
    pub fn try_load(path: &Path) -> ConfigLoadResult {
        if !path.exists() {
            return ConfigLoadResult::Missing;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<AppConfig>(&content) {
                Ok(config) => match config.validate() {
                    Ok(()) => ConfigLoadResult::Loaded(config),
                    Err(e) => ConfigLoadResult::Invalid(e),
                },
                Err(e) => ConfigLoadResult::Invalid(ConfigError::Parse(e)),
            },
            Err(e) => ConfigLoadResult::Invalid(ConfigError::Read(e)),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ports = [
            ("SACP port", self.device.sacp_port),
            ("HTTP port", self.device.http_port),
            ("Discovery port", self.discovery.port),
        ];
        for (name, port) in ports {
            if port == 0 {
                return Err(ConfigError::Validation(format!("{name} must be greater than 0")));
            }
        }

        let durations = [
            ("Connect timeout", self.device.connect_timeout_secs),
            ("Ping timeout", self.device.ping_timeout_ms),
            ("SACP read timeout", self.sacp.read_timeout_secs),
            ("HTTP request timeout", self.http.request_timeout_secs),
            ("HTTP upload timeout", self.http.upload_timeout_secs),
            ("HTTP poll interval", self.http.poll_interval_ms),
            ("HTTP heartbeat interval", self.http.heartbeat_interval_ms),
            ("Discovery timeout", self.discovery.timeout_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be greater than 0")));
            }
        }

        if self.sacp.client_name.trim().is_empty() {
            return Err(ConfigError::Validation("SACP client name cannot be empty".to_string()));
        }
        if self.sacp.client_name.len() > usize::from(u16::MAX) {
            return Err(ConfigError::Validation("SACP client name is too long".to_string()));
        }
        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl DeviceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

impl SacpConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl DiscoveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl StorageConfig {
    /// Resolved known-devices file path.
    pub fn known_devices_path(&self) -> PathBuf {
        self.known_devices.clone().unwrap_or_else(|| {
            project_dirs()
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
                .join("devices.toml")
        })
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sacp_port: default_sacp_port(),
            http_port: default_http_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            ping_timeout_ms: default_ping_timeout_ms(),
        }
    }
}

impl Default for SacpConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            connect_retries: default_connect_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_discovery_port(),
            timeout_ms: default_discovery_timeout_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.device.sacp_port, 8888);
        assert_eq!(config.device.http_port, 8080);
        assert_eq!(config.discovery.port, 20054);
        assert_eq!(config.http.progress_interval(), Duration::from_millis(35));
        assert_eq!(config.http.upload_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str("[http]\npoll_interval_ms = 500\n").unwrap();
        assert_eq!(config.http.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.http.connect_retries, 3);
        assert_eq!(config.sacp.read_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_validation_zero_port() {
        let mut config = AppConfig::default();
        config.device.http_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_duration() {
        let mut config = AppConfig::default();
        config.sacp.read_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_empty_client_name() {
        let mut config = AppConfig::default();
        config.sacp.client_name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_try_load_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert!(matches!(AppConfig::try_load(&path), ConfigLoadResult::Missing));

        std::fs::write(&path, "[device]\nsacp_port = 0\n").unwrap();
        assert!(matches!(
            AppConfig::try_load(&path),
            ConfigLoadResult::Invalid(ConfigError::Validation(_))
        ));

        std::fs::write(&path, "not toml [").unwrap();
        assert!(matches!(
            AppConfig::try_load(&path),
            ConfigLoadResult::Invalid(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.sacp.client_name = "workshop-pc".to_string();
        config.save(&path).unwrap();

        match AppConfig::try_load(&path) {
            ConfigLoadResult::Loaded(loaded) => assert_eq!(loaded.sacp.client_name, "workshop-pc"),
            other => panic!("expected loaded config, got {other:?}"),
        }
    }
}
