//! Configuration infrastructure
//!
//! Configuration is organized into three sections:
//! 1. `api` - where the status endpoint lives and how to talk to it
//! 2. `monitor` - timer periods and failure thresholds
//! 3. `logging` - subscriber setup
//!
//! Values come from an optional JSON file layered with `TRANSFER_MONITOR__*`
//! environment variables (e.g. `TRANSFER_MONITOR__MONITOR__POLL_INTERVAL_MS=250`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::info;

pub const ENV_PREFIX: &str = "TRANSFER_MONITOR";
const CONFIG_FILE_NAME: &str = "config.json";
const APP_DIR_NAME: &str = "transfer-monitor";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(ConfigError::Validation {
                message: format!("api.base_url is not a valid URL: {}", self.api.base_url),
            });
        }
        if self.api.request_timeout_seconds == 0 {
            return Err(ConfigError::Validation {
                message: "api.request_timeout_seconds must be greater than 0".to_string(),
            });
        }
        self.monitor.validate()
    }
}

/// Status endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Root of the download service, e.g. `http://localhost:8000`
    pub base_url: String,
    pub request_timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_seconds: 30,
            user_agent: format!("transfer-monitor/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Timer periods and thresholds for the Poller and the Watchdog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    pub watchdog_interval_ms: u64,
    /// No successful poll for longer than this makes the Watchdog probe
    pub watchdog_stall_threshold_ms: u64,
    /// Age of `last_update` after which an active file is badged as stalled
    pub file_stall_threshold_secs: u64,
    /// Consecutive failed polls that end monitoring
    pub max_consecutive_errors: u32,
    /// Stop after this many inactive polls if the job never became active (0 = never)
    pub idle_poll_limit: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            watchdog_interval_ms: 5_000,
            watchdog_stall_threshold_ms: 10_000,
            file_stall_threshold_secs: 10,
            max_consecutive_errors: 5,
            idle_poll_limit: 0,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn watchdog_stall_threshold(&self) -> Duration {
        Duration::from_millis(self.watchdog_stall_threshold_ms)
    }

    pub fn file_stall_threshold(&self) -> Duration {
        Duration::from_secs(self.file_stall_threshold_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 || self.watchdog_interval_ms == 0 {
            return Err(ConfigError::Validation {
                message: "timer periods must be greater than 0".to_string(),
            });
        }
        if self.watchdog_interval_ms < self.poll_interval_ms {
            return Err(ConfigError::Validation {
                message: "watchdog_interval_ms cannot be shorter than poll_interval_ms".to_string(),
            });
        }
        if self.max_consecutive_errors == 0 {
            return Err(ConfigError::Validation {
                message: "max_consecutive_errors must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs (file output only)
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Defaults to `<data_local_dir>/transfer-monitor/logs`
    pub log_dir: Option<PathBuf>,

    /// Number of daily log files to keep
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            max_files: 7,
        }
    }
}

pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(APP_DIR_NAME);

        Ok(data_dir)
    }

    /// Manager for the default per-user config file
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join(CONFIG_FILE_NAME);
        Ok(Self { config_path })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Write defaults on first run, otherwise load what is there
    pub async fn initialize_on_first_run(&self) -> Result<AppConfig> {
        if self.config_path.exists() {
            return self.load_config();
        }

        info!("🎉 First run detected - writing default configuration");
        let default_config = AppConfig::default();
        self.save_config(&default_config).await?;
        Ok(default_config)
    }

    /// Layer the file (if present) with environment overrides and validate
    pub fn load_config(&self) -> Result<AppConfig> {
        let config = Self::load_from(&self.config_path)
            .with_context(|| format!("Failed to load configuration from {:?}", self.config_path))?;
        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(dir) = self.config_path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("Failed to create config directory: {dir:?}"))?;
                info!("📁 Created configuration directory: {:?}", dir);
            }
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .with_context(|| format!("Failed to write configuration to {:?}", self.config_path))?;

        info!("💾 Configuration saved to: {:?}", self.config_path);
        Ok(())
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}
