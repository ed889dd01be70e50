use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_skip_check_interval")]
    pub skip_check_interval_ms: u64,

    /// Delay before advancing after the `ended` signal
    #[serde(default = "default_advance_delay")]
    pub advance_delay_ms: u64,

    /// Delay before advancing after an outro skip
    #[serde(default = "default_outro_advance_delay")]
    pub outro_advance_delay_ms: u64,

    #[serde(default = "default_volume")]
    pub default_volume: f64,

    #[serde(default = "default_rate")]
    pub default_rate: f64,

    #[serde(default = "default_true")]
    pub ad_filter_default: bool,

    #[serde(default = "default_true")]
    pub prefer_best_source: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Local,
    /// High-latency remote store; progress is saved less often
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub kind: StorageKind,

    #[serde(default = "default_local_interval")]
    pub progress_interval_local_secs: u64,

    #[serde(default = "default_remote_interval")]
    pub progress_interval_remote_secs: u64,
}

/// Retry and buffer settings handed to the streaming engine factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_manifest_retries")]
    pub manifest_max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub manifest_retry_delay_ms: u64,

    #[serde(default = "default_manifest_timeout")]
    pub manifest_timeout_ms: u64,

    #[serde(default = "default_fragment_retries")]
    pub fragment_max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub fragment_retry_delay_ms: u64,

    #[serde(default = "default_fragment_timeout")]
    pub fragment_timeout_ms: u64,

    #[serde(default = "default_max_buffer")]
    pub max_buffer_secs: u64,

    #[serde(default = "default_back_buffer")]
    pub back_buffer_secs: u64,

    /// In-place media recoveries before the engine is rebuilt
    #[serde(default = "default_media_recoveries")]
    pub max_media_recoveries: u32,

    /// Reload attempts after fatal network errors before giving up
    #[serde(default = "default_network_recoveries")]
    pub max_network_recoveries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            info!("No config file found, using defaults");
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        info!("Config loaded successfully");
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("vodplay").join("config.toml"))
    }
}

impl PlayerConfig {
    pub fn skip_check_interval(&self) -> Duration {
        Duration::from_millis(self.skip_check_interval_ms)
    }

    pub fn advance_delay(&self) -> Duration {
        Duration::from_millis(self.advance_delay_ms)
    }

    pub fn outro_advance_delay(&self) -> Duration {
        Duration::from_millis(self.outro_advance_delay_ms)
    }
}

impl StorageConfig {
    /// Minimum spacing between interval-triggered progress saves.
    pub fn progress_interval(&self) -> Duration {
        let secs = match self.kind {
            StorageKind::Local => self.progress_interval_local_secs,
            StorageKind::Remote => self.progress_interval_remote_secs,
        };
        Duration::from_secs(secs)
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            skip_check_interval_ms: default_skip_check_interval(),
            advance_delay_ms: default_advance_delay(),
            outro_advance_delay_ms: default_outro_advance_delay(),
            default_volume: default_volume(),
            default_rate: default_rate(),
            ad_filter_default: true,
            prefer_best_source: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::default(),
            progress_interval_local_secs: default_local_interval(),
            progress_interval_remote_secs: default_remote_interval(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            manifest_max_retries: default_manifest_retries(),
            manifest_retry_delay_ms: default_retry_delay(),
            manifest_timeout_ms: default_manifest_timeout(),
            fragment_max_retries: default_fragment_retries(),
            fragment_retry_delay_ms: default_retry_delay(),
            fragment_timeout_ms: default_fragment_timeout(),
            max_buffer_secs: default_max_buffer(),
            back_buffer_secs: default_back_buffer(),
            max_media_recoveries: default_media_recoveries(),
            max_network_recoveries: default_network_recoveries(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_skip_check_interval() -> u64 {
    1500
}

fn default_advance_delay() -> u64 {
    1000
}

fn default_outro_advance_delay() -> u64 {
    500
}

fn default_volume() -> f64 {
    0.7
}

fn default_rate() -> f64 {
    1.0
}

fn default_local_interval() -> u64 {
    5
}

fn default_remote_interval() -> u64 {
    20
}

fn default_manifest_retries() -> u32 {
    4
}

fn default_retry_delay() -> u64 {
    500
}

fn default_manifest_timeout() -> u64 {
    15000
}

fn default_fragment_retries() -> u32 {
    6
}

fn default_fragment_timeout() -> u64 {
    25000
}

fn default_max_buffer() -> u64 {
    120
}

fn default_back_buffer() -> u64 {
    90
}

fn default_media_recoveries() -> u32 {
    1
}

fn default_network_recoveries() -> u32 {
    6
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("vodplay/{}", env!("CARGO_PKG_VERSION"))
}
