//! Application Configuration
//!
//! User settings stored in TOML format. Missing sections and fields fall back
//! to their defaults, so a partial file is valid.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::overlay::OverlayConfig;

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Control channel endpoint and credentials
    pub connection: ConnectionSettings,
    /// Indicator appearance
    pub indicator: OverlayConfig,
    /// Monitor change detection
    pub topology: TopologySettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Where to reach OBS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// WebSocket base URL without the port
    pub url: String,
    pub port: u16,
    /// Stored in plain text
    pub password: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost".to_string(),
            port: 4455,
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologySettings {
    /// How often monitors are re-enumerated
    pub poll_interval_ms: u64,
}

impl Default for TopologySettings {
    fn default() -> Self {
        Self { poll_interval_ms: 2000 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log at debug level and honour RUST_LOG
    pub debug: bool,
}

/// Largest indicator edge accepted from the config file
pub const MAX_INDICATOR_SIZE: u32 = 512;

impl AppConfig {
    /// Reject values the rest of the application cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.connection.url.trim().is_empty() {
            bail!("connection.url must not be empty");
        }
        if self.connection.port == 0 {
            bail!("connection.port must be between 1 and 65535");
        }
        if self.indicator.size == 0 || self.indicator.size > MAX_INDICATOR_SIZE {
            bail!(
                "indicator.size must be between 1 and {}, got {}",
                MAX_INDICATOR_SIZE,
                self.indicator.size
            );
        }
        if !(0.0..=1.0).contains(&self.indicator.opacity) {
            bail!(
                "indicator.opacity must be between 0.0 and 1.0, got {}",
                self.indicator.opacity
            );
        }
        if self.topology.poll_interval_ms == 0 {
            bail!("topology.poll_interval_ms must be greater than 0");
        }
        Ok(())
    }
}

/// Load and validate configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file, creating the parent directory if needed
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
