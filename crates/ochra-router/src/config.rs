//! Router configuration file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Complete router configuration, loaded from `config.toml` in the data
/// directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tunnel: TunnelConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Tunnel datapath tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Reassembly slot lifetime, seconds.
    #[serde(default = "default_slot_expiry_secs")]
    pub slot_expiry_secs: u64,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log file path. Empty = stderr.
    #[serde(default)]
    pub log_file: String,
}

fn default_slot_expiry_secs() -> u64 {
    ochra_onion::reassembler::DEFAULT_SLOT_EXPIRY_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: String::new() }
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            slot_expiry_secs: default_slot_expiry_secs(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: String::new(),
        }
    }
}

impl RouterConfig {
    /// Load configuration from the default config file location, or
    /// fall back to defaults if it does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    fn config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("OCHRA_ROUTER_DATA_DIR") {
            return PathBuf::from(dir).join("config.toml");
        }
        Self::default_data_dir().join("config.toml")
    }

    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("OCHRA_ROUTER_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".ochra-router"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/ochra-router"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RouterConfig::default();
        assert_eq!(config.advanced.log_level, "info");
        assert_eq!(config.tunnel.slot_expiry_secs, 96);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = RouterConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let parsed: RouterConfig = toml::from_str(&toml_str).expect("parse");
        assert_eq!(parsed.tunnel.slot_expiry_secs, config.tunnel.slot_expiry_secs);
    }
}
