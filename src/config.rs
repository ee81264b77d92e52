//! Configuration Management
//!
//! Handles persistent configuration storage for gridcache.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Environment variable naming the network store URL
pub const STORE_URL_ENV: &str = "GRIDCACHE_STORE_URL";

/// Store URL used when nothing else is configured
pub const DEFAULT_STORE_URL: &str = "http://localhost:8080";

/// Preset used when nothing else is configured
pub const DEFAULT_PRELOADING: &str = "none";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Network store base URL
    #[serde(default)]
    pub store_url: Option<String>,
    /// Default preloading preset name
    #[serde(default)]
    pub preloading: Option<String>,
    /// Last network used
    #[serde(default)]
    pub last_network: Option<Uuid>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gridcache").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Get effective store URL (CLI > config > environment > default)
    pub fn effective_store_url(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.store_url.clone())
            .or_else(|| std::env::var(STORE_URL_ENV).ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| DEFAULT_STORE_URL.to_string())
    }

    /// Get effective preloading preset (CLI > config > default)
    pub fn effective_preloading(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.preloading.clone())
            .unwrap_or_else(|| DEFAULT_PRELOADING.to_string())
    }

    /// Get effective network (CLI > last used)
    pub fn effective_network(&self, cli: Option<Uuid>) -> Option<Uuid> {
        cli.or(self.last_network)
    }

    /// Set last network and save
    pub fn set_last_network(&mut self, network_id: Uuid) -> Result<()> {
        if self.last_network == Some(network_id) {
            return Ok(());
        }
        self.last_network = Some(network_id);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_wins_over_config() {
        let config = Config {
            store_url: Some("http://store:9000".to_string()),
            preloading: Some("bus-view".to_string()),
            last_network: None,
        };
        assert_eq!(
            config.effective_store_url(Some("http://cli:1")),
            "http://cli:1"
        );
        assert_eq!(config.effective_store_url(None), "http://store:9000");
        assert_eq!(config.effective_preloading(None), "bus-view");
        assert_eq!(config.effective_preloading(Some("none")), "none");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.effective_preloading(None), DEFAULT_PRELOADING);
        assert_eq!(config.effective_network(None), None);
    }

    #[test]
    fn test_missing_fields_deserialize() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        let network = Uuid::new_v4();
        let config: Config =
            serde_json::from_str(&format!("{{\"last_network\":\"{}\"}}", network)).unwrap();
        assert_eq!(config.effective_network(None), Some(network));
    }
}
