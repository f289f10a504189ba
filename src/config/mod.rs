//! Configuration management for cardcache

pub mod schema;

pub use schema::{Config, ImageQuality};

use crate::error::{CardcacheError, CardcacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cardcache")
            .join("config.toml")
    }

    /// Get the default image cache directory
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cardcache")
            .join("images")
    }

    /// Get the default card catalog path
    pub fn default_catalog_path() -> PathBuf {
        dirs::data_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cardcache")
            .join("cards.json")
    }

    /// Image cache directory for `config`
    pub fn cache_dir(config: &Config) -> PathBuf {
        config
            .images
            .cache_dir
            .clone()
            .unwrap_or_else(Self::default_cache_dir)
    }

    /// Card catalog path for `config`
    pub fn catalog_path(config: &Config) -> PathBuf {
        config
            .catalog
            .path
            .clone()
            .unwrap_or_else(Self::default_catalog_path)
    }

    /// Load configuration, falling back to defaults if not present
    pub async fn load(&self) -> CardcacheResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> CardcacheResult<Config> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            CardcacheError::io(format!("reading config from {}", path.display()), e)
        })?;

        toml::from_str(&content).map_err(|e| CardcacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> CardcacheResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            CardcacheError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> CardcacheResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CardcacheError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.images.cache_size_mb, 500);
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.images.cache_size_mb = 64;
        config.images.auto_download = false;

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.images.cache_size_mb, 64);
        assert!(!loaded.images.auto_download);
    }

    #[tokio::test]
    async fn invalid_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[images]\ncache_size_mb = \"lots\"\n").unwrap();

        let err = ConfigManager::with_path(path.clone()).load().await.unwrap_err();
        match err {
            CardcacheError::ConfigInvalid { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn explicit_dirs_override_defaults() {
        let mut config = Config::default();
        config.images.cache_dir = Some(PathBuf::from("/tmp/imgs"));
        config.catalog.path = Some(PathBuf::from("/tmp/cards.json"));

        assert_eq!(ConfigManager::cache_dir(&config), PathBuf::from("/tmp/imgs"));
        assert_eq!(ConfigManager::catalog_path(&config), PathBuf::from("/tmp/cards.json"));
    }
}
