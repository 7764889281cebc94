//! Configuration manager

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use subtimer_core::{
    models::{Config, WarningPolicy},
    storage::ConfigStorage,
    Result as CoreResult,
};

/// Config manager error
#[derive(Debug, thiserror::Error)]
pub enum ConfigManagerError {
    #[error("Storage error: {0}")]
    Storage(#[from] subtimer_core::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigManagerError>;

/// Manages application configuration
pub struct ConfigManager {
    storage: ConfigStorage,
    config: Arc<RwLock<Config>>,
}

impl ConfigManager {
    /// Load the config at `path`, creating a default file if none exists
    pub fn new(path: PathBuf) -> CoreResult<Self> {
        let storage = ConfigStorage::new(path);
        let config = storage.load()?;

        Ok(Self {
            storage,
            config: Arc::new(RwLock::new(config)),
        })
    }

    pub async fn get(&self) -> Config {
        self.config.read().await.clone()
    }

    pub async fn update(&self, config: Config) -> Result<Config> {
        config
            .validate()
            .map_err(|e| ConfigManagerError::Invalid(e.to_string()))?;

        self.storage.save(&config)?;

        {
            let mut current = self.config.write().await;
            *current = config.clone();
        }

        tracing::debug!("Config saved to {}", self.storage.path().display());
        Ok(config)
    }

    pub async fn set_warning_policy(&self, policy: WarningPolicy) -> Result<Config> {
        let mut config = self.get().await;
        config.coordinator.warning = policy;
        self.update(config).await
    }

    pub async fn reset_to_default(&self) -> Result<Config> {
        self.update(Config::default()).await
    }
}
