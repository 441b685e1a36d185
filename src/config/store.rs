use std::path::Path;
use std::sync::Arc;

use super::AppConfig;
use crate::error::{AppError, Result};

/// Configuration loaded once at startup from an optional JSON file
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config: Arc<AppConfig>,
}

impl ConfigStore {
    /// In-memory store with default configuration
    pub fn in_memory() -> Self {
        Self {
            config: Arc::new(AppConfig::default()),
        }
    }

    /// Load configuration from `path`, writing defaults if the file is absent
    pub async fn load(path: &Path) -> Result<Self> {
        let config = match tokio::fs::read_to_string(path).await {
            Ok(json) => serde_json::from_str::<AppConfig>(&json).map_err(|e| {
                AppError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "Config file {} not found, creating defaults",
                    path.display()
                );
                let config = AppConfig::default();
                Self::save_config_to_file(path, &config).await?;
                config
            }
            Err(e) => return Err(e.into()),
        };

        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    async fn save_config_to_file(path: &Path, config: &AppConfig) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Get current configuration
    pub fn get(&self) -> Arc<AppConfig> {
        self.config.clone()
    }
}
