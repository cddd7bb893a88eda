use crate::error::AppError;
use crate::retry::{RetryConfig, RetrySettings};
use crate::store::{FileStore, KeyValueStore, MemoryStore};
use config::{Config as Cfg, File};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize, Clone)]
pub struct CoreConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// JSON file backing the persistent store. In-memory when unset.
    #[serde(default)]
    pub storage_path: Option<String>,

    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            storage_path: None,
            retry: RetrySettings::default(),
        }
    }
}

impl CoreConfig {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.retry)
    }

    /// Open the configured persistent store.
    pub fn open_store(&self) -> Arc<dyn KeyValueStore> {
        match self.storage_path.as_deref() {
            Some(path) if !path.is_empty() => {
                tracing::info!(path, "Using file-backed store");
                Arc::new(FileStore::new(path))
            }
            _ => {
                tracing::info!("Using in-memory store");
                Arc::new(MemoryStore::new())
            }
        }
    }
}
