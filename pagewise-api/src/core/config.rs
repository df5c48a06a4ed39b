use config::{Config, ConfigError, Environment, File};
use pagewise_core::{
    ContextWindowConfig, ConversationStoreConfig, EntityConfig, NotificationConfig, SaveConfig,
};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub conversation: ConversationStoreConfig,
    #[serde(default)]
    pub context: ContextWindowConfig,
    #[serde(default)]
    pub entities: EntityConfig,
    #[serde(default)]
    pub save: SaveConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// JSON document used by the file backend
    pub path: String,
    pub quota_bytes: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: "data/pagewise.json".to_string(),
            quota_bytes: None,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8787)?
            .set_default("storage.backend", "memory")?
            .set_default("storage.path", "data/pagewise.json")?
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("PAGEWISE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8787,
            },
            storage: StorageConfig::default(),
            conversation: ConversationStoreConfig::default(),
            context: ContextWindowConfig::default(),
            entities: EntityConfig::default(),
            save: SaveConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}
