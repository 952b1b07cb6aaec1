//! Configuration management for Shopcast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub shop: ShopConfig,
    #[serde(default)]
    pub instagram: InstagramConfig,
    #[serde(default)]
    pub facebook: FacebookConfig,
    #[serde(default)]
    pub pinterest: PinterestConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub repost: RepostConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopConfig {
    /// Root for product deep links (`{base_url}/products/{slug}`)
    pub base_url: String,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            base_url: "https://shop.example.com".to_string(),
        }
    }
}

impl ShopConfig {
    pub fn product_link(&self, slug: &str) -> String {
        format!("{}/products/{}", self.base_url.trim_end_matches('/'), slug)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagramConfig {
    pub graph_base_url: String,
    /// Instagram business account id, used when the stored token has none
    pub account_id: Option<String>,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            graph_base_url: "https://graph.facebook.com/v19.0".to_string(),
            account_id: None,
            poll_interval_ms: 1000,
            max_poll_attempts: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FacebookConfig {
    pub graph_base_url: String,
    /// Page id, used when the stored token has none
    pub page_id: Option<String>,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            graph_base_url: "https://graph.facebook.com/v19.0".to_string(),
            page_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PinterestConfig {
    pub api_base_url: String,
    pub default_board_id: Option<String>,
}

impl Default for PinterestConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.pinterest.com/v5".to_string(),
            default_board_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Caption service endpoint; generation is unavailable when unset
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the service API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Generated posts start as drafts and need `shop-queue approve`
    pub requires_approval: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: "SHOPCAST_GENERATOR_KEY".to_string(),
            timeout_secs: 60,
            requires_approval: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// How long a claim stays valid, e.g. "10m"
    pub lease: String,
    pub batch_size: u32,
    /// Seconds between polls when shop-send runs as a daemon
    pub poll_interval: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            lease: "10m".to_string(),
            batch_size: 50,
            poll_interval: 60,
        }
    }
}

impl DispatcherConfig {
    pub fn lease_duration(&self) -> Result<Duration> {
        parse_config_duration("dispatcher.lease", &self.lease)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Rows synced more recently than this are skipped, e.g. "6h"
    pub freshness: String,
    /// Only posts published within this window are synced, e.g. "30days"
    pub max_age: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            freshness: "6h".to_string(),
            max_age: "30days".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn freshness_duration(&self) -> Result<Duration> {
        parse_config_duration("sync.freshness", &self.freshness)
    }

    pub fn max_age_duration(&self) -> Result<Duration> {
        parse_config_duration("sync.max_age", &self.max_age)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepostConfig {
    pub min_days_old: u32,
    pub default_tone: String,
}

impl Default for RepostConfig {
    fn default() -> Self {
        Self {
            min_days_old: 30,
            default_tone: "casual".to_string(),
        }
    }
}

fn parse_config_duration(key: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        ConfigError::InvalidSetting {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.dispatcher.lease_duration()?;
        config.sync.freshness_duration()?;
        config.sync.max_age_duration()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/shopcast/posts.db".to_string(),
            },
            shop: ShopConfig::default(),
            instagram: InstagramConfig::default(),
            facebook: FacebookConfig::default(),
            pinterest: PinterestConfig::default(),
            generator: GeneratorConfig::default(),
            dispatcher: DispatcherConfig::default(),
            sync: SyncConfig::default(),
            repost: RepostConfig::default(),
        }
    }

    /// Default configuration pointing at a specific database file
    pub fn with_database(path: &str) -> Self {
        let mut config = Self::default_config();
        config.database.path = path.to_string();
        config
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SHOPCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("shopcast").join("config.toml"))
}
