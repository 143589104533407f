//! PullFeed configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PullFeedError, Result};
use crate::publisher::PublisherRegistry;
use crate::types::PublisherId;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PullFeedConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub publishers: PublishersConfig,
}

impl PullFeedConfig {
    /// Load config from the default path (~/.pullfeed/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default().with_env())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PullFeedError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PullFeedError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config.with_env())
    }

    /// Environment variables win over the file.
    fn with_env(mut self) -> Self {
        if let Ok(token) = std::env::var("PULLFEED_DISCORD_TOKEN")
            && !token.is_empty()
        {
            self.discord.token = token;
        }
        if let Ok(url) = std::env::var("PULLFEED_API_URL")
            && !url.is_empty()
        {
            self.catalog.api_url = url;
        }
        self
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the PullFeed home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pullfeed")
    }

    /// Publisher registry for the enabled set.
    pub fn registry(&self) -> Result<PublisherRegistry> {
        let mut ids = Vec::with_capacity(self.publishers.enabled.len());
        for name in &self.publishers.enabled {
            ids.push(name.parse::<PublisherId>()?);
        }
        let registry = PublisherRegistry::with_enabled(&ids);
        if registry.is_empty() {
            return Err(PullFeedError::Config("no publishers enabled".into()));
        }
        Ok(registry)
    }
}

/// Discord bot credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String { "https://discord.com/api/v10".into() }
fn default_http_timeout() -> u64 { 15 }

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: default_api_base(),
            timeout_secs: default_http_timeout(),
        }
    }
}

/// Upstream release catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,
    /// Detail lookups per request.
    #[serde(default = "default_details_chunk")]
    pub details_chunk: usize,
    /// Daily refresh runs `refresh_lead_minutes` before this UTC hour.
    #[serde(default)]
    pub refresh_cutoff_hour: u32,
    #[serde(default = "default_refresh_lead")]
    pub refresh_lead_minutes: u32,
}

fn default_api_url() -> String { "http://localhost:8000".into() }
fn default_catalog_timeout() -> u64 { 60 }
fn default_details_chunk() -> usize { 50 }
fn default_refresh_lead() -> u32 { 30 }

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_catalog_timeout(),
            details_chunk: default_details_chunk(),
            refresh_cutoff_hour: 0,
            refresh_lead_minutes: default_refresh_lead(),
        }
    }
}

/// Feed timer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// UTC time of day feeds fire on their weekday.
    #[serde(default = "default_trigger_hour")]
    pub trigger_hour: u32,
    #[serde(default = "default_trigger_minute")]
    pub trigger_minute: u32,
    /// Gap after a Compact or Summary feed in the same cohort.
    #[serde(default = "default_compact_spacing")]
    pub compact_spacing_ms: u64,
    /// Gap after a Full feed in the same cohort.
    #[serde(default = "default_full_spacing")]
    pub full_spacing_ms: u64,
    /// How often the daemon reconciles timers with the store. 0 disables.
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,
}

fn default_trigger_hour() -> u32 { 1 }
fn default_trigger_minute() -> u32 { 30 }
fn default_compact_spacing() -> u64 { 500 }
fn default_full_spacing() -> u64 { 15_000 }
fn default_resync_interval() -> u64 { 300 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            trigger_hour: default_trigger_hour(),
            trigger_minute: default_trigger_minute(),
            compact_spacing_ms: default_compact_spacing(),
            full_spacing_ms: default_full_spacing(),
            resync_interval_secs: default_resync_interval(),
        }
    }
}

/// SQLite store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.pullfeed/pullfeed.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishersConfig {
    #[serde(default = "default_enabled_publishers")]
    pub enabled: Vec<String>,
}

fn default_enabled_publishers() -> Vec<String> { vec!["MARVEL".into(), "DC".into()] }

impl Default for PublishersConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_publishers(),
        }
    }
}
