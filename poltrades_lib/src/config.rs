//! Run configuration, loaded from a TOML file and threaded explicitly into
//! the components that need it. Core logic never reads ambient process
//! state.

use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Ingestion mode. Incremental runs apply the cutoff rule; full runs
/// re-walk every page up to the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Full,
    Incremental,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Cutoff for incremental runs. Quote the date in TOML
    /// (`cutoff_date = "2024-01-10"`). When absent, the sync resolves it
    /// from the store's max known trade date.
    #[serde(default)]
    pub cutoff_date: Option<NaiveDate>,
    /// Listing IDs or full listing URLs, one per entity.
    pub entities: Vec<String>,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Substitute price for per-trade ROI when no sample resolves. No
    /// default: missing prices propagate to absent ROI unless set.
    #[serde(default)]
    pub fallback_price: Option<f64>,
}

fn default_max_pages() -> u32 {
    10
}

fn default_db_path() -> String {
    "poltrades.db".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pages < 1 {
            return Err(ConfigError::Invalid("max_pages must be >= 1".into()));
        }
        if self.entities.is_empty() {
            return Err(ConfigError::Invalid(
                "entities must list at least one listing ID or URL".into(),
            ));
        }
        if let Some(price) = self.fallback_price {
            if price <= 0.0 {
                return Err(ConfigError::Invalid(
                    "fallback_price must be positive".into(),
                ));
            }
        }
        Ok(())
    }
}
