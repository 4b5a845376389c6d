use crate::core::matcher::DEFAULT_SIMILARITY_THRESHOLD;
use crate::core::orchestrator::DEFAULT_LOOKUP_CONCURRENCY;
use crate::core::resolver::SchemaKind;
use anyhow::{Context, Result, bail, ensure};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

fn default_currency() -> String {
    "USD".to_string()
}

fn default_rate_ttl() -> u64 {
    86_400
}

fn default_feed_timeout() -> u64 {
    30
}

fn default_overall_timeout() -> u64 {
    300
}

fn default_lookup_concurrency() -> usize {
    DEFAULT_LOOKUP_CONCURRENCY
}

fn default_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RatesConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Seconds a rate snapshot stays fresh; 0 refetches on every use.
    #[serde(default = "default_rate_ttl")]
    pub ttl_secs: u64,
}

impl Default for RatesConfig {
    fn default() -> Self {
        RatesConfig {
            base_url: "https://open.er-api.com/v6".to_string(),
            api_key: None,
            ttl_secs: default_rate_ttl(),
        }
    }
}

impl RatesConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub schema: SchemaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LookupConfig {
    pub url: String,
    /// Lookups in flight at once, per feed.
    #[serde(default = "default_lookup_concurrency")]
    pub max_concurrent: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AggregationConfig {
    #[serde(default = "default_feed_timeout")]
    pub feed_timeout_secs: u64,
    #[serde(default = "default_overall_timeout")]
    pub overall_timeout_secs: u64,
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_feeds: Option<usize>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        AggregationConfig {
            feed_timeout_secs: default_feed_timeout(),
            overall_timeout_secs: default_overall_timeout(),
            similarity_threshold: default_threshold(),
            max_concurrent_feeds: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup: Option<LookupConfig>,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    /// Feed names, most trusted first.
    #[serde(default)]
    pub source_priority: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("io", "equity-aggregator", "equity-aggregator")
            .context("Could not determine project directories")
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.currency.len() == 3 && self.currency.chars().all(|c| c.is_ascii_alphabetic()),
            "currency must be a three-letter code, got {:?}",
            self.currency
        );

        if let Some(lookup) = &self.lookup {
            ensure!(
                lookup.max_concurrent > 0,
                "lookup.max_concurrent must be at least 1"
            );
        }

        let threshold = self.aggregation.similarity_threshold;
        ensure!(
            (0.0..=1.0).contains(&threshold),
            "similarity_threshold must be between 0 and 1, got {}",
            threshold
        );

        let mut seen = HashSet::new();
        for feed in &self.feeds {
            if feed.name.trim().is_empty() {
                bail!("feed names must not be empty");
            }
            if !seen.insert(feed.name.as_str()) {
                bail!("duplicate feed name {:?}", feed.name);
            }
        }
        Ok(())
    }

    pub fn base_currency(&self) -> String {
        self.currency.to_uppercase()
    }
}
