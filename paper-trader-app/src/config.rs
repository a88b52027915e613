//! Application configuration
//!
//! One TOML file drives the whole app. The engine section is the library's
//! [`EngineConfig`]; the rest configures the synthetic feed, the synthetic
//! signal source, storage and logging. Every field has a default.

use anyhow::{bail, Context, Result};
use paper_trading_core::EngineConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "PAPER_TRADER_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Synthetic price feed
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Symbol -> starting price
    pub start_prices: BTreeMap<String, f64>,
    pub interval_ms: u64,
    /// Largest fractional move per tick
    pub volatility: f64,
    pub seed: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            start_prices: BTreeMap::from([
                ("BTC".to_string(), 100_000.0),
                ("ETH".to_string(), 3_000.0),
                ("DOGE".to_string(), 0.15),
            ]),
            interval_ms: 1_000,
            volatility: 0.01,
            seed: 42,
        }
    }
}

/// Synthetic analyzer signals
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    pub interval_ms: u64,
    pub suggested_size: f64,
    pub seed: u64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self { interval_ms: 5_000, suggested_size: 1_000.0, seed: 7 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON-lines journal; no journal when unset
    pub path: Option<PathBuf>,
}

/// Top-level config file structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub feed: FeedConfig,
    pub signals: SignalsConfig,
    pub store: StoreConfig,
    pub log_level: String,
    /// Stop after this many seconds; run until Ctrl-C when unset
    pub run_seconds: Option<u64>,
    pub stats_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            feed: FeedConfig::default(),
            signals: SignalsConfig::default(),
            store: StoreConfig::default(),
            log_level: "info".to_string(),
            run_seconds: None,
            stats_interval_secs: 10,
        }
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// `$PAPER_TRADER_CONFIG` if set, else `config.toml` if present, else defaults.
    pub fn resolve(env_path: Option<PathBuf>) -> Result<(Self, ConfigSource)> {
        if let Some(path) = env_path {
            return Ok((Self::load(&path)?, ConfigSource::File(path)));
        }

        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        if fallback.exists() {
            return Ok((Self::load(fallback)?, ConfigSource::File(fallback.to_path_buf())));
        }

        Ok((Self::default(), ConfigSource::Defaults))
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate().context("Invalid engine section")?;

        if self.feed.start_prices.is_empty() {
            bail!("feed.start_prices must name at least one symbol");
        }
        for (symbol, price) in &self.feed.start_prices {
            if !(price.is_finite() && *price > 0.0) {
                bail!("feed.start_prices.{} must be positive, got {}", symbol, price);
            }
        }
        if !(0.0..1.0).contains(&self.feed.volatility) {
            bail!("feed.volatility must be in [0, 1), got {}", self.feed.volatility);
        }
        if self.feed.interval_ms == 0 || self.signals.interval_ms == 0 {
            bail!("feed.interval_ms and signals.interval_ms must be positive");
        }
        if !(self.signals.suggested_size.is_finite() && self.signals.suggested_size >= 0.0) {
            bail!("signals.suggested_size must not be negative");
        }
        if self.stats_interval_secs == 0 {
            bail!("stats_interval_secs must be positive");
        }
        Ok(())
    }
}
