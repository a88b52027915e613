//! Engine configuration
//!
//! Every threshold the engine enforces comes from here; nothing is hardcoded
//! in the components themselves. Loads from TOML, every field has a default.

use super::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Execution mode. Only paper trading is implemented.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    #[default]
    Paper,
    Live,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Paper => write!(f, "paper"),
            TradingMode::Live => write!(f, "live"),
        }
    }
}

/// Risk limits configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    pub max_position_size: f64, // notional, currency units
    pub max_drawdown: f64,      // fraction of peak equity
    pub stop_loss_pct: f64,     // fraction of entry price
    pub take_profit_pct: f64,   // fraction of entry price
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size: 5000.0,
            max_drawdown: 0.20,
            stop_loss_pct: 0.02,
            take_profit_pct: 0.05,
        }
    }
}

/// Market friction model for simulated fills
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub slippage_rate: f64,
    pub spread_rate: f64,
    pub fill_probability: f64,
    /// Seed for the fill generator. `None` seeds from OS entropy.
    pub rng_seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            slippage_rate: 0.001,
            spread_rate: 0.0005,
            fill_probability: 0.95,
            rng_seed: None,
        }
    }
}

/// Signal sizing parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Share of cash a single entry may consume
    pub cash_utilization: f64,
    /// Entries at or below this notional are discarded
    pub min_order_notional: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            cash_utilization: 0.95,
            min_order_notional: 1.0,
        }
    }
}

/// Paper trading engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    pub trading_mode: TradingMode,
    pub initial_balance: f64,
    pub risk: RiskLimits,
    pub execution: SimulatorConfig,
    pub sizing: SizingConfig,
    /// Capacity of the engine command queue
    pub command_buffer: usize,
    /// Capacity of the storage event queue; overflow is dropped and counted
    pub persistence_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "paper".to_string(),
            trading_mode: TradingMode::Paper,
            initial_balance: 10_000.0,
            risk: RiskLimits::default(),
            execution: SimulatorConfig::default(),
            sizing: SizingConfig::default(),
            command_buffer: 1024,
            persistence_buffer: 4096,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.execution.rng_seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trading_mode != TradingMode::Paper {
            return Err(ConfigError::UnsupportedMode(self.trading_mode.to_string()));
        }
        positive("initial_balance", self.initial_balance)?;
        positive("risk.max_position_size", self.risk.max_position_size)?;
        positive("risk.max_drawdown", self.risk.max_drawdown)?;
        positive("risk.stop_loss_pct", self.risk.stop_loss_pct)?;
        positive("risk.take_profit_pct", self.risk.take_profit_pct)?;
        non_negative("execution.slippage_rate", self.execution.slippage_rate)?;
        non_negative("execution.spread_rate", self.execution.spread_rate)?;
        unit_interval("execution.fill_probability", self.execution.fill_probability)?;
        unit_interval("sizing.cash_utilization", self.sizing.cash_utilization)?;
        non_negative("sizing.min_order_notional", self.sizing.min_order_notional)?;
        at_least_one("command_buffer", self.command_buffer)?;
        at_least_one("persistence_buffer", self.persistence_buffer)?;
        Ok(())
    }
}

fn at_least_one(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value >= 1 {
        Ok(())
    } else {
        Err(ConfigError::Invalid { field, reason: "must be at least 1".to_string() })
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid { field, reason: format!("{} must be positive", value) })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid { field, reason: format!("{} must not be negative", value) })
    }
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid { field, reason: format!("{} is outside [0, 1]", value) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_balance, 10_000.0);
        assert_eq!(config.risk.max_position_size, 5000.0);
        assert_eq!(config.execution.fill_probability, 0.95);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            initial_balance = 25000.0

            [risk]
            stop_loss_pct = 0.03

            [execution]
            rng_seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.initial_balance, 25_000.0);
        assert_eq!(config.risk.stop_loss_pct, 0.03);
        assert_eq!(config.risk.take_profit_pct, 0.05);
        assert_eq!(config.execution.rng_seed, Some(7));
        assert_eq!(config.execution.slippage_rate, 0.001);
    }

    #[test]
    fn test_live_mode_rejected() {
        let err = EngineConfig::from_toml_str("trading_mode = \"live\"").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedMode(mode) if mode == "live"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EngineConfig::from_toml_str("[execution]\nfill_probability = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "execution.fill_probability", .. }));

        let mut config = EngineConfig::default();
        config.initial_balance = 0.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.execution.slippage_rate = -0.1;
        assert!(config.validate().is_err());

        let err = EngineConfig::from_toml_str("persistence_buffer = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "persistence_buffer", .. }));
    }

    #[test]
    fn test_malformed_toml() {
        let err = EngineConfig::from_toml_str("initial_balance = \"lots\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
