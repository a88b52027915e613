//! Error types for the paper trading engine

use super::order_ledger::{OrderId, OrderStatus};
use crate::market::Symbol;
use thiserror::Error;

/// Pre-trade rejection raised by the risk gate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskViolation {
    #[error("Invalid order quantity: {quantity}")]
    InvalidQuantity { quantity: f64 },

    #[error("Position size ${notional:.2} exceeds limit ${limit:.2}")]
    PositionSizeExceeded { notional: f64, limit: f64 },

    #[error("Insufficient funds: required ${required:.2}, available ${available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Maximum drawdown exceeded: {drawdown:.4} > {limit:.4}")]
    DrawdownExceeded { drawdown: f64, limit: f64 },
}

/// Order lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Unknown order: {0}")]
    UnknownOrder(OrderId),

    #[error("Order {id} is already {status:?}")]
    AlreadyTerminal { id: OrderId, status: OrderStatus },
}

/// Fills the portfolio ledger refused to apply
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
    #[error("Fill for {symbol} costs ${cost:.2} but only ${cash:.2} cash is available")]
    InsufficientCash { symbol: Symbol, cost: f64, cash: f64 },

    #[error("No open position in {0}")]
    NoPosition(Symbol),

    #[error("Cannot sell {requested} {symbol}, only {held} held")]
    InsufficientQuantity { symbol: Symbol, requested: f64, held: f64 },

    #[error("Invalid fill: quantity {quantity}, price {price}")]
    InvalidFill { quantity: f64, price: f64 },
}

/// Storage collaborator failures. Logged, never unwound into trading state.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Trading mode {0} is not supported by the simulated engine")]
    UnsupportedMode(String),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Umbrella error returned from engine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Order rejected by risk gate: {0}")]
    Risk(#[from] RiskViolation),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Portfolio(#[from] PortfolioError),

    #[error("No market price known for {0}")]
    NoMarketPrice(Symbol),

    #[error("Limit order for {0} requires a positive price")]
    MissingLimitPrice(Symbol),

    #[error("Invalid symbol '{0}'")]
    InvalidSymbol(Symbol),

    #[error("Engine has stopped")]
    EngineStopped,
}

impl EngineError {
    /// Whether the caller may simply retry later (e.g. after prices move)
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::EngineStopped | Self::InvalidSymbol(_))
    }

    /// Whether this is a pre-trade risk rejection
    pub fn is_risk_rejection(&self) -> bool {
        matches!(self, Self::Risk(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
