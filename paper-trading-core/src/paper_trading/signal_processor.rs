//! Turns analyzer signals into order requests

use super::config::SizingConfig;
use super::order_ledger::OrderRequest;
use super::portfolio_ledger::PortfolioLedger;
use crate::market::{Side, Symbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Signal action
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

/// Trading signal from the external analyzer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TradingSignal {
    pub symbol: Symbol,
    pub confidence: f64,
    pub action: SignalAction,
    /// Suggested notional, in currency units
    pub suggested_position_size: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl TradingSignal {
    pub fn new(symbol: Symbol, action: SignalAction, confidence: f64, suggested_position_size: f64) -> Self {
        Self { symbol, confidence, action, suggested_position_size, timestamp: Utc::now() }
    }

    /// Parse one analyzer message
    pub fn from_json(message: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(message)
    }
}

/// Signal processor: sizing and direction, no pyramiding, no shorting
#[derive(Clone, Debug)]
pub struct SignalProcessor {
    sizing: SizingConfig,
    max_position_size: f64,
}

impl SignalProcessor {
    pub fn new(sizing: SizingConfig, max_position_size: f64) -> Self {
        Self { sizing, max_position_size }
    }

    /// Notional to commit for a BUY signal
    pub fn position_size(&self, signal: &TradingSignal, cash: f64) -> f64 {
        let adjusted = signal.suggested_position_size * signal.confidence;
        adjusted
            .min(cash * self.sizing.cash_utilization)
            .min(self.max_position_size)
    }

    /// Decide what, if anything, to order for `signal`.
    ///
    /// `reference_price` is the latest market price for the signal's symbol;
    /// BUY quantities are derived from it.
    pub fn process(
        &self,
        signal: &TradingSignal,
        portfolio: &PortfolioLedger,
        reference_price: Option<f64>,
    ) -> Option<OrderRequest> {
        let symbol = &signal.symbol;
        match signal.action {
            SignalAction::Hold => {
                debug!(%symbol, "Holding");
                None
            }
            SignalAction::Buy if portfolio.has_position(symbol) => {
                debug!(%symbol, "Already holding a position, not adding");
                None
            }
            SignalAction::Buy => {
                if !(0.0..=1.0).contains(&signal.confidence) {
                    info!(%symbol, confidence = signal.confidence, "Confidence out of range, skipping signal");
                    return None;
                }
                let Some(price) = reference_price.filter(|p| p.is_finite() && *p > 0.0) else {
                    info!(%symbol, "No reference price, skipping signal");
                    return None;
                };

                let size = self.position_size(signal, portfolio.cash());
                if !(size > self.sizing.min_order_notional) {
                    info!(%symbol, size, "Position size too small, skipping signal");
                    return None;
                }

                Some(OrderRequest::market(symbol.clone(), Side::Buy, size / price))
            }
            SignalAction::Sell => match portfolio.position(symbol) {
                Some(position) => Some(OrderRequest::market(symbol.clone(), Side::Sell, position.quantity)),
                None => {
                    debug!(%symbol, "No position to sell");
                    None
                }
            },
        }
    }
}
