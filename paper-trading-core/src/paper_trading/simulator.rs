//! Simulated market friction and fill decisions

use super::config::SimulatorConfig;
use super::order_ledger::{Order, OrderType};
use crate::market::Side;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Result of simulating one order against one market price
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FillOutcome {
    pub price: f64,
    pub filled: bool,
}

impl FillOutcome {
    fn filled(price: f64) -> Self {
        Self { price, filled: true }
    }

    fn resting(price: f64) -> Self {
        Self { price, filled: false }
    }
}

/// Paper execution simulator.
///
/// Owns a single random generator for its whole lifetime; seed it through
/// [`SimulatorConfig::rng_seed`] to make limit fills reproducible.
pub struct PaperExecutionSimulator<R = StdRng> {
    config: SimulatorConfig,
    rng: R,
}

impl PaperExecutionSimulator<StdRng> {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }
}

impl<R: Rng> PaperExecutionSimulator<R> {
    pub fn with_rng(config: SimulatorConfig, rng: R) -> Self {
        Self { config, rng }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Price after size-dependent slippage: buyers pay up, sellers receive less
    pub fn apply_slippage(&self, market_price: f64, quantity: f64, side: Side) -> f64 {
        let slip = market_price * self.config.slippage_rate * (1.0 + quantity / 100.0);
        match side {
            Side::Buy => market_price + slip,
            Side::Sell => market_price - slip,
        }
    }

    /// Flat bid/ask markup, applied uniformly to both sides
    pub fn apply_spread(&self, price: f64) -> f64 {
        price * (1.0 + self.config.spread_rate)
    }

    /// Execution price for a market order of this size
    pub fn execution_price(&self, market_price: f64, quantity: f64, side: Side) -> f64 {
        self.apply_spread(self.apply_slippage(market_price, quantity, side))
    }

    /// Decide whether `order` fills against `market_price` this cycle, and at what price.
    ///
    /// Market orders always fill at the friction-adjusted price. Limit orders
    /// fill at their limit price with probability `fill_probability`, and only
    /// while the market is at or through the limit.
    pub fn simulate_fill(&mut self, order: &Order, market_price: f64) -> FillOutcome {
        match order.order_type {
            OrderType::Market => {
                FillOutcome::filled(self.execution_price(market_price, order.quantity, order.side))
            }
            OrderType::Limit => {
                let marketable = match order.side {
                    Side::Buy => order.price >= market_price,
                    Side::Sell => order.price <= market_price,
                };
                if marketable && self.rng.gen::<f64>() < self.config.fill_probability {
                    FillOutcome::filled(order.price)
                } else {
                    FillOutcome::resting(order.price)
                }
            }
        }
    }
}
