//! Synthetic market data and analyzer signals
//!
//! Stand-ins for the external price feed and signal analyzer. Both are
//! seeded so a session can be replayed.

use crate::config::{FeedConfig, SignalsConfig};
use paper_trading_core::{EngineError, EngineHandle, PriceMap, SignalAction, Symbol, TradingSignal};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Random-walk price generator
pub struct PriceFeed {
    prices: BTreeMap<Symbol, f64>,
    volatility: f64,
    rng: StdRng,
}

impl PriceFeed {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            prices: config
                .start_prices
                .iter()
                .map(|(symbol, price)| (Symbol::new(symbol.as_str()), *price))
                .collect(),
            volatility: config.volatility,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.prices.keys().cloned().collect()
    }

    /// Current prices without moving them
    pub fn current(&self) -> PriceMap {
        self.prices.iter().map(|(s, p)| (s.clone(), *p)).collect()
    }

    /// Move every price by up to `volatility` in either direction
    pub fn next_tick(&mut self) -> PriceMap {
        for price in self.prices.values_mut() {
            let change = self.rng.gen_range(-self.volatility..=self.volatility);
            *price *= 1.0 + change;
        }
        self.current()
    }
}

/// Random analyzer stand-in
pub struct SignalSource {
    symbols: Vec<Symbol>,
    suggested_size: f64,
    rng: StdRng,
}

impl SignalSource {
    pub fn new(symbols: Vec<Symbol>, config: &SignalsConfig) -> Self {
        Self {
            symbols,
            suggested_size: config.suggested_size,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    pub fn next_signal(&mut self) -> Option<TradingSignal> {
        if self.symbols.is_empty() {
            return None;
        }
        let symbol = self.symbols[self.rng.gen_range(0..self.symbols.len())].clone();
        let confidence = 0.6 + self.rng.gen::<f64>() * 0.3;

        let action = match self.rng.gen_range(0..10) {
            0..=3 => SignalAction::Buy,
            4..=6 => SignalAction::Sell,
            _ => SignalAction::Hold,
        };

        Some(TradingSignal::new(symbol, action, confidence, self.suggested_size))
    }
}

/// Push a tick every `interval` until the engine goes away
pub async fn run_price_feed(handle: EngineHandle, mut feed: PriceFeed, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut ticks: u64 = 0;

    loop {
        ticker.tick().await;
        let prices = if ticks == 0 { feed.current() } else { feed.next_tick() };
        ticks += 1;

        match handle.update_prices(prices).await {
            Ok(()) => debug!(ticks, "📈 Price tick sent"),
            Err(EngineError::EngineStopped) => break,
            Err(e) => warn!("Failed to send price update: {}", e),
        }
    }

    info!(ticks, "Price feed stopped");
}

/// Send a signal every `interval` until the engine goes away
pub async fn run_signal_source(handle: EngineHandle, mut source: SignalSource, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; give the feed a head start
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(signal) = source.next_signal() else {
            break;
        };

        match handle.process_signal(signal.clone()).await {
            Ok(Some(report)) => info!(
                "🧠 {:?} signal for {} ({:.0}% confidence) -> order {} {:?}",
                signal.action,
                signal.symbol,
                signal.confidence * 100.0,
                report.order.id,
                report.order.status
            ),
            Ok(None) => debug!(symbol = %signal.symbol, "Signal produced no order"),
            Err(EngineError::EngineStopped) => break,
            Err(e) => info!(symbol = %signal.symbol, "Signal rejected: {}", e),
        }
    }

    info!("Signal source stopped");
}
