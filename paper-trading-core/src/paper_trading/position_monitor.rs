//! Protective exits for open positions

use super::config::RiskLimits;
use super::order_ledger::OrderRequest;
use super::portfolio_ledger::PortfolioLedger;
use crate::market::{PriceMap, Side, Symbol};
use serde::Serialize;
use tracing::{info, warn};

/// Why an exit was requested
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

/// Request to close a whole position at market
#[derive(Clone, Debug, PartialEq)]
pub struct ExitRequest {
    pub symbol: Symbol,
    pub quantity: f64,
    pub trigger_price: f64,
    pub reason: ExitReason,
}

impl ExitRequest {
    pub fn to_order_request(&self) -> OrderRequest {
        OrderRequest::market(self.symbol.clone(), Side::Sell, self.quantity)
    }
}

/// Position monitor
#[derive(Clone, Debug)]
pub struct PositionMonitor {
    stop_loss_pct: f64,
    take_profit_pct: f64,
}

impl PositionMonitor {
    pub fn new(stop_loss_pct: f64, take_profit_pct: f64) -> Self {
        Self { stop_loss_pct, take_profit_pct }
    }

    pub fn from_limits(limits: &RiskLimits) -> Self {
        Self::new(limits.stop_loss_pct, limits.take_profit_pct)
    }

    /// Re-mark every open position that has a price in `current_prices` and
    /// collect exits. At most one exit per position; stop-loss is checked first.
    pub fn scan(&self, portfolio: &mut PortfolioLedger, current_prices: &PriceMap) -> Vec<ExitRequest> {
        let mut exits = Vec::new();

        for symbol in portfolio.symbols() {
            let Some(&price) = current_prices.get(&symbol) else {
                continue;
            };
            if !price.is_finite() || price <= 0.0 {
                warn!(%symbol, price, "Ignoring invalid price update");
                continue;
            }

            let Some(position) = portfolio.mark_price(&symbol, price) else {
                continue;
            };
            if position.entry_price <= 0.0 {
                continue;
            }

            let loss_pct = (position.entry_price - price) / position.entry_price;
            let profit_pct = (price - position.entry_price) / position.entry_price;

            let reason = if loss_pct >= self.stop_loss_pct {
                Some(ExitReason::StopLoss)
            } else if profit_pct >= self.take_profit_pct {
                Some(ExitReason::TakeProfit)
            } else {
                None
            };

            if let Some(reason) = reason {
                info!(
                    %symbol,
                    ?reason,
                    entry = position.entry_price,
                    price,
                    quantity = position.quantity,
                    "Exit triggered"
                );
                exits.push(ExitRequest {
                    symbol: symbol.clone(),
                    quantity: position.quantity,
                    trigger_price: price,
                    reason,
                });
            }
        }

        exits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper_trading::portfolio_ledger::Position;

    fn portfolio_with(symbol: &str, quantity: f64, entry: f64) -> PortfolioLedger {
        let mut portfolio = PortfolioLedger::new(10_000.0);
        portfolio.restore(vec![Position::new(Symbol::new(symbol), quantity, entry)]);
        portfolio
    }

    fn prices(symbol: &str, price: f64) -> PriceMap {
        PriceMap::from([(Symbol::new(symbol), price)])
    }

    #[test]
    fn test_stop_loss_threshold() {
        let monitor = PositionMonitor::new(0.02, 0.05);

        let mut portfolio = portfolio_with("BTC", 1.0, 100.0);
        let exits = monitor.scan(&mut portfolio, &prices("BTC", 97.9));
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].reason, ExitReason::StopLoss);
        assert_eq!(exits[0].quantity, 1.0);
        assert_eq!(exits[0].to_order_request().side, Side::Sell);

        let mut portfolio = portfolio_with("BTC", 1.0, 100.0);
        assert!(monitor.scan(&mut portfolio, &prices("BTC", 98.1)).is_empty());
    }

    #[test]
    fn test_take_profit_threshold() {
        let monitor = PositionMonitor::new(0.02, 0.05);
        let mut portfolio = portfolio_with("BTC", 0.01, 100_000.0);

        assert!(monitor.scan(&mut portfolio, &prices("BTC", 103_000.0)).is_empty());
        let position = portfolio.position(&Symbol::new("BTC")).unwrap();
        assert!((position.unrealized_pnl - 30.0).abs() < 1e-9);
        assert_eq!(position.current_price, 103_000.0);

        let exits = monitor.scan(&mut portfolio, &prices("BTC", 105_100.0));
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].reason, ExitReason::TakeProfit);
        assert_eq!(exits[0].trigger_price, 105_100.0);
    }

    #[test]
    fn test_stop_loss_checked_first() {
        // Degenerate thresholds make both conditions hold at entry
        let monitor = PositionMonitor::new(0.0, 0.0);
        let mut portfolio = portfolio_with("ETH", 2.0, 3_000.0);

        let exits = monitor.scan(&mut portfolio, &prices("ETH", 3_000.0));
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_unpriced_and_invalid_prices_skipped() {
        let monitor = PositionMonitor::new(0.02, 0.05);
        let mut portfolio = portfolio_with("ETH", 2.0, 3_000.0);

        assert!(monitor.scan(&mut portfolio, &prices("BTC", 1.0)).is_empty());
        assert!(monitor.scan(&mut portfolio, &prices("ETH", -5.0)).is_empty());
        assert_eq!(portfolio.position(&Symbol::new("ETH")).unwrap().current_price, 3_000.0);
    }
}
