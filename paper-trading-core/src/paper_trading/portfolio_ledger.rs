//! Cash and position bookkeeping for paper trading

use super::errors::PortfolioError;
use super::order_ledger::Order;
use super::risk_gate::RiskSnapshot;
use crate::market::{Side, Symbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Remaining quantity at or below this is treated as a closed position
const DUST_QUANTITY: f64 = 1e-12;

/// Open long position in one symbol
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: Symbol,
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    pub entry_time: DateTime<Utc>,
}

impl Position {
    pub fn new(symbol: Symbol, quantity: f64, entry_price: f64) -> Self {
        Self {
            symbol,
            quantity,
            entry_price,
            current_price: entry_price,
            unrealized_pnl: 0.0,
            entry_time: Utc::now(),
        }
    }

    /// Update unrealized P&L based on current price
    pub fn update_unrealized_pnl(&mut self, current_price: f64) {
        self.current_price = current_price;
        self.unrealized_pnl = self.quantity * (current_price - self.entry_price);
    }

    /// Position value at the last known price
    pub fn market_value(&self) -> f64 {
        self.quantity * self.current_price
    }
}

/// What a fill did to the book
#[derive(Clone, Debug, PartialEq)]
pub enum FillEffect {
    Opened(Position),
    Increased(Position),
    Reduced { position: Position, realized_pnl: f64 },
    Closed { symbol: Symbol, realized_pnl: f64 },
}

impl FillEffect {
    pub fn realized_pnl(&self) -> f64 {
        match self {
            FillEffect::Reduced { realized_pnl, .. } | FillEffect::Closed { realized_pnl, .. } => *realized_pnl,
            _ => 0.0,
        }
    }
}

/// Point-in-time copy of the portfolio
#[derive(Clone, Debug, Serialize)]
pub struct PortfolioSnapshot {
    pub cash: f64,
    pub equity: f64,
    pub peak_equity: f64,
    pub drawdown: f64,
    pub positions: Vec<Position>,
    pub timestamp: DateTime<Utc>,
}

impl PortfolioSnapshot {
    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.iter().find(|p| &p.symbol == symbol)
    }

    pub fn has_position(&self, symbol: &Symbol) -> bool {
        self.position(symbol).is_some_and(|p| p.quantity > 0.0)
    }
}

/// Portfolio ledger: cash balance plus at most one open position per symbol.
///
/// Equity is never stored; it is recomputed from cash and position marks.
#[derive(Debug)]
pub struct PortfolioLedger {
    initial_balance: f64,
    cash: f64,
    positions: BTreeMap<Symbol, Position>,
    peak_equity: f64,
    realized_pnl: f64,
    winning_trades: u64,
    losing_trades: u64,
}

impl PortfolioLedger {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            initial_balance,
            cash: initial_balance,
            positions: BTreeMap::new(),
            peak_equity: initial_balance,
            realized_pnl: 0.0,
            winning_trades: 0,
            losing_trades: 0,
        }
    }

    /// Reinstate positions persisted by an earlier session.
    ///
    /// Cash is not persisted, so each position is paid for out of the current
    /// balance at its entry price. Positions the balance cannot cover are
    /// handed back unrestored.
    pub fn restore(&mut self, positions: impl IntoIterator<Item = Position>) -> Vec<Position> {
        let mut unfunded = Vec::new();
        for position in positions {
            if position.quantity <= DUST_QUANTITY {
                continue;
            }
            let cost = position.quantity * position.entry_price;
            if !cost.is_finite() || cost > self.cash {
                unfunded.push(position);
                continue;
            }
            self.cash -= cost;
            self.positions.insert(position.symbol.clone(), position);
        }
        self.update_peak();
        unfunded
    }

    /// Apply an executed order to cash and positions
    pub fn apply_fill(&mut self, order: &Order, fill_price: f64) -> Result<FillEffect, PortfolioError> {
        let quantity = order.quantity;
        if !(quantity.is_finite() && quantity > 0.0 && fill_price.is_finite() && fill_price > 0.0) {
            return Err(PortfolioError::InvalidFill { quantity, price: fill_price });
        }

        let effect = match order.side {
            Side::Buy => self.apply_buy(&order.symbol, quantity, fill_price)?,
            Side::Sell => self.apply_sell(&order.symbol, quantity, fill_price)?,
        };

        self.update_peak();
        Ok(effect)
    }

    fn apply_buy(&mut self, symbol: &Symbol, quantity: f64, fill_price: f64) -> Result<FillEffect, PortfolioError> {
        let cost = quantity * fill_price;
        if cost > self.cash {
            return Err(PortfolioError::InsufficientCash { symbol: symbol.clone(), cost, cash: self.cash });
        }
        self.cash -= cost;

        match self.positions.get_mut(symbol) {
            Some(position) => {
                let total_quantity = position.quantity + quantity;
                position.entry_price =
                    (position.quantity * position.entry_price + quantity * fill_price) / total_quantity;
                position.quantity = total_quantity;
                position.update_unrealized_pnl(fill_price);
                Ok(FillEffect::Increased(position.clone()))
            }
            None => {
                let position = Position::new(symbol.clone(), quantity, fill_price);
                self.positions.insert(symbol.clone(), position.clone());
                Ok(FillEffect::Opened(position))
            }
        }
    }

    fn apply_sell(&mut self, symbol: &Symbol, quantity: f64, fill_price: f64) -> Result<FillEffect, PortfolioError> {
        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| PortfolioError::NoPosition(symbol.clone()))?;
        if quantity > position.quantity + DUST_QUANTITY {
            return Err(PortfolioError::InsufficientQuantity {
                symbol: symbol.clone(),
                requested: quantity,
                held: position.quantity,
            });
        }

        let realized_pnl = quantity * (fill_price - position.entry_price);
        self.cash += quantity * fill_price;
        self.realized_pnl += realized_pnl;
        if realized_pnl > 0.0 {
            self.winning_trades += 1;
        } else if realized_pnl < 0.0 {
            self.losing_trades += 1;
        }

        position.quantity -= quantity;
        if position.quantity <= DUST_QUANTITY {
            self.positions.remove(symbol);
            return Ok(FillEffect::Closed { symbol: symbol.clone(), realized_pnl });
        }

        position.update_unrealized_pnl(position.current_price);
        Ok(FillEffect::Reduced { position: position.clone(), realized_pnl })
    }

    /// Re-mark one position; returns it if open
    pub fn mark_price(&mut self, symbol: &Symbol, price: f64) -> Option<&Position> {
        let position = self.positions.get_mut(symbol)?;
        position.update_unrealized_pnl(price);
        Some(position)
    }

    /// Raise the peak-equity watermark if equity is at a new high
    pub fn update_peak(&mut self) -> f64 {
        let equity = self.equity();
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        self.peak_equity
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Cash plus mark-to-market of open positions
    pub fn equity(&self) -> f64 {
        self.cash + self.positions.values().map(Position::market_value).sum::<f64>()
    }

    pub fn peak_equity(&self) -> f64 {
        self.peak_equity
    }

    pub fn risk_snapshot(&self) -> RiskSnapshot {
        RiskSnapshot { cash: self.cash, equity: self.equity(), peak_equity: self.peak_equity }
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &Symbol) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.positions.keys().cloned().collect()
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }

    /// Equity change since the initial balance
    pub fn total_pnl(&self) -> f64 {
        self.equity() - self.initial_balance
    }

    pub fn winning_trades(&self) -> u64 {
        self.winning_trades
    }

    pub fn losing_trades(&self) -> u64 {
        self.losing_trades
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        let risk = self.risk_snapshot();
        PortfolioSnapshot {
            cash: risk.cash,
            equity: risk.equity,
            peak_equity: risk.peak_equity,
            drawdown: risk.drawdown(),
            positions: self.positions.values().cloned().collect(),
            timestamp: Utc::now(),
        }
    }
}
