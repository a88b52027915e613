//! Paper trading engine
//!
//! [`TradingEngine`] owns every piece of mutable trading state: the order
//! ledger, the portfolio, the execution simulator and the last known prices.
//! All methods are synchronous and take `&mut self`; concurrency is handled one
//! level up by the actor in [`super::actor`], which is the only owner at runtime.
//!
//! Storage calls are never made from here. Each state change queues a
//! [`PersistenceEvent`] that the caller drains with
//! [`TradingEngine::drain_persistence`] once the mutation has completed.

use super::config::EngineConfig;
use super::errors::{EngineError, EngineResult, LedgerError, PortfolioError, RiskViolation};
use super::order_ledger::{Order, OrderId, OrderLedger, OrderRequest, OrderStatistics, OrderStatus, OrderType};
use super::persistence::PersistenceEvent;
use super::portfolio_ledger::{FillEffect, PortfolioLedger, PortfolioSnapshot, Position};
use super::position_monitor::PositionMonitor;
use super::risk_gate::RiskGate;
use super::signal_processor::{SignalProcessor, TradingSignal};
use super::simulator::PaperExecutionSimulator;
use crate::market::{PriceMap, Side, Symbol};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Outcome of an accepted order: its state after the fill attempt and, when
/// it filled, what the fill did to the book.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionReport {
    pub order: Order,
    pub effect: Option<FillEffect>,
}

impl ExecutionReport {
    pub fn order_id(&self) -> &OrderId {
        &self.order.id
    }

    pub fn is_filled(&self) -> bool {
        self.order.status == OrderStatus::Filled
    }
}

/// Paper trading statistics
#[derive(Default, Clone, Debug, Serialize)]
pub struct TradingStatistics {
    pub cash: f64,
    pub equity: f64,
    pub peak_equity: f64,
    pub drawdown: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_pnl: f64,
    pub total_return_pct: f64,
    pub open_positions: usize,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub win_rate: f64,
    pub orders: OrderStatistics,
    pub signals_processed: u64,
    pub signals_executed: u64,
    pub risk_rejections: u64,
    pub exits_triggered: u64,
}

#[derive(Default, Debug)]
struct Counters {
    signals_processed: u64,
    signals_executed: u64,
    risk_rejections: u64,
    exits_triggered: u64,
}

/// Paper trading engine
pub struct TradingEngine {
    config: EngineConfig,
    risk_gate: RiskGate,
    simulator: PaperExecutionSimulator,
    orders: OrderLedger,
    portfolio: PortfolioLedger,
    monitor: PositionMonitor,
    signals: SignalProcessor,
    last_prices: PriceMap,
    counters: Counters,
    outbox: Vec<PersistenceEvent>,
}

impl TradingEngine {
    /// Create a new engine. The config is expected to be validated already.
    pub fn new(config: EngineConfig) -> Self {
        let simulator = PaperExecutionSimulator::new(config.execution.clone());
        Self::with_simulator(config, simulator)
    }

    pub fn with_simulator(config: EngineConfig, simulator: PaperExecutionSimulator) -> Self {
        Self {
            risk_gate: RiskGate::new(config.risk.clone()),
            orders: OrderLedger::new(),
            portfolio: PortfolioLedger::new(config.initial_balance),
            monitor: PositionMonitor::from_limits(&config.risk),
            signals: SignalProcessor::new(config.sizing.clone(), config.risk.max_position_size),
            last_prices: PriceMap::new(),
            counters: Counters::default(),
            outbox: Vec::new(),
            simulator,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reinstate positions left open by an earlier session. Their marks seed
    /// the last known prices.
    pub fn restore_positions(&mut self, positions: Vec<Position>) {
        let unfunded = self.portfolio.restore(positions);
        for position in &unfunded {
            warn!(
                symbol = %position.symbol,
                quantity = position.quantity,
                entry_price = position.entry_price,
                "Not enough cash to restore position, dropping it"
            );
        }

        let restored: Vec<(Symbol, f64)> = self
            .portfolio
            .positions()
            .filter(|p| p.current_price > 0.0)
            .map(|p| (p.symbol.clone(), p.current_price))
            .collect();
        info!(count = restored.len(), cash = self.portfolio.cash(), "Restored open positions");
        self.last_prices.extend(restored);
    }

    /// Place an order and attempt to fill it immediately.
    ///
    /// Rejections are returned as errors and leave no trace in the order
    /// ledger. An accepted order that does not fill (a LIMIT order that is not
    /// marketable yet, or whose symbol has never been priced) rests as PENDING
    /// and is re-evaluated on price updates.
    ///
    /// MARKET orders are checked and filled against the same price: the last
    /// known market price, or the requested price for a symbol never seen.
    pub fn place_order(&mut self, mut request: OrderRequest) -> EngineResult<ExecutionReport> {
        let symbol = request.symbol.clone();
        if !symbol.validate() {
            return Err(EngineError::InvalidSymbol(symbol));
        }
        let market_price = self.last_prices.get(&symbol).copied();

        let reference_price = match request.order_type {
            OrderType::Limit => {
                if !(request.price.is_finite() && request.price > 0.0) {
                    return Err(EngineError::MissingLimitPrice(symbol));
                }
                request.price
            }
            OrderType::Market => market_price
                .or_else(|| (request.price.is_finite() && request.price > 0.0).then_some(request.price))
                .ok_or_else(|| EngineError::NoMarketPrice(symbol.clone()))?,
        };

        match request.side {
            Side::Buy => {
                let snapshot = self.portfolio.risk_snapshot();
                if let Err(violation) =
                    self.risk_gate.authorize(&snapshot, &symbol, request.quantity, reference_price)
                {
                    self.counters.risk_rejections += 1;
                    warn!(%symbol, quantity = request.quantity, reason = %violation, "Order rejected by risk gate");
                    return Err(violation.into());
                }
            }
            Side::Sell => {
                if !request.quantity.is_finite() || request.quantity <= 0.0 {
                    return Err(RiskViolation::InvalidQuantity { quantity: request.quantity }.into());
                }
                let held = self
                    .portfolio
                    .position(&symbol)
                    .map(|p| p.quantity)
                    .ok_or_else(|| PortfolioError::NoPosition(symbol.clone()))?;
                if request.quantity > held {
                    debug!(%symbol, requested = request.quantity, held, "Clamping sell to held quantity");
                    request.quantity = held;
                }
            }
        }

        let id = self.orders.submit(request);
        let order = self
            .orders
            .lookup(&id)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownOrder(id.clone()))?;
        info!(
            order_id = %order.id,
            %symbol,
            side = %order.side,
            quantity = order.quantity,
            order_type = ?order.order_type,
            "Order placed"
        );
        self.outbox.push(PersistenceEvent::InsertOrder { order: order.clone() });

        match (order.order_type, market_price) {
            (OrderType::Limit, None) => {
                debug!(order_id = %order.id, %symbol, "No market price yet, limit order resting");
                Ok(ExecutionReport { order, effect: None })
            }
            (OrderType::Limit, Some(market)) => self.try_fill(order, market),
            (OrderType::Market, _) => self.try_fill(order, reference_price),
        }
    }

    /// Run one fill attempt for a PENDING order against `market_price`
    fn try_fill(&mut self, order: Order, market_price: f64) -> EngineResult<ExecutionReport> {
        let outcome = self.simulator.simulate_fill(&order, market_price);
        if !outcome.filled {
            debug!(order_id = %order.id, market_price, limit = order.price, "Order resting");
            return Ok(ExecutionReport { order, effect: None });
        }

        match self.portfolio.apply_fill(&order, outcome.price) {
            Ok(effect) => {
                let filled = self.orders.mark_filled(&order.id, outcome.price)?;
                info!(
                    order_id = %filled.id,
                    symbol = %filled.symbol,
                    side = %filled.side,
                    quantity = filled.quantity,
                    price = outcome.price,
                    realized_pnl = effect.realized_pnl(),
                    "Order filled"
                );
                self.outbox.push(PersistenceEvent::UpdateOrderStatus {
                    id: filled.id.clone(),
                    status: filled.status,
                    fill_price: filled.fill_price,
                });
                self.outbox.push(match &effect {
                    FillEffect::Opened(position) => PersistenceEvent::InsertPosition { position: position.clone() },
                    FillEffect::Increased(position) | FillEffect::Reduced { position, .. } => {
                        PersistenceEvent::UpdatePosition { position: position.clone() }
                    }
                    FillEffect::Closed { symbol, .. } => PersistenceEvent::RemovePosition { symbol: symbol.clone() },
                });
                Ok(ExecutionReport { order: filled, effect: Some(effect) })
            }
            Err(err) => {
                let cancelled = self.orders.mark_cancelled(&order.id)?;
                warn!(order_id = %cancelled.id, reason = %err, "Fill refused, order cancelled");
                self.outbox.push(PersistenceEvent::UpdateOrderStatus {
                    id: cancelled.id.clone(),
                    status: cancelled.status,
                    fill_price: None,
                });
                Err(match err {
                    PortfolioError::InsufficientCash { cost, cash, .. } => {
                        RiskViolation::InsufficientFunds { required: cost, available: cash }.into()
                    }
                    other => other.into(),
                })
            }
        }
    }

    /// Cancel a PENDING order
    pub fn cancel_order(&mut self, id: &OrderId) -> EngineResult<Order> {
        let cancelled = self.orders.mark_cancelled(id)?;
        info!(order_id = %id, "Order cancelled");
        self.outbox.push(PersistenceEvent::UpdateOrderStatus {
            id: cancelled.id.clone(),
            status: cancelled.status,
            fill_price: None,
        });
        Ok(cancelled)
    }

    /// Handle a market data update: re-mark positions, execute protective
    /// exits, then re-evaluate resting LIMIT orders for the updated symbols.
    ///
    /// Returns every order that filled as a result.
    pub fn on_price_update(&mut self, prices: &PriceMap) -> Vec<ExecutionReport> {
        let mut valid = PriceMap::with_capacity(prices.len());
        for (symbol, &price) in prices {
            if price.is_finite() && price > 0.0 {
                valid.insert(symbol.clone(), price);
            } else {
                warn!(%symbol, price, "Ignoring invalid price update");
            }
        }
        self.last_prices.extend(valid.iter().map(|(s, p)| (s.clone(), *p)));

        let exits = self.monitor.scan(&mut self.portfolio, &valid);
        for symbol in valid.keys() {
            if let Some(position) = self.portfolio.position(symbol) {
                self.outbox.push(PersistenceEvent::UpdatePosition { position: position.clone() });
            }
        }

        let mut reports = Vec::new();
        for exit in exits {
            self.counters.exits_triggered += 1;
            match self.place_order(exit.to_order_request()) {
                Ok(report) => reports.push(report),
                Err(e) => warn!(symbol = %exit.symbol, reason = ?exit.reason, error = %e, "Exit order failed"),
            }
        }

        let mut symbols: Vec<&Symbol> = valid.keys().collect();
        symbols.sort();
        for symbol in symbols {
            let price = valid[symbol];
            for order in self.orders.resting_limits(symbol) {
                let order_id = order.id.clone();
                match self.try_fill(order, price) {
                    Ok(report) if report.is_filled() => reports.push(report),
                    Ok(_) => {}
                    Err(e) => warn!(%order_id, error = %e, "Resting order could not be filled"),
                }
            }
        }

        self.portfolio.update_peak();
        reports
    }

    /// Turn an analyzer signal into at most one order
    pub fn process_signal(&mut self, signal: &TradingSignal) -> EngineResult<Option<ExecutionReport>> {
        self.counters.signals_processed += 1;
        if !signal.symbol.validate() {
            return Err(EngineError::InvalidSymbol(signal.symbol.clone()));
        }
        let reference_price = self.last_prices.get(&signal.symbol).copied();

        let Some(request) = self.signals.process(signal, &self.portfolio, reference_price) else {
            return Ok(None);
        };

        let report = self.place_order(request)?;
        self.counters.signals_executed += 1;
        Ok(Some(report))
    }

    /// Take the storage events queued since the last call
    pub fn drain_persistence(&mut self) -> Vec<PersistenceEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub fn order(&self, id: &OrderId) -> Option<Order> {
        self.orders.lookup(id).cloned()
    }

    pub fn pending_orders(&self) -> Vec<Order> {
        self.orders.pending_orders().cloned().collect()
    }

    pub fn position(&self, symbol: &Symbol) -> Option<Position> {
        self.portfolio.position(symbol).cloned()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.portfolio.positions().cloned().collect()
    }

    pub fn last_price(&self, symbol: &Symbol) -> Option<f64> {
        self.last_prices.get(symbol).copied()
    }

    pub fn portfolio(&self) -> PortfolioSnapshot {
        self.portfolio.snapshot()
    }

    /// Get trading statistics
    pub fn statistics(&self) -> TradingStatistics {
        let snapshot = self.portfolio.risk_snapshot();
        let initial = self.portfolio.initial_balance();
        let total_pnl = self.portfolio.total_pnl();
        let winning_trades = self.portfolio.winning_trades();
        let losing_trades = self.portfolio.losing_trades();
        let closed = winning_trades + losing_trades;

        TradingStatistics {
            cash: snapshot.cash,
            equity: snapshot.equity,
            peak_equity: snapshot.peak_equity,
            drawdown: snapshot.drawdown(),
            realized_pnl: self.portfolio.realized_pnl(),
            unrealized_pnl: self.portfolio.unrealized_pnl(),
            total_pnl,
            total_return_pct: if initial > 0.0 { total_pnl / initial * 100.0 } else { 0.0 },
            open_positions: self.portfolio.positions().count(),
            winning_trades,
            losing_trades,
            win_rate: if closed > 0 { winning_trades as f64 / closed as f64 * 100.0 } else { 0.0 },
            orders: self.orders.get_statistics(),
            signals_processed: self.counters.signals_processed,
            signals_executed: self.counters.signals_executed,
            risk_rejections: self.counters.risk_rejections,
            exits_triggered: self.counters.exits_triggered,
        }
    }
}
