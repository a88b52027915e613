//! Engine actor
//!
//! A single tokio task owns the [`TradingEngine`]. Everything else talks to it
//! through an [`EngineHandle`], which sends commands over a bounded channel.
//! Commands are applied one at a time in arrival order, so no trading state is
//! ever shared or locked.

use super::engine::{ExecutionReport, TradingEngine, TradingStatistics};
use super::errors::{EngineError, EngineResult};
use super::order_ledger::{Order, OrderId, OrderRequest};
use super::persistence::PersistenceSender;
use super::portfolio_ledger::{PortfolioSnapshot, Position};
use super::signal_processor::TradingSignal;
use crate::market::{PriceMap, Symbol};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

type Reply<T> = oneshot::Sender<T>;

/// Messages understood by the engine task
#[derive(Debug)]
enum EngineCommand {
    Signal {
        signal: TradingSignal,
        reply: Option<Reply<EngineResult<Option<ExecutionReport>>>>,
    },
    Prices {
        prices: PriceMap,
        reply: Option<Reply<Vec<ExecutionReport>>>,
    },
    PlaceOrder {
        request: OrderRequest,
        reply: Reply<EngineResult<ExecutionReport>>,
    },
    CancelOrder {
        id: OrderId,
        reply: Reply<EngineResult<Order>>,
    },
    GetOrder {
        id: OrderId,
        reply: Reply<Option<Order>>,
    },
    GetPosition {
        symbol: Symbol,
        reply: Reply<Option<Position>>,
    },
    GetPositions {
        reply: Reply<Vec<Position>>,
    },
    GetPortfolio {
        reply: Reply<PortfolioSnapshot>,
    },
    GetStatistics {
        reply: Reply<TradingStatistics>,
    },
    Shutdown {
        reply: Reply<TradingStatistics>,
    },
}

/// Cloneable handle to a running engine
#[derive(Clone, Debug)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    async fn send(&self, command: EngineCommand) -> EngineResult<()> {
        self.tx.send(command).await.map_err(|_| EngineError::EngineStopped)
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> EngineCommand) -> EngineResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| EngineError::EngineStopped)
    }

    /// Queue a signal without waiting for its outcome
    pub async fn submit_signal(&self, signal: TradingSignal) -> EngineResult<()> {
        self.send(EngineCommand::Signal { signal, reply: None }).await
    }

    /// Process a signal and wait for the resulting order, if any
    pub async fn process_signal(&self, signal: TradingSignal) -> EngineResult<Option<ExecutionReport>> {
        self.request(|reply| EngineCommand::Signal { signal, reply: Some(reply) }).await?
    }

    /// Queue a price update without waiting for it to be applied
    pub async fn update_prices(&self, prices: PriceMap) -> EngineResult<()> {
        self.send(EngineCommand::Prices { prices, reply: None }).await
    }

    /// Apply a price update and wait for the fills it caused
    pub async fn apply_prices(&self, prices: PriceMap) -> EngineResult<Vec<ExecutionReport>> {
        self.request(|reply| EngineCommand::Prices { prices, reply: Some(reply) }).await
    }

    pub async fn place_order(&self, request: OrderRequest) -> EngineResult<ExecutionReport> {
        self.request(|reply| EngineCommand::PlaceOrder { request, reply }).await?
    }

    pub async fn cancel_order(&self, id: OrderId) -> EngineResult<Order> {
        self.request(|reply| EngineCommand::CancelOrder { id, reply }).await?
    }

    pub async fn order(&self, id: OrderId) -> EngineResult<Option<Order>> {
        self.request(|reply| EngineCommand::GetOrder { id, reply }).await
    }

    pub async fn position(&self, symbol: Symbol) -> EngineResult<Option<Position>> {
        self.request(|reply| EngineCommand::GetPosition { symbol, reply }).await
    }

    pub async fn positions(&self) -> EngineResult<Vec<Position>> {
        self.request(|reply| EngineCommand::GetPositions { reply }).await
    }

    pub async fn portfolio(&self) -> EngineResult<PortfolioSnapshot> {
        self.request(|reply| EngineCommand::GetPortfolio { reply }).await
    }

    pub async fn statistics(&self) -> EngineResult<TradingStatistics> {
        self.request(|reply| EngineCommand::GetStatistics { reply }).await
    }

    /// Stop the engine after everything queued ahead of this call.
    /// Returns the final statistics.
    pub async fn shutdown(&self) -> EngineResult<TradingStatistics> {
        self.request(|reply| EngineCommand::Shutdown { reply }).await
    }
}

/// Spawn the engine task.
///
/// Persistence events are forwarded to `persistence` after each command has
/// been applied. The task ends on [`EngineHandle::shutdown`] or when every
/// handle has been dropped, yielding the final statistics.
pub fn spawn_engine(
    engine: TradingEngine,
    persistence: Option<PersistenceSender>,
) -> (EngineHandle, JoinHandle<TradingStatistics>) {
    let (tx, rx) = mpsc::channel(engine.config().command_buffer.max(1));
    let span = info_span!("engine", name = %engine.config().name);
    let task = tokio::spawn(run(engine, rx, persistence).instrument(span));
    (EngineHandle { tx }, task)
}

async fn run(
    mut engine: TradingEngine,
    mut rx: mpsc::Receiver<EngineCommand>,
    persistence: Option<PersistenceSender>,
) -> TradingStatistics {
    info!(initial_balance = engine.config().initial_balance, "🚀 Paper trading engine started");

    while let Some(command) = rx.recv().await {
        let stop = apply(&mut engine, command, persistence.as_ref());
        if stop {
            break;
        }
    }

    let stats = engine.statistics();
    info!(
        equity = stats.equity,
        total_pnl = stats.total_pnl,
        orders = stats.orders.total_orders,
        "🛑 Paper trading engine stopped"
    );
    stats
}

/// Apply one command. Storage events are flushed before the caller is
/// answered. Returns true when the engine should stop.
fn apply(engine: &mut TradingEngine, command: EngineCommand, persistence: Option<&PersistenceSender>) -> bool {
    match command {
        EngineCommand::Signal { signal, reply } => {
            let result = engine.process_signal(&signal);
            if let Err(e) = &result {
                debug!(symbol = %signal.symbol, error = %e, "Signal produced no order");
            }
            flush(engine, persistence);
            respond(reply, result);
        }
        EngineCommand::Prices { prices, reply } => {
            let fills = engine.on_price_update(&prices);
            flush(engine, persistence);
            respond(reply, fills);
        }
        EngineCommand::PlaceOrder { request, reply } => {
            let result = engine.place_order(request);
            flush(engine, persistence);
            let _ = reply.send(result);
        }
        EngineCommand::CancelOrder { id, reply } => {
            let result = engine.cancel_order(&id);
            flush(engine, persistence);
            let _ = reply.send(result);
        }
        EngineCommand::GetOrder { id, reply } => {
            let _ = reply.send(engine.order(&id));
        }
        EngineCommand::GetPosition { symbol, reply } => {
            let _ = reply.send(engine.position(&symbol));
        }
        EngineCommand::GetPositions { reply } => {
            let _ = reply.send(engine.positions());
        }
        EngineCommand::GetPortfolio { reply } => {
            let _ = reply.send(engine.portfolio());
        }
        EngineCommand::GetStatistics { reply } => {
            let _ = reply.send(engine.statistics());
        }
        EngineCommand::Shutdown { reply } => {
            let _ = reply.send(engine.statistics());
            return true;
        }
    }
    false
}

fn respond<T>(reply: Option<Reply<T>>, value: T) {
    if let Some(reply) = reply {
        let _ = reply.send(value);
    }
}

fn flush(engine: &mut TradingEngine, persistence: Option<&PersistenceSender>) {
    let events = engine.drain_persistence();
    let Some(tx) = persistence else {
        return;
    };
    for event in events {
        if !tx.send(event) {
            warn!("Persistence writer has stopped, dropping storage events");
            break;
        }
    }
}
