//! Paper Trading Library
//!
//! A simulated order-execution and portfolio-risk engine. Price updates and
//! analyzer signals go in; risk-checked orders are filled against a modeled
//! market (slippage, spread, fill probability) and booked into a portfolio
//! with stop-loss / take-profit exits and drawdown control.
//!
//! Can be driven directly through [`TradingEngine`] or, in an async
//! application, through the [`PaperTrader`] facade which runs the engine as a
//! single-owner actor and persists its activity in the background.

pub mod market;
pub mod paper_trading;

// Re-export main types for easy access
pub use market::{PriceMap, Side, Symbol};
pub use paper_trading::{
    EngineConfig, EngineError, EngineHandle, EngineResult, ExecutionReport, Order, OrderId, OrderRequest,
    OrderStatus, OrderType, PortfolioSnapshot, Position, SignalAction, TradeStore, TradingEngine, TradingSignal,
    TradingStatistics, WriterStats,
};

use paper_trading::{spawn_engine, spawn_writer, ConfigError};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Final figures returned by [`PaperTrader::stop`]
#[derive(Clone, Debug, Serialize)]
pub struct ShutdownReport {
    pub statistics: TradingStatistics,
    pub persistence: WriterStats,
}

/// Main interface for running the engine inside an async application
#[derive(Debug)]
pub struct PaperTrader {
    handle: EngineHandle,
    engine_task: JoinHandle<TradingStatistics>,
    writer_task: JoinHandle<WriterStats>,
}

impl PaperTrader {
    /// Validate `config`, restore open positions from `store` and start the
    /// engine and persistence writer tasks.
    pub async fn start(config: EngineConfig, store: Arc<dyn TradeStore>) -> Result<Self, ConfigError> {
        config.validate()?;

        let restored = match store.load_open_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(error = %e, "Could not load open positions, starting flat");
                Vec::new()
            }
        };

        let persistence_buffer = config.persistence_buffer;
        let mut engine = TradingEngine::new(config);
        if !restored.is_empty() {
            engine.restore_positions(restored);
        }

        let (events, writer_task) = spawn_writer(store, persistence_buffer);
        let (handle, engine_task) = spawn_engine(engine, Some(events));
        info!("Paper trader started");

        Ok(Self { handle, engine_task, writer_task })
    }

    /// Cloneable handle for feeds, signal sources and queries
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Process a trading signal from an external prediction engine
    pub async fn process_signal(&self, signal: TradingSignal) -> EngineResult<Option<ExecutionReport>> {
        self.handle.process_signal(signal).await
    }

    /// Get current trading statistics
    pub async fn statistics(&self) -> EngineResult<TradingStatistics> {
        self.handle.statistics().await
    }

    /// Stop the engine, then wait for every queued storage event to be written.
    pub async fn stop(self) -> EngineResult<ShutdownReport> {
        let Self { handle, engine_task, writer_task } = self;

        // Shutdown may fail if every handle was already dropped; the task
        // result carries the final statistics either way.
        if let Err(e) = handle.shutdown().await {
            warn!(error = %e, "Engine was already stopped");
        }
        drop(handle);

        let statistics = engine_task.await.map_err(|_| EngineError::EngineStopped)?;
        let persistence = writer_task.await.map_err(|_| EngineError::EngineStopped)?;
        info!(
            total_pnl = statistics.total_pnl,
            written = persistence.written,
            failed = persistence.failed,
            dropped = persistence.dropped,
            "Paper trader stopped"
        );

        Ok(ShutdownReport { statistics, persistence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper_trading::{JsonlStore, MemoryStore, NullStore, SimulatorConfig, TradingMode};
    use tokio_test::{assert_err, assert_ok};

    fn quiet_config() -> EngineConfig {
        EngineConfig {
            execution: SimulatorConfig {
                slippage_rate: 0.0,
                spread_rate: 0.0,
                fill_probability: 1.0,
                rng_seed: Some(3),
            },
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_paper_trader_creation() {
        let trader = assert_ok!(PaperTrader::start(EngineConfig::default(), Arc::new(NullStore)).await);

        // Should be able to get initial statistics
        let stats = assert_ok!(trader.statistics().await);
        assert_eq!(stats.cash, 10_000.0);
        assert_eq!(stats.equity, 10_000.0);

        let report = assert_ok!(trader.stop().await);
        assert_eq!(report.persistence.written, 0);
    }

    #[tokio::test]
    async fn test_small_persistence_buffer_drops_overflow() {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig { persistence_buffer: 1, ..quiet_config() };
        let trader = assert_ok!(PaperTrader::start(config, store.clone()).await);
        let handle = trader.handle();

        assert_ok!(handle.apply_prices(PriceMap::from([(Symbol::new("SOL"), 150.0)])).await);
        // Insert, fill and open position are queued together; one fits
        let report = assert_ok!(handle.place_order(OrderRequest::market(Symbol::new("SOL"), Side::Buy, 2.0)).await);
        assert!(report.is_filled());

        let shutdown = assert_ok!(trader.stop().await);
        assert_eq!(shutdown.statistics.open_positions, 1);
        assert_eq!(shutdown.persistence.written + shutdown.persistence.dropped, 3);
        assert!(shutdown.persistence.dropped >= 1);
    }

    #[tokio::test]
    async fn test_live_mode_rejected() {
        let config = EngineConfig { trading_mode: TradingMode::Live, ..EngineConfig::default() };
        let err = assert_err!(PaperTrader::start(config, Arc::new(NullStore)).await);
        assert!(matches!(err, ConfigError::UnsupportedMode(_)));
    }

    #[tokio::test]
    async fn test_stop_drains_persistence() {
        let store = Arc::new(MemoryStore::new());
        let trader = assert_ok!(PaperTrader::start(quiet_config(), store.clone()).await);
        let handle = trader.handle();

        assert_ok!(handle.update_prices(PriceMap::from([(Symbol::new("SOL"), 150.0)])).await);
        let report = assert_ok!(
            trader
                .process_signal(TradingSignal::new(Symbol::new("SOL"), SignalAction::Buy, 0.5, 3_000.0))
                .await
        )
        .unwrap();
        assert!(report.is_filled());

        let shutdown = assert_ok!(trader.stop().await);
        assert_eq!(shutdown.statistics.signals_executed, 1);
        assert_eq!(shutdown.persistence.failed, 0);
        assert_eq!(shutdown.persistence.dropped, 0);
        assert_eq!(shutdown.persistence.written, 3);

        let stored = store.order(report.order_id()).unwrap();
        assert_eq!(stored.status, OrderStatus::Filled);
        assert_eq!(store.position(&Symbol::new("SOL")).unwrap().quantity, 10.0);
    }

    #[tokio::test]
    async fn test_positions_survive_restart() {
        let path = std::env::temp_dir().join(format!("paper-trader-restart-{}.jsonl", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let store = Arc::new(assert_ok!(JsonlStore::open(&path).await));
        let trader = assert_ok!(PaperTrader::start(quiet_config(), store).await);
        let handle = trader.handle();
        assert_ok!(handle.apply_prices(PriceMap::from([(Symbol::new("ETH"), 2_000.0)])).await);
        assert_ok!(handle.place_order(OrderRequest::market(Symbol::new("ETH"), Side::Buy, 1.5)).await);
        assert_ok!(handle.apply_prices(PriceMap::from([(Symbol::new("ETH"), 2_040.0)])).await);
        assert_ok!(trader.stop().await);

        let store = Arc::new(assert_ok!(JsonlStore::open(&path).await));
        let trader = assert_ok!(PaperTrader::start(quiet_config(), store).await);
        let position = assert_ok!(trader.handle().position(Symbol::new("ETH")).await).unwrap();
        assert_eq!(position.quantity, 1.5);
        assert_eq!(position.entry_price, 2_000.0);
        assert_eq!(position.current_price, 2_040.0);

        // The restored position is paid for out of the fresh balance
        let stats = assert_ok!(trader.statistics().await);
        assert!((stats.cash - 7_000.0).abs() < 1e-9);
        assert!((stats.equity - 10_060.0).abs() < 1e-9);
        assert!((stats.peak_equity - 10_060.0).abs() < 1e-9);

        // Restored marks price the exit without a fresh update
        let exit = assert_ok!(
            trader
                .handle()
                .place_order(OrderRequest::market(Symbol::new("ETH"), Side::Sell, 1.5))
                .await
        );
        assert!((exit.effect.unwrap().realized_pnl() - 60.0).abs() < 1e-9);
        assert_ok!(trader.stop().await);

        let _ = std::fs::remove_file(&path);
    }
}
