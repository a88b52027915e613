//! Paper Trading Application
//!
//! Runs the simulated execution engine against a synthetic price feed and a
//! synthetic signal source, journaling orders and positions when a store path
//! is configured.

mod config;
mod feed;

use anyhow::{Context, Result};
use chrono::Utc;
use config::{AppConfig, ConfigSource, CONFIG_ENV};
use feed::{run_price_feed, run_signal_source, PriceFeed, SignalSource};
use futures_util::future::join_all;
use paper_trading_core::paper_trading::{JsonlStore, NullStore};
use paper_trading_core::{EngineHandle, PaperTrader, TradeStore, TradingStatistics};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, source) = AppConfig::resolve(std::env::var_os(CONFIG_ENV).map(PathBuf::from))?;

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 Starting Paper Trading System");
    match &source {
        ConfigSource::File(path) => info!("📋 Loaded config from {}", path.display()),
        ConfigSource::Defaults => warn!("⚠️ No config file found, using defaults"),
    }

    let store: Arc<dyn TradeStore> = match &config.store.path {
        Some(path) => {
            let store = JsonlStore::open(path)
                .await
                .with_context(|| format!("Failed to open trade journal {}", path.display()))?;
            info!("💾 Journaling trades to {}", path.display());
            Arc::new(store)
        }
        None => Arc::new(NullStore),
    };

    let trader = PaperTrader::start(config.engine.clone(), store)
        .await
        .context("Failed to start paper trading engine")?;
    info!("✅ Paper trading engine started with ${:.2}", config.engine.initial_balance);

    let price_feed = PriceFeed::new(&config.feed);
    let symbols = price_feed.symbols();
    let signal_source = SignalSource::new(symbols.clone(), &config.signals);
    info!("📈 Simulating {} symbols", symbols.len());

    let tasks = vec![
        tokio::spawn(run_price_feed(
            trader.handle(),
            price_feed,
            Duration::from_millis(config.feed.interval_ms),
        )),
        tokio::spawn(run_signal_source(
            trader.handle(),
            signal_source,
            Duration::from_millis(config.signals.interval_ms),
        )),
        tokio::spawn(monitor_portfolio(
            trader.handle(),
            Duration::from_secs(config.stats_interval_secs),
        )),
    ];

    info!("📊 System is running. Press Ctrl+C to stop.");
    let started = Utc::now();

    let run_limit = async {
        match config.run_seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("🛑 Shutdown signal received...");
        }
        _ = run_limit => {
            info!("⏰ Run time reached...");
        }
    }

    // Clean shutdown
    for task in &tasks {
        task.abort();
    }
    join_all(tasks).await;

    let report = trader.stop().await.context("Engine did not shut down cleanly")?;
    let elapsed = Utc::now() - started;
    info!("⏱️ Session ran for {}s", elapsed.num_seconds());
    print_statistics(&report.statistics);
    if report.persistence.failed > 0 {
        warn!("💾 {} storage writes failed", report.persistence.failed);
    }
    if report.persistence.dropped > 0 {
        warn!("💾 {} storage events dropped on a full queue", report.persistence.dropped);
    }

    info!("✅ Paper trading system shutdown complete");
    Ok(())
}

/// Log a one-line summary every `interval`
async fn monitor_portfolio(handle: EngineHandle, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match handle.statistics().await {
            Ok(stats) => info!(
                "💰 Equity ${:.2} | cash ${:.2} | P&L ${:.2} ({:.2}%) | {} open | drawdown {:.2}%",
                stats.equity,
                stats.cash,
                stats.total_pnl,
                stats.total_return_pct,
                stats.open_positions,
                stats.drawdown * 100.0
            ),
            Err(_) => break,
        }
    }
}

fn print_statistics(stats: &TradingStatistics) {
    info!("📊 Final Statistics:");
    info!("  Equity: ${:.2} (peak ${:.2})", stats.equity, stats.peak_equity);
    info!("  Cash: ${:.2}", stats.cash);
    info!(
        "  Total P&L: ${:.2} ({:.2}%), realized ${:.2}, unrealized ${:.2}",
        stats.total_pnl, stats.total_return_pct, stats.realized_pnl, stats.unrealized_pnl
    );
    info!(
        "  Trades: {} won / {} lost, win rate {:.1}%",
        stats.winning_trades, stats.losing_trades, stats.win_rate
    );
    info!(
        "  Orders: {} total, {} filled, {} cancelled, {} pending",
        stats.orders.total_orders,
        stats.orders.filled_orders,
        stats.orders.cancelled_orders,
        stats.orders.pending_orders
    );
    info!(
        "  Signals: {} processed, {} executed, {} risk rejections, {} exits",
        stats.signals_processed, stats.signals_executed, stats.risk_rejections, stats.exits_triggered
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_trading_core::paper_trading::MemoryStore;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_short_synthetic_session() {
        let mut config = AppConfig::default();
        config.engine.execution.rng_seed = Some(1);
        config.feed.interval_ms = 5;
        config.signals.interval_ms = 7;

        let store = Arc::new(MemoryStore::new());
        let trader = assert_ok!(PaperTrader::start(config.engine.clone(), store.clone()).await);

        let feed = PriceFeed::new(&config.feed);
        let signals = SignalSource::new(feed.symbols(), &config.signals);
        let tasks = vec![
            tokio::spawn(run_price_feed(trader.handle(), feed, Duration::from_millis(config.feed.interval_ms))),
            tokio::spawn(run_signal_source(
                trader.handle(),
                signals,
                Duration::from_millis(config.signals.interval_ms),
            )),
        ];

        tokio::time::sleep(Duration::from_millis(300)).await;
        for task in &tasks {
            task.abort();
        }
        join_all(tasks).await;

        let report = assert_ok!(trader.stop().await);
        let stats = report.statistics;
        assert!(stats.signals_processed > 0);
        assert_eq!(report.persistence.failed, 0);
        assert_eq!(report.persistence.dropped, 0);
        assert_eq!(store.order_count() as u64, stats.orders.total_orders);

        let stored_positions = assert_ok!(store.load_open_positions().await);
        assert_eq!(stored_positions.len(), stats.open_positions);
    }
}
