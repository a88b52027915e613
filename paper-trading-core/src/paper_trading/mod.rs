//! Paper trading: simulated execution, risk checks and portfolio accounting

pub mod actor;
pub mod config;
pub mod engine;
pub mod errors;
pub mod order_ledger;
pub mod persistence;
pub mod portfolio_ledger;
pub mod position_monitor;
pub mod risk_gate;
pub mod signal_processor;
pub mod simulator;

pub use actor::{spawn_engine, EngineHandle};
pub use config::{EngineConfig, RiskLimits, SimulatorConfig, SizingConfig, TradingMode};
pub use engine::{ExecutionReport, TradingEngine, TradingStatistics};
pub use errors::{
    ConfigError, EngineError, EngineResult, LedgerError, PersistenceError, PortfolioError, RiskViolation,
};
pub use order_ledger::{Order, OrderId, OrderLedger, OrderRequest, OrderStatistics, OrderStatus, OrderType};
pub use persistence::{
    spawn_writer, JsonlStore, MemoryStore, NullStore, PersistenceEvent, PersistenceSender, TradeStore, WriterStats,
};
pub use portfolio_ledger::{FillEffect, PortfolioLedger, PortfolioSnapshot, Position};
pub use position_monitor::{ExitReason, ExitRequest, PositionMonitor};
pub use risk_gate::{RiskGate, RiskSnapshot};
pub use signal_processor::{SignalAction, SignalProcessor, TradingSignal};
pub use simulator::{FillOutcome, PaperExecutionSimulator};
