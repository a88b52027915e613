//! Storage collaborator interface
//!
//! The engine never awaits storage. It queues [`PersistenceEvent`]s after each
//! command and a background writer hands them to a [`TradeStore`]. Store
//! failures are logged and counted; they never touch trading state.

use super::errors::PersistenceError;
use super::order_ledger::{Order, OrderId, OrderStatus};
use super::portfolio_ledger::Position;
use crate::market::Symbol;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One storage call, queued by the engine
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PersistenceEvent {
    InsertOrder { order: Order },
    UpdateOrderStatus { id: OrderId, status: OrderStatus, fill_price: Option<f64> },
    InsertPosition { position: Position },
    UpdatePosition { position: Position },
    RemovePosition { symbol: Symbol },
}

/// Engine side of the writer queue. Never blocks: when the queue is full the
/// event is dropped and counted.
#[derive(Clone, Debug)]
pub struct PersistenceSender {
    tx: mpsc::Sender<PersistenceEvent>,
    dropped: Arc<AtomicU64>,
}

impl PersistenceSender {
    /// Queue `event` for the writer. Returns `false` once the writer is gone.
    pub fn send(&self, event: PersistenceEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, ?event, "Persistence queue full, dropping storage event");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Events discarded so far because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Storage backend for orders and positions
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<(), PersistenceError>;

    async fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
        fill_price: Option<f64>,
    ) -> Result<(), PersistenceError>;

    async fn insert_position(&self, position: &Position) -> Result<(), PersistenceError>;

    async fn update_position(&self, position: &Position) -> Result<(), PersistenceError>;

    async fn remove_position(&self, _symbol: &Symbol) -> Result<(), PersistenceError> {
        Ok(())
    }

    /// Positions left open by an earlier session
    async fn load_open_positions(&self) -> Result<Vec<Position>, PersistenceError> {
        Ok(Vec::new())
    }
}

/// Route one event to the matching store call
pub async fn dispatch(store: &dyn TradeStore, event: &PersistenceEvent) -> Result<(), PersistenceError> {
    match event {
        PersistenceEvent::InsertOrder { order } => store.insert_order(order).await,
        PersistenceEvent::UpdateOrderStatus { id, status, fill_price } => {
            store.update_order_status(id, *status, *fill_price).await
        }
        PersistenceEvent::InsertPosition { position } => store.insert_position(position).await,
        PersistenceEvent::UpdatePosition { position } => store.update_position(position).await,
        PersistenceEvent::RemovePosition { symbol } => store.remove_position(symbol).await,
    }
}

/// Totals reported by the writer task when it drains
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    pub written: u64,
    pub failed: u64,
    /// Events the engine discarded because the queue was full
    pub dropped: u64,
}

/// Spawn the background writer with room for `capacity` queued events. It runs
/// until every sender is dropped.
pub fn spawn_writer(store: Arc<dyn TradeStore>, capacity: usize) -> (PersistenceSender, JoinHandle<WriterStats>) {
    let (tx, mut rx) = mpsc::channel::<PersistenceEvent>(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let sender = PersistenceSender { tx, dropped: dropped.clone() };

    let handle = tokio::spawn(async move {
        let mut stats = WriterStats::default();
        while let Some(event) = rx.recv().await {
            match dispatch(store.as_ref(), &event).await {
                Ok(()) => stats.written += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(error = %e, ?event, "Persistence call failed");
                }
            }
        }
        stats.dropped = dropped.load(Ordering::Relaxed);
        debug!(written = stats.written, failed = stats.failed, dropped = stats.dropped, "Persistence writer drained");
        stats
    });

    (sender, handle)
}

/// Store that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

#[async_trait]
impl TradeStore for NullStore {
    async fn insert_order(&self, _order: &Order) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn update_order_status(
        &self,
        _id: &OrderId,
        _status: OrderStatus,
        _fill_price: Option<f64>,
    ) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn insert_position(&self, _position: &Position) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn update_position(&self, _position: &Position) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// In-memory store, safe to read while the writer is running
#[derive(Debug, Default)]
pub struct MemoryStore {
    orders: DashMap<OrderId, Order>,
    positions: DashMap<Symbol, Position>,
    event_log: parking_lot::Mutex<Vec<PersistenceEvent>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::Relaxed);
    }

    fn record(&self, event: PersistenceEvent) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(PersistenceError::Unavailable("memory store is failing writes".to_string()));
        }
        self.event_log.lock().push(event);
        Ok(())
    }

    pub fn order(&self, id: &OrderId) -> Option<Order> {
        self.orders.get(id).map(|o| o.clone())
    }

    pub fn position(&self, symbol: &Symbol) -> Option<Position> {
        self.positions.get(symbol).map(|p| p.clone())
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn events(&self) -> Vec<PersistenceEvent> {
        self.event_log.lock().clone()
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<(), PersistenceError> {
        self.record(PersistenceEvent::InsertOrder { order: order.clone() })?;
        self.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
        fill_price: Option<f64>,
    ) -> Result<(), PersistenceError> {
        self.record(PersistenceEvent::UpdateOrderStatus { id: id.clone(), status, fill_price })?;
        let mut order = self
            .orders
            .get_mut(id)
            .ok_or_else(|| PersistenceError::Unavailable(format!("order {} was never stored", id)))?;
        order.status = status;
        order.fill_price = fill_price;
        Ok(())
    }

    async fn insert_position(&self, position: &Position) -> Result<(), PersistenceError> {
        self.record(PersistenceEvent::InsertPosition { position: position.clone() })?;
        self.positions.insert(position.symbol.clone(), position.clone());
        Ok(())
    }

    async fn update_position(&self, position: &Position) -> Result<(), PersistenceError> {
        self.record(PersistenceEvent::UpdatePosition { position: position.clone() })?;
        self.positions.insert(position.symbol.clone(), position.clone());
        Ok(())
    }

    async fn remove_position(&self, symbol: &Symbol) -> Result<(), PersistenceError> {
        self.record(PersistenceEvent::RemovePosition { symbol: symbol.clone() })?;
        self.positions.remove(symbol);
        Ok(())
    }

    async fn load_open_positions(&self) -> Result<Vec<Position>, PersistenceError> {
        Ok(self.positions.iter().map(|e| e.value().clone()).collect())
    }
}

/// Append-only JSON-lines journal. Open positions are rebuilt by replaying it.
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl JsonlStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, event: PersistenceEvent) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl TradeStore for JsonlStore {
    async fn insert_order(&self, order: &Order) -> Result<(), PersistenceError> {
        self.append(PersistenceEvent::InsertOrder { order: order.clone() }).await
    }

    async fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
        fill_price: Option<f64>,
    ) -> Result<(), PersistenceError> {
        self.append(PersistenceEvent::UpdateOrderStatus { id: id.clone(), status, fill_price }).await
    }

    async fn insert_position(&self, position: &Position) -> Result<(), PersistenceError> {
        self.append(PersistenceEvent::InsertPosition { position: position.clone() }).await
    }

    async fn update_position(&self, position: &Position) -> Result<(), PersistenceError> {
        self.append(PersistenceEvent::UpdatePosition { position: position.clone() }).await
    }

    async fn remove_position(&self, symbol: &Symbol) -> Result<(), PersistenceError> {
        self.append(PersistenceEvent::RemovePosition { symbol: symbol.clone() }).await
    }

    async fn load_open_positions(&self) -> Result<Vec<Position>, PersistenceError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let mut open = BTreeMap::new();

        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: PersistenceEvent = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(e) => {
                    warn!(path = %self.path.display(), line = line_no + 1, error = %e, "Skipping unreadable journal line");
                    continue;
                }
            };
            match event {
                PersistenceEvent::InsertPosition { position } | PersistenceEvent::UpdatePosition { position } => {
                    open.insert(position.symbol.clone(), position);
                }
                PersistenceEvent::RemovePosition { symbol } => {
                    open.remove(&symbol);
                }
                _ => {}
            }
        }

        Ok(open.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Side;
    use crate::paper_trading::order_ledger::{OrderLedger, OrderRequest};
    use tokio_test::{assert_err, assert_ok};

    fn sample_order() -> Order {
        let mut ledger = OrderLedger::new();
        let id = ledger.submit(OrderRequest::market(Symbol::new("BTC"), Side::Buy, 0.01));
        ledger.lookup(&id).unwrap().clone()
    }

    fn temp_journal(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("paper-trading-{}-{}.jsonl", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn test_memory_store_tracks_lifecycle() {
        let store = MemoryStore::new();
        let order = sample_order();

        assert_ok!(store.insert_order(&order).await);
        assert_ok!(store.update_order_status(&order.id, OrderStatus::Filled, Some(100.0)).await);
        let stored = store.order(&order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Filled);
        assert_eq!(stored.fill_price, Some(100.0));

        let position = Position::new(Symbol::new("BTC"), 0.01, 100.0);
        assert_ok!(store.insert_position(&position).await);
        assert_eq!(assert_ok!(store.load_open_positions().await).len(), 1);
        assert_ok!(store.remove_position(&position.symbol).await);
        assert!(store.position(&position.symbol).is_none());
        assert_eq!(store.events().len(), 4);
    }

    #[tokio::test]
    async fn test_memory_store_failure_injection() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert_err!(store.insert_order(&sample_order()).await);
        assert_eq!(store.order_count(), 0);

        store.set_failing(false);
        assert_ok!(store.insert_order(&sample_order()).await);
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn test_writer_counts_failures() {
        let store = Arc::new(MemoryStore::new());
        let (tx, handle) = spawn_writer(store.clone(), 16);

        let order = sample_order();
        assert!(tx.send(PersistenceEvent::InsertOrder { order: order.clone() }));
        // Status update for an order the store never saw
        assert!(tx.send(PersistenceEvent::UpdateOrderStatus {
            id: OrderId { sequence: 99, timestamp_ms: 0 },
            status: OrderStatus::Cancelled,
            fill_price: None,
        }));
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats, WriterStats { written: 1, failed: 1, dropped: 0 });
        assert!(store.order(&order.id).is_some());
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_counts() {
        let store = Arc::new(MemoryStore::new());
        let (tx, handle) = spawn_writer(store.clone(), 2);

        // The writer cannot run until this task yields, so only two fit
        for sequence in 0..5 {
            let order = Order { id: OrderId { sequence, timestamp_ms: 0 }, ..sample_order() };
            assert!(tx.send(PersistenceEvent::InsertOrder { order }));
        }
        assert_eq!(tx.dropped(), 3);
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats, WriterStats { written: 2, failed: 0, dropped: 3 });
        assert_eq!(store.order_count(), 2);
    }

    #[tokio::test]
    async fn test_send_reports_stopped_writer() {
        let (tx, handle) = spawn_writer(Arc::new(NullStore), 4);
        handle.abort();
        let _ = handle.await;
        assert!(!tx.send(PersistenceEvent::RemovePosition { symbol: Symbol::new("BTC") }));
    }

    #[tokio::test]
    async fn test_jsonl_store_replays_open_positions() {
        let path = temp_journal("replay");
        let store = JsonlStore::open(&path).await.unwrap();

        let order = sample_order();
        assert_ok!(store.insert_order(&order).await);
        assert_ok!(store.insert_position(&Position::new(Symbol::new("BTC"), 0.01, 100_000.0)).await);
        assert_ok!(store.insert_position(&Position::new(Symbol::new("ETH"), 2.0, 3_000.0)).await);
        let mut eth = Position::new(Symbol::new("ETH"), 1.5, 3_000.0);
        eth.current_price = 3_100.0;
        assert_ok!(store.update_position(&eth).await);
        assert_ok!(store.remove_position(&Symbol::new("BTC")).await);
        drop(store);

        let reopened = JsonlStore::open(&path).await.unwrap();
        let open = reopened.load_open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].symbol, Symbol::new("ETH"));
        assert_eq!(open[0].quantity, 1.5);
        assert_eq!(open[0].current_price, 3_100.0);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_event_wire_format() {
        let event = PersistenceEvent::RemovePosition { symbol: Symbol::new("DOGE") };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"op":"remove_position","symbol":"DOGE"}"#);
    }
}
