//! Order identity and lifecycle tracking

use super::errors::LedgerError;
use crate::market::{Side, Symbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Order identifier: creation timestamp plus a ledger-wide sequence number.
///
/// Ordering follows the sequence, so ids sort in submission order even if the
/// wall clock steps backwards.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId {
    pub sequence: u64,
    pub timestamp_ms: i64,
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ORD_{}_{}", self.timestamp_ms, self.sequence)
    }
}

/// Order type
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

/// Order status
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

/// Request to place an order, before it has an identity
#[derive(Clone, Debug, PartialEq)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: f64,
    pub order_type: OrderType,
    /// Requested price; 0 means "at market"
    pub price: f64,
}

impl OrderRequest {
    pub fn market(symbol: Symbol, side: Side, quantity: f64) -> Self {
        Self { symbol, side, quantity, order_type: OrderType::Market, price: 0.0 }
    }

    pub fn limit(symbol: Symbol, side: Side, quantity: f64, price: f64) -> Self {
        Self { symbol, side, quantity, order_type: OrderType::Limit, price }
    }
}

/// Order structure
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: f64,
    pub status: OrderStatus,
    pub fill_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    fn new(id: OrderId, request: OrderRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            price: request.price,
            status: OrderStatus::Pending,
            fill_price: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Counts per lifecycle state
#[derive(Default, Clone, Debug, Serialize)]
pub struct OrderStatistics {
    pub total_orders: u64,
    pub pending_orders: u64,
    pub filled_orders: u64,
    pub cancelled_orders: u64,
    pub fill_rate: f64,
}

/// Order ledger. Pending, filled and cancelled orders live in disjoint maps;
/// an order moves out of `pending` exactly once.
#[derive(Debug, Default)]
pub struct OrderLedger {
    pending: BTreeMap<OrderId, Order>,
    filled: BTreeMap<OrderId, Order>,
    cancelled: BTreeMap<OrderId, Order>,
    next_sequence: u64,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self, now: DateTime<Utc>) -> OrderId {
        self.next_sequence += 1;
        OrderId { sequence: self.next_sequence, timestamp_ms: now.timestamp_millis() }
    }

    /// Record a new PENDING order and return its id
    pub fn submit(&mut self, request: OrderRequest) -> OrderId {
        let now = Utc::now();
        let id = self.next_id(now);
        let order = Order::new(id.clone(), request, now);
        self.pending.insert(id.clone(), order);
        id
    }

    /// Transition PENDING -> FILLED
    pub fn mark_filled(&mut self, id: &OrderId, fill_price: f64) -> Result<Order, LedgerError> {
        let mut order = self.take_pending(id)?;
        order.status = OrderStatus::Filled;
        order.fill_price = Some(fill_price);
        order.updated_at = Utc::now();
        self.filled.insert(id.clone(), order.clone());
        Ok(order)
    }

    /// Transition PENDING -> CANCELLED
    pub fn mark_cancelled(&mut self, id: &OrderId) -> Result<Order, LedgerError> {
        let mut order = self.take_pending(id)?;
        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        self.cancelled.insert(id.clone(), order.clone());
        Ok(order)
    }

    fn take_pending(&mut self, id: &OrderId) -> Result<Order, LedgerError> {
        if let Some(order) = self.pending.remove(id) {
            return Ok(order);
        }
        match self.lookup(id) {
            Some(order) => Err(LedgerError::AlreadyTerminal { id: id.clone(), status: order.status }),
            None => Err(LedgerError::UnknownOrder(id.clone())),
        }
    }

    /// Get order by ID, whatever its state
    pub fn lookup(&self, id: &OrderId) -> Option<&Order> {
        self.pending
            .get(id)
            .or_else(|| self.filled.get(id))
            .or_else(|| self.cancelled.get(id))
    }

    /// Pending orders in submission order
    pub fn pending_orders(&self) -> impl Iterator<Item = &Order> {
        self.pending.values()
    }

    /// Resting LIMIT orders for the given symbol
    pub fn resting_limits(&self, symbol: &Symbol) -> Vec<Order> {
        self.pending
            .values()
            .filter(|o| o.order_type == OrderType::Limit && &o.symbol == symbol)
            .cloned()
            .collect()
    }

    pub fn get_statistics(&self) -> OrderStatistics {
        let mut stats = OrderStatistics {
            pending_orders: self.pending.len() as u64,
            filled_orders: self.filled.len() as u64,
            cancelled_orders: self.cancelled.len() as u64,
            ..Default::default()
        };
        stats.total_orders = stats.pending_orders + stats.filled_orders + stats.cancelled_orders;
        if stats.total_orders > 0 {
            stats.fill_rate = (stats.filled_orders as f64 / stats.total_orders as f64) * 100.0;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn btc() -> Symbol {
        Symbol::new("BTC-USD")
    }

    #[test]
    fn test_order_lifecycle() {
        let mut ledger = OrderLedger::new();
        let id = ledger.submit(OrderRequest::market(btc(), Side::Buy, 0.5));

        let order = ledger.lookup(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.fill_price, None);

        let filled = ledger.mark_filled(&id, 50_100.0).unwrap();
        assert_eq!(filled.status, OrderStatus::Filled);
        assert_eq!(filled.fill_price, Some(50_100.0));
        assert_eq!(ledger.lookup(&id).unwrap().status, OrderStatus::Filled);
        assert_eq!(ledger.pending_orders().count(), 0);
    }

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let mut ledger = OrderLedger::new();
        let ids: Vec<OrderId> = (0..50)
            .map(|_| ledger.submit(OrderRequest::market(btc(), Side::Buy, 1.0)))
            .collect();

        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_ne!(pair[0].to_string(), pair[1].to_string());
        }
        assert!(ids[0].to_string().starts_with("ORD_"));
        assert!(ids[0].to_string().ends_with("_1"));
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut ledger = OrderLedger::new();
        let filled = ledger.submit(OrderRequest::market(btc(), Side::Buy, 1.0));
        let cancelled = ledger.submit(OrderRequest::limit(btc(), Side::Buy, 1.0, 90.0));

        ledger.mark_filled(&filled, 100.0).unwrap();
        ledger.mark_cancelled(&cancelled).unwrap();

        assert_eq!(
            ledger.mark_filled(&filled, 101.0),
            Err(LedgerError::AlreadyTerminal { id: filled.clone(), status: OrderStatus::Filled })
        );
        assert_eq!(
            ledger.mark_cancelled(&filled),
            Err(LedgerError::AlreadyTerminal { id: filled.clone(), status: OrderStatus::Filled })
        );
        assert_eq!(
            ledger.mark_filled(&cancelled, 90.0),
            Err(LedgerError::AlreadyTerminal { id: cancelled.clone(), status: OrderStatus::Cancelled })
        );

        // Terminal orders keep their recorded outcome
        assert_eq!(ledger.lookup(&filled).unwrap().fill_price, Some(100.0));
        assert_eq!(ledger.lookup(&cancelled).unwrap().fill_price, None);
    }

    #[test]
    fn test_unknown_order() {
        let mut ledger = OrderLedger::new();
        let ghost = OrderId { sequence: 42, timestamp_ms: 0 };
        assert!(ledger.lookup(&ghost).is_none());
        assert_eq!(ledger.mark_cancelled(&ghost), Err(LedgerError::UnknownOrder(ghost.clone())));
    }

    #[test]
    fn test_resting_limits_and_statistics() {
        let mut ledger = OrderLedger::new();
        let eth = Symbol::new("ETH-USD");
        ledger.submit(OrderRequest::limit(btc(), Side::Buy, 1.0, 49_000.0));
        ledger.submit(OrderRequest::limit(eth.clone(), Side::Sell, 2.0, 3_100.0));
        let market = ledger.submit(OrderRequest::market(btc(), Side::Buy, 1.0));
        ledger.mark_filled(&market, 50_000.0).unwrap();

        let resting = ledger.resting_limits(&btc());
        assert_eq!(resting.len(), 1);
        assert_eq!(resting[0].price, 49_000.0);

        let stats = ledger.get_statistics();
        assert_eq!(stats.total_orders, 3);
        assert_eq!(stats.pending_orders, 2);
        assert_eq!(stats.filled_orders, 1);
        assert!((stats.fill_rate - 100.0 / 3.0).abs() < 1e-9);
    }
}
