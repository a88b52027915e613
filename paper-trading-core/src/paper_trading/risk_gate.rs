//! Pre-trade risk validation

use super::config::RiskLimits;
use super::errors::RiskViolation;
use crate::market::Symbol;
use serde::Serialize;
use tracing::debug;

/// The slice of portfolio state the risk gate needs
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RiskSnapshot {
    pub cash: f64,
    pub equity: f64,
    pub peak_equity: f64,
}

impl RiskSnapshot {
    /// Fractional decline of equity from its peak; zero without a positive peak
    pub fn drawdown(&self) -> f64 {
        if self.peak_equity > 0.0 {
            (self.peak_equity - self.equity) / self.peak_equity
        } else {
            0.0
        }
    }
}

/// Risk gate. Pure validation, no side effects.
#[derive(Clone, Debug)]
pub struct RiskGate {
    limits: RiskLimits,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Check if an order for `quantity` at `price` should be allowed.
    ///
    /// Checks run in a fixed order and stop at the first failure: quantity,
    /// position size, available cash, drawdown.
    pub fn authorize(
        &self,
        snapshot: &RiskSnapshot,
        symbol: &Symbol,
        quantity: f64,
        price: f64,
    ) -> Result<(), RiskViolation> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(RiskViolation::InvalidQuantity { quantity });
        }

        let notional = quantity * price;
        if notional > self.limits.max_position_size {
            return Err(RiskViolation::PositionSizeExceeded {
                notional,
                limit: self.limits.max_position_size,
            });
        }

        if notional > snapshot.cash {
            return Err(RiskViolation::InsufficientFunds { required: notional, available: snapshot.cash });
        }

        let drawdown = snapshot.drawdown();
        if drawdown > self.limits.max_drawdown {
            return Err(RiskViolation::DrawdownExceeded { drawdown, limit: self.limits.max_drawdown });
        }

        debug!(%symbol, quantity, price, notional, "Order authorized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> RiskGate {
        RiskGate::new(RiskLimits::default())
    }

    fn snapshot(cash: f64, equity: f64, peak_equity: f64) -> RiskSnapshot {
        RiskSnapshot { cash, equity, peak_equity }
    }

    #[test]
    fn test_reasonable_order_approved() {
        let result = gate().authorize(&snapshot(10_000.0, 10_000.0, 10_000.0), &Symbol::new("BTC"), 0.01, 100_000.0);
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_quantity() {
        let snap = snapshot(10_000.0, 10_000.0, 10_000.0);
        for quantity in [0.0, -1.0, f64::NAN] {
            let err = gate().authorize(&snap, &Symbol::new("BTC"), quantity, 100.0).unwrap_err();
            assert!(matches!(err, RiskViolation::InvalidQuantity { .. }));
        }
    }

    #[test]
    fn test_position_size_checked_before_cash() {
        // Plenty of cash, still rejected on size
        let snap = snapshot(1_000_000.0, 1_000_000.0, 1_000_000.0);
        let err = gate().authorize(&snap, &Symbol::new("BTC"), 1.0, 6000.0).unwrap_err();
        assert_eq!(err, RiskViolation::PositionSizeExceeded { notional: 6000.0, limit: 5000.0 });

        // Too large and unaffordable: size wins because it is checked first
        let snap = snapshot(100.0, 100.0, 100.0);
        let err = gate().authorize(&snap, &Symbol::new("BTC"), 1.0, 6000.0).unwrap_err();
        assert!(matches!(err, RiskViolation::PositionSizeExceeded { .. }));
    }

    #[test]
    fn test_insufficient_funds() {
        let snap = snapshot(999.0, 5_000.0, 5_000.0);
        let err = gate().authorize(&snap, &Symbol::new("ETH"), 1.0, 1000.0).unwrap_err();
        assert_eq!(err, RiskViolation::InsufficientFunds { required: 1000.0, available: 999.0 });
    }

    #[test]
    fn test_drawdown_limit() {
        // 25% below peak with a 20% limit
        let snap = snapshot(7_500.0, 7_500.0, 10_000.0);
        let err = gate().authorize(&snap, &Symbol::new("ETH"), 1.0, 100.0).unwrap_err();
        assert!(matches!(err, RiskViolation::DrawdownExceeded { drawdown, .. } if (drawdown - 0.25).abs() < 1e-12));

        // Exactly at the limit is still allowed
        let snap = snapshot(8_000.0, 8_000.0, 10_000.0);
        assert!(gate().authorize(&snap, &Symbol::new("ETH"), 1.0, 100.0).is_ok());
    }

    #[test]
    fn test_drawdown_without_peak() {
        assert_eq!(snapshot(0.0, 0.0, 0.0).drawdown(), 0.0);
    }
}
