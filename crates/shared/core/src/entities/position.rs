use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::Signed;
use serde::{Deserialize, Serialize};

use super::Side;
use crate::values::{Price, Quantity, Symbol, Timestamp};

/// Net holding in one symbol, derived from applied trades
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    /// Signed net quantity (positive = long, negative = short)
    pub net_quantity: Quantity,
    /// Weighted average entry price of the open quantity (zero when flat)
    pub average_entry_price: Price,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    /// Last mark used for unrealized P&L
    pub mark_price: Option<Price>,
    pub total_fees: Decimal,
    pub trade_count: u64,
    pub last_updated_at: Timestamp,
}

impl Position {
    /// A flat position with no history
    pub fn flat(symbol: impl Into<Symbol>) -> Self {
        Self {
            symbol: symbol.into(),
            net_quantity: Decimal::ZERO,
            average_entry_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            mark_price: None,
            total_fees: Decimal::ZERO,
            trade_count: 0,
            last_updated_at: Utc::now(),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.net_quantity.is_zero()
    }

    /// Apply an execution and return the P&L it realized.
    ///
    /// Increases use weighted-average cost. Reductions realize P&L against
    /// the current average entry; a flip opens the remainder at `price`.
    pub fn apply_fill(
        &mut self,
        side: Side,
        quantity: Quantity,
        price: Price,
        fee: Decimal,
        executed_at: Timestamp,
    ) -> Decimal {
        let signed_qty = side.signed(quantity);
        let current = self.net_quantity;

        let mut realized_pnl = Decimal::ZERO;

        let reducing = (current > Decimal::ZERO && signed_qty < Decimal::ZERO)
            || (current < Decimal::ZERO && signed_qty > Decimal::ZERO);
        if reducing {
            let close_qty = signed_qty.abs().min(current.abs());
            realized_pnl = if current > Decimal::ZERO {
                close_qty * (price - self.average_entry_price)
            } else {
                close_qty * (self.average_entry_price - price)
            };
        }

        let new_quantity = current + signed_qty;

        if new_quantity.is_zero() {
            self.average_entry_price = Decimal::ZERO;
        } else if !reducing {
            let total_cost = current.abs() * self.average_entry_price + quantity * price;
            self.average_entry_price = total_cost / new_quantity.abs();
        } else if new_quantity.signum() != current.signum() {
            // Flipped: the remainder opens at the fill price
            self.average_entry_price = price;
        }

        self.net_quantity = new_quantity;
        self.realized_pnl += realized_pnl;
        self.total_fees += fee;
        self.trade_count += 1;
        self.last_updated_at = executed_at;

        if let Some(mark) = self.mark_price {
            self.unrealized_pnl = self.unrealized_at(mark);
        }

        realized_pnl
    }

    /// Record a new mark and recompute unrealized P&L
    pub fn mark(&mut self, price: Price, at: Timestamp) {
        self.mark_price = Some(price);
        self.unrealized_pnl = self.unrealized_at(price);
        self.last_updated_at = at;
    }

    /// Unrealized P&L of the open quantity at a given mark price
    pub fn unrealized_at(&self, mark_price: Price) -> Decimal {
        if self.net_quantity.is_zero() {
            Decimal::ZERO
        } else if self.net_quantity > Decimal::ZERO {
            self.net_quantity * (mark_price - self.average_entry_price)
        } else {
            self.net_quantity.abs() * (self.average_entry_price - mark_price)
        }
    }

    /// Realized + unrealized P&L net of fees
    pub fn total_pnl(&self) -> Decimal {
        self.realized_pnl + self.unrealized_pnl - self.total_fees
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pos() -> Position {
        Position::flat("BTC-USD")
    }

    #[test]
    fn test_weighted_average_on_increase() {
        let mut p = pos();
        p.apply_fill(Side::Buy, dec!(3), dec!(100), dec!(0), Utc::now());
        p.apply_fill(Side::Buy, dec!(2), dec!(110), dec!(0), Utc::now());

        assert_eq!(p.net_quantity, dec!(5));
        assert_eq!(p.average_entry_price, dec!(104));
        assert_eq!(p.realized_pnl, dec!(0));
        assert_eq!(p.trade_count, 2);
    }

    #[test]
    fn test_partial_close_realizes_proportionally() {
        let mut p = pos();
        p.apply_fill(Side::Buy, dec!(10), dec!(100), dec!(1), Utc::now());
        let realized = p.apply_fill(Side::Sell, dec!(4), dec!(105), dec!(1), Utc::now());

        assert_eq!(realized, dec!(20));
        assert_eq!(p.net_quantity, dec!(6));
        assert_eq!(p.average_entry_price, dec!(100));
        assert_eq!(p.total_fees, dec!(2));
    }

    #[test]
    fn test_close_resets_average() {
        let mut p = pos();
        p.apply_fill(Side::Sell, dec!(2), dec!(50), dec!(0), Utc::now());
        let realized = p.apply_fill(Side::Buy, dec!(2), dec!(45), dec!(0), Utc::now());

        assert_eq!(realized, dec!(10));
        assert!(p.is_flat());
        assert_eq!(p.average_entry_price, dec!(0));
    }

    #[test]
    fn test_flip_opens_remainder_at_fill_price() {
        let mut p = pos();
        p.apply_fill(Side::Buy, dec!(3), dec!(100), dec!(0), Utc::now());
        let realized = p.apply_fill(Side::Sell, dec!(5), dec!(90), dec!(0), Utc::now());

        assert_eq!(realized, dec!(-30));
        assert_eq!(p.net_quantity, dec!(-2));
        assert_eq!(p.average_entry_price, dec!(90));
    }

    #[test]
    fn test_mark_updates_unrealized() {
        let mut p = pos();
        p.apply_fill(Side::Buy, dec!(2), dec!(100), dec!(0), Utc::now());
        p.mark(dec!(97), Utc::now());

        assert_eq!(p.unrealized_pnl, dec!(-6));

        p.apply_fill(Side::Buy, dec!(2), dec!(96), dec!(0), Utc::now());
        assert_eq!(p.average_entry_price, dec!(98));
        assert_eq!(p.unrealized_pnl, dec!(-4));
    }
}
