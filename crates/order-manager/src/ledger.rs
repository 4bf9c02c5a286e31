//! Position & Exposure Ledger
//!
//! Net position and P&L per symbol, derived only from applied trades.
//! Positions live behind one lock per symbol, so applies to the same
//! symbol are serialized while independent symbols proceed in parallel.
//! The ledger is an ordinary owned value; wire it in wherever it is needed.

use aegis_core::{Position, Price, Symbol, Timestamp, Trade, TradeId};
use chrono::NaiveDate;
use dashmap::DashMap;
use log::{debug, info};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal::prelude::Signed;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Effect of one trade on its symbol's position
#[derive(Debug, Clone, PartialEq)]
pub struct TradeImpact {
    pub symbol: Symbol,
    pub realized_pnl: Decimal,
    pub net_quantity: Decimal,
    /// The trade reduced or closed existing exposure
    pub closing: bool,
}

/// Account-level risk figures for a trading day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub day: NaiveDate,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_fees: Decimal,
    pub open_positions: usize,
    /// Sum of |net quantity| * (mark or average entry) over all symbols
    pub gross_exposure: Decimal,
    pub consecutive_losses: u32,
}

#[derive(Debug, Default)]
struct DailyStats {
    realized_by_day: BTreeMap<NaiveDate, Decimal>,
    consecutive_losses: u32,
}

#[derive(Default)]
pub struct PositionLedger {
    books: DashMap<Symbol, Arc<Mutex<Position>>>,
    /// Applied trade ids by execution date, pruned by `reset_daily`
    applied: DashMap<TradeId, NaiveDate>,
    daily: Mutex<DailyStats>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self, symbol: &str) -> Arc<Mutex<Position>> {
        if let Some(book) = self.books.get(symbol) {
            return book.clone();
        }
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Position::flat(symbol))))
            .clone()
    }

    /// Apply a trade. Returns `None` if the trade id was already applied.
    pub fn apply_trade(&self, trade: &Trade) -> Option<TradeImpact> {
        if self
            .applied
            .insert(trade.trade_id.clone(), trade.executed_at.date_naive())
            .is_some()
        {
            debug!("[LEDGER] trade {} already applied", trade.trade_id);
            return None;
        }

        let book = self.book(&trade.symbol);
        let mut position = book.lock();

        let before = position.net_quantity;
        let realized = position.apply_fill(
            trade.side,
            trade.quantity,
            trade.price,
            trade.fee,
            trade.executed_at,
        );
        let closing = !before.is_zero() && before.signum() != trade.signed_quantity().signum();

        {
            let mut daily = self.daily.lock();
            *daily
                .realized_by_day
                .entry(trade.executed_at.date_naive())
                .or_insert(Decimal::ZERO) += realized;

            if closing {
                if realized < Decimal::ZERO {
                    daily.consecutive_losses += 1;
                } else {
                    daily.consecutive_losses = 0;
                }
            }
        }

        debug!(
            "[LEDGER] {} {} {} @ {} -> net {} (realized {})",
            trade.symbol, trade.side, trade.quantity, trade.price, position.net_quantity, realized
        );

        Some(TradeImpact {
            symbol: trade.symbol.clone(),
            realized_pnl: realized,
            net_quantity: position.net_quantity,
            closing,
        })
    }

    /// Record a mark price and recompute unrealized P&L
    pub fn mark_price(&self, symbol: &str, price: Price, at: Timestamp) {
        self.book(symbol).lock().mark(price, at);
    }

    /// Current position for a symbol (flat if never traded)
    pub fn snapshot(&self, symbol: &str) -> Position {
        match self.books.get(symbol) {
            Some(book) => book.lock().clone(),
            None => Position::flat(symbol),
        }
    }

    pub fn positions(&self) -> Vec<Position> {
        self.books.iter().map(|b| b.value().lock().clone()).collect()
    }

    /// Symbols with a non-flat position
    pub fn held_symbols(&self) -> HashSet<Symbol> {
        self.books
            .iter()
            .filter(|b| !b.value().lock().is_flat())
            .map(|b| b.key().clone())
            .collect()
    }

    /// Realized P&L booked on `day` plus current unrealized P&L
    pub fn daily_pnl(&self, day: NaiveDate) -> Decimal {
        let realized = self.realized_on(day);
        let unrealized: Decimal = self
            .books
            .iter()
            .map(|b| b.value().lock().unrealized_pnl)
            .sum();
        realized + unrealized
    }

    fn realized_on(&self, day: NaiveDate) -> Decimal {
        self.daily
            .lock()
            .realized_by_day
            .get(&day)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.daily.lock().consecutive_losses
    }

    pub fn risk_metrics(&self, day: NaiveDate) -> RiskMetrics {
        let positions = self.positions();

        let unrealized_pnl = positions.iter().map(|p| p.unrealized_pnl).sum();
        let total_fees = positions.iter().map(|p| p.total_fees).sum();
        let open_positions = positions.iter().filter(|p| !p.is_flat()).count();
        let gross_exposure = positions
            .iter()
            .map(|p| p.net_quantity.abs() * p.mark_price.unwrap_or(p.average_entry_price))
            .sum();

        RiskMetrics {
            day,
            realized_pnl: self.realized_on(day),
            unrealized_pnl,
            total_fees,
            open_positions,
            gross_exposure,
            consecutive_losses: self.consecutive_losses(),
        }
    }

    /// Number of trade ids held for duplicate detection
    pub fn remembered_trades(&self) -> usize {
        self.applied.len()
    }

    /// Start a new trading day: forget realized P&L and trade ids from
    /// earlier days and reset the consecutive-loss counter.
    ///
    /// Orders still dedupe their own fills, so a replayed fill from an
    /// earlier day is still dropped before it reaches the ledger.
    pub fn reset_daily(&self, day: NaiveDate) {
        let mut daily = self.daily.lock();
        daily.realized_by_day = daily.realized_by_day.split_off(&day);
        daily.consecutive_losses = 0;
        drop(daily);

        let before = self.applied.len();
        self.applied.retain(|_, executed_on| *executed_on >= day);
        info!(
            "[LEDGER] daily counters reset for {} ({} trade ids dropped)",
            day,
            before - self.applied.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::Side;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn trade(id: &str, symbol: &str, side: Side, qty: Decimal, price: Decimal) -> Trade {
        Trade {
            trade_id: id.to_string(),
            order_id: Uuid::new_v4(),
            strategy_id: "s1".to_string(),
            symbol: symbol.to_string(),
            side,
            quantity: qty,
            price,
            fee: dec!(0),
            executed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn test_net_is_signed_sum_of_trades() {
        let ledger = PositionLedger::new();
        ledger.apply_trade(&trade("t1", "BTC-USD", Side::Buy, dec!(3), dec!(100)));
        ledger.apply_trade(&trade("t2", "BTC-USD", Side::Sell, dec!(1), dec!(110)));
        ledger.apply_trade(&trade("t3", "BTC-USD", Side::Buy, dec!(2), dec!(90)));

        let pos = ledger.snapshot("BTC-USD");
        assert_eq!(pos.net_quantity, dec!(4));
        assert_eq!(pos.realized_pnl, dec!(10));
        assert_eq!(pos.trade_count, 3);
    }

    #[test]
    fn test_duplicate_trade_ignored() {
        let ledger = PositionLedger::new();
        let t = trade("t1", "BTC-USD", Side::Buy, dec!(3), dec!(100));

        assert!(ledger.apply_trade(&t).is_some());
        assert!(ledger.apply_trade(&t).is_none());
        assert_eq!(ledger.snapshot("BTC-USD").net_quantity, dec!(3));
    }

    #[test]
    fn test_daily_pnl_and_consecutive_losses() {
        let ledger = PositionLedger::new();
        ledger.apply_trade(&trade("t1", "ETH-USD", Side::Buy, dec!(2), dec!(100)));
        let impact = ledger
            .apply_trade(&trade("t2", "ETH-USD", Side::Sell, dec!(1), dec!(90)))
            .unwrap();
        assert!(impact.closing);
        ledger.apply_trade(&trade("t3", "ETH-USD", Side::Sell, dec!(1), dec!(80)));

        assert_eq!(ledger.consecutive_losses(), 2);
        assert_eq!(ledger.daily_pnl(day()), dec!(-30));

        ledger.apply_trade(&trade("t4", "ETH-USD", Side::Sell, dec!(1), dec!(80)));
        ledger.apply_trade(&trade("t5", "ETH-USD", Side::Buy, dec!(1), dec!(70)));
        assert_eq!(ledger.consecutive_losses(), 0);
    }

    #[test]
    fn test_unrealized_counts_toward_daily_pnl() {
        let ledger = PositionLedger::new();
        ledger.apply_trade(&trade("t1", "BTC-USD", Side::Buy, dec!(2), dec!(100)));
        ledger.mark_price("BTC-USD", dec!(95), Utc::now());

        assert_eq!(ledger.daily_pnl(day()), dec!(-10));

        let metrics = ledger.risk_metrics(day());
        assert_eq!(metrics.unrealized_pnl, dec!(-10));
        assert_eq!(metrics.open_positions, 1);
        assert_eq!(metrics.gross_exposure, dec!(190));
    }

    #[test]
    fn test_held_symbols_and_reset() {
        let ledger = PositionLedger::new();
        ledger.apply_trade(&trade("t1", "BTC-USD", Side::Buy, dec!(1), dec!(100)));
        ledger.apply_trade(&trade("t2", "ETH-USD", Side::Buy, dec!(1), dec!(100)));
        ledger.apply_trade(&trade("t3", "ETH-USD", Side::Sell, dec!(1), dec!(90)));

        let held = ledger.held_symbols();
        assert!(held.contains("BTC-USD"));
        assert!(!held.contains("ETH-USD"));

        let next_day = day().succ_opt().unwrap();
        ledger.reset_daily(next_day);
        assert_eq!(ledger.consecutive_losses(), 0);
        assert_eq!(ledger.daily_pnl(day()), dec!(0));
    }

    #[test]
    fn test_reset_drops_earlier_trade_ids() {
        let ledger = PositionLedger::new();
        ledger.apply_trade(&trade("t1", "BTC-USD", Side::Buy, dec!(1), dec!(100)));

        let mut late = trade("t2", "BTC-USD", Side::Buy, dec!(1), dec!(100));
        late.executed_at = Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();
        ledger.apply_trade(&late);
        assert_eq!(ledger.remembered_trades(), 2);

        ledger.reset_daily(day().succ_opt().unwrap());
        assert_eq!(ledger.remembered_trades(), 1);

        // Same-day ids are still deduplicated
        assert!(ledger.apply_trade(&late).is_none());
        assert_eq!(ledger.snapshot("BTC-USD").net_quantity, dec!(2));
    }
}
