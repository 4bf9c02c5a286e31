//! Order State Machine
//!
//! One instance per order. Owns the order record, the trades attributed to
//! it and the set of exchange trade ids already applied. Every status change
//! goes through [`OrderStatus::can_transition_to`]; anything outside the
//! table is reported as an [`OrderError`] and leaves the order untouched.
//!
//! The machine is synchronous and does no I/O. Callers serialize access
//! (the coordinator holds a per-order lock around every call).

use aegis_core::{Fill, Order, OrderStatus, Timestamp, Trade, TradeId};
use aegis_gateway::{OrderStatusReport, VenueOrderState};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::OrderError;

type Result<T> = std::result::Result<T, OrderError>;

/// One recorded status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: Timestamp,
}

/// Result of offering a fill to the machine
#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    /// New trade; quantities and status updated
    Applied(Trade),
    /// Trade id seen before; nothing changed
    Duplicate,
}

/// What the caller must do after a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAction {
    /// Never sent; the order is already Cancelled
    CancelLocally,
    /// Now Cancelling; an exchange cancel must be issued
    SendToExchange,
    /// A cancel is already pending
    AlreadyCancelling,
    /// Nothing to cancel
    AlreadyTerminal,
}

#[derive(Debug, Clone)]
pub struct OrderStateMachine {
    order: Order,
    trades: Vec<Trade>,
    applied: HashSet<TradeId>,
    /// Sum of price * quantity over applied trades
    fill_notional: Decimal,
    history: Vec<StatusChange>,
    failure_reason: Option<String>,
}

impl OrderStateMachine {
    /// Wrap a freshly created order
    pub fn new(order: Order) -> Self {
        Self {
            order,
            trades: Vec::new(),
            applied: HashSet::new(),
            fill_notional: Decimal::ZERO,
            history: Vec::new(),
            failure_reason: None,
        }
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    pub fn status(&self) -> OrderStatus {
        self.order.status
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    fn transition(&mut self, to: OrderStatus, at: Timestamp) -> Result<()> {
        let from = self.order.status;
        if !from.can_transition_to(to) {
            return Err(self.violation(format!("transition {} -> {} not allowed", from, to)));
        }
        if from != to {
            self.history.push(StatusChange { from, to, at });
        }
        self.order.status = to;
        self.order.last_updated_at = at;
        Ok(())
    }

    fn violation(&self, detail: impl Into<String>) -> OrderError {
        OrderError::invariant(self.order.order_id, detail)
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Created -> Submitting
    pub fn begin_submit(&mut self, at: Timestamp) -> Result<()> {
        self.transition(OrderStatus::Submitting, at)
    }

    /// Count a resubmission attempt
    pub fn record_retry(&mut self, at: Timestamp) -> Result<()> {
        if self.order.status != OrderStatus::Submitting {
            return Err(self.violation(format!(
                "retry recorded while {}",
                self.order.status
            )));
        }
        self.order.retry_count += 1;
        self.order.last_updated_at = at;
        Ok(())
    }

    /// Exchange accepted the order. Submitting -> Open.
    ///
    /// An ack can trail a fill (which already implied it) or a cancel
    /// request; then only the exchange id is recorded. Returns whether the
    /// status changed.
    pub fn on_ack(&mut self, exchange_order_id: &str, at: Timestamp) -> Result<bool> {
        if let Some(known) = &self.order.exchange_order_id {
            if known != exchange_order_id {
                return Err(self.violation(format!(
                    "ack with exchange id {} but order is {}",
                    exchange_order_id, known
                )));
            }
        }
        self.order.exchange_order_id = Some(exchange_order_id.to_string());

        match self.order.status {
            OrderStatus::Submitting => {
                self.transition(OrderStatus::Open, at)?;
                Ok(true)
            }
            OrderStatus::Created => Err(self.violation("ack for an order never submitted")),
            _ => Ok(false),
        }
    }

    /// Exchange refused the submission. Returns the resulting status.
    ///
    /// Submitting -> Rejected. If a cancel was requested while submitting,
    /// nothing rests on the exchange and the order ends Cancelled.
    pub fn on_exchange_reject(&mut self, reason: &str, at: Timestamp) -> Result<OrderStatus> {
        match self.order.status {
            OrderStatus::Cancelling if self.order.filled_quantity.is_zero() => {
                self.transition(OrderStatus::Cancelled, at)?;
            }
            _ => self.transition(OrderStatus::Rejected, at)?,
        }
        self.failure_reason = Some(reason.to_string());
        Ok(self.order.status)
    }

    // ========================================================================
    // Fills
    // ========================================================================

    /// Apply an exchange fill, idempotently by trade id.
    ///
    /// A fill while Submitting implies the ack. A fill that would take
    /// `filled_quantity` past `requested_quantity` is refused, never clamped.
    /// Late fills on an order that already ended Cancelled, Rejected or
    /// Failed are recorded without changing its status.
    pub fn apply_fill(&mut self, fill: &Fill, at: Timestamp) -> Result<FillOutcome> {
        if self.applied.contains(&fill.trade_id) {
            return Ok(FillOutcome::Duplicate);
        }

        if self.order.status == OrderStatus::Created {
            return Err(self.violation(format!(
                "fill {} for an order never submitted",
                fill.trade_id
            )));
        }
        if fill.quantity <= Decimal::ZERO {
            return Err(self.violation(format!(
                "fill {} has non-positive quantity {}",
                fill.trade_id, fill.quantity
            )));
        }
        if fill.side != self.order.side || fill.symbol != self.order.symbol {
            return Err(self.violation(format!(
                "fill {} is {} {} but order is {} {}",
                fill.trade_id, fill.side, fill.symbol, self.order.side, self.order.symbol
            )));
        }

        let new_filled = self.order.filled_quantity + fill.quantity;
        if new_filled > self.order.requested_quantity {
            return Err(self.violation(format!(
                "fill {} of {} would overfill: filled {} of {}",
                fill.trade_id,
                fill.quantity,
                self.order.filled_quantity,
                self.order.requested_quantity
            )));
        }

        if self.order.status == OrderStatus::Submitting {
            self.transition(OrderStatus::Open, at)?;
        }
        if self.order.exchange_order_id.is_none() {
            self.order.exchange_order_id = fill.exchange_order_id.clone();
        }

        let next = if self.order.status.is_terminal() {
            None
        } else if new_filled == self.order.requested_quantity {
            Some(OrderStatus::Filled)
        } else if self.order.status == OrderStatus::Cancelling {
            Some(OrderStatus::Cancelling)
        } else {
            Some(OrderStatus::PartiallyFilled)
        };
        if let Some(next) = next {
            self.transition(next, at)?;
        }

        self.fill_notional += fill.price * fill.quantity;
        self.order.filled_quantity = new_filled;
        self.order.average_fill_price = Some(self.fill_notional / new_filled);
        self.order.last_updated_at = at;

        let trade = Trade::from_fill(&self.order, fill);
        self.applied.insert(fill.trade_id.clone());
        self.trades.push(trade.clone());

        Ok(FillOutcome::Applied(trade))
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Ask for the order to be cancelled
    pub fn request_cancel(&mut self, at: Timestamp) -> Result<CancelAction> {
        match self.order.status {
            OrderStatus::Created => {
                self.transition(OrderStatus::Cancelling, at)?;
                self.transition(OrderStatus::Cancelled, at)?;
                Ok(CancelAction::CancelLocally)
            }
            OrderStatus::Submitting | OrderStatus::Open | OrderStatus::PartiallyFilled => {
                self.transition(OrderStatus::Cancelling, at)?;
                Ok(CancelAction::SendToExchange)
            }
            OrderStatus::Cancelling => Ok(CancelAction::AlreadyCancelling),
            _ => Ok(CancelAction::AlreadyTerminal),
        }
    }

    /// Exchange confirmed the cancel. Returns whether the status changed;
    /// a fill that completed the order first wins.
    pub fn on_cancel_confirmed(&mut self, at: Timestamp) -> Result<bool> {
        match self.order.status {
            OrderStatus::Cancelling => {
                self.transition(OrderStatus::Cancelled, at)?;
                Ok(true)
            }
            status if status.is_terminal() => Ok(false),
            status => Err(self.violation(format!("cancel confirmed while {}", status))),
        }
    }

    // ========================================================================
    // Reconciliation and failure
    // ========================================================================

    /// Bring local state in line with an exchange status report.
    ///
    /// Missing fills are applied first (duplicates skipped), then the
    /// reported state is mapped. Returns the trades newly applied.
    pub fn reconcile(&mut self, report: &OrderStatusReport, at: Timestamp) -> Result<Vec<Trade>> {
        let mut applied = Vec::new();
        for fill in &report.fills {
            if let FillOutcome::Applied(trade) = self.apply_fill(fill, at)? {
                applied.push(trade);
            }
        }

        if self.order.status.is_terminal() {
            return Ok(applied);
        }

        match report.state {
            VenueOrderState::Open | VenueOrderState::PartiallyFilled => {
                // Also how an order cancelled before its ack learns its id
                let unacked = self.order.status == OrderStatus::Submitting
                    || self.order.exchange_order_id.is_none();
                if unacked {
                    if let Some(id) = &report.exchange_order_id {
                        self.on_ack(id, at)?;
                    }
                }
            }
            VenueOrderState::Filled => {
                if !self.order.is_filled() {
                    return Err(self.violation(format!(
                        "venue reports filled but only {} of {} accounted for",
                        self.order.filled_quantity, self.order.requested_quantity
                    )));
                }
            }
            VenueOrderState::Cancelled | VenueOrderState::Expired => {
                if self.order.status != OrderStatus::Cancelling {
                    self.transition(OrderStatus::Cancelling, at)?;
                }
                self.transition(OrderStatus::Cancelled, at)?;
            }
            VenueOrderState::Rejected => {
                let reason = report
                    .reject_reason
                    .clone()
                    .unwrap_or_else(|| "rejected by venue".to_string());
                if matches!(
                    self.order.status,
                    OrderStatus::Submitting | OrderStatus::Cancelling
                ) {
                    self.on_exchange_reject(&reason, at)?;
                }
            }
        }

        Ok(applied)
    }

    /// Any non-terminal -> Failed. Returns whether the status changed.
    pub fn fail(&mut self, reason: impl Into<String>, at: Timestamp) -> Result<bool> {
        if self.order.status.is_terminal() {
            return Ok(false);
        }
        self.transition(OrderStatus::Failed, at)?;
        self.failure_reason = Some(reason.into());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::{Side, Signal};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn machine(qty: Decimal) -> OrderStateMachine {
        let signal = Signal::new("s1", "BTC-USD", Side::Buy, qty);
        OrderStateMachine::new(Order::from_signal(&signal, qty, Utc::now()))
    }

    fn open(qty: Decimal) -> OrderStateMachine {
        let mut m = machine(qty);
        m.begin_submit(Utc::now()).unwrap();
        m.on_ack("X1", Utc::now()).unwrap();
        m
    }

    fn fill(trade_id: &str, qty: Decimal, price: Decimal) -> Fill {
        Fill {
            trade_id: trade_id.to_string(),
            client_order_id: None,
            exchange_order_id: Some("X1".to_string()),
            symbol: "BTC-USD".to_string(),
            side: Side::Buy,
            quantity: qty,
            price,
            fee: Decimal::ZERO,
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn test_happy_path_with_history() {
        let mut m = open(dec!(5));

        m.apply_fill(&fill("t1", dec!(3), dec!(100)), Utc::now()).unwrap();
        assert_eq!(m.status(), OrderStatus::PartiallyFilled);

        m.apply_fill(&fill("t2", dec!(2), dec!(105)), Utc::now()).unwrap();
        assert_eq!(m.status(), OrderStatus::Filled);
        assert_eq!(m.order().average_fill_price, Some(dec!(102)));

        let path: Vec<_> = m.history().iter().map(|c| c.to).collect();
        assert_eq!(
            path,
            vec![
                OrderStatus::Submitting,
                OrderStatus::Open,
                OrderStatus::PartiallyFilled,
                OrderStatus::Filled
            ]
        );
    }

    #[test]
    fn test_filled_never_exceeds_requested() {
        let mut m = open(dec!(5));
        m.apply_fill(&fill("t1", dec!(4), dec!(100)), Utc::now()).unwrap();

        let err = m
            .apply_fill(&fill("t2", dec!(2), dec!(100)), Utc::now())
            .unwrap_err();
        assert!(matches!(err, OrderError::InvariantViolation { .. }));
        assert_eq!(m.order().filled_quantity, dec!(4));
        assert!(m.order().filled_quantity <= m.order().requested_quantity);
        assert_eq!(m.trades().len(), 1);
    }

    #[test]
    fn test_duplicate_trade_id_is_idempotent() {
        let mut m = open(dec!(5));
        let f = fill("t1", dec!(2), dec!(100));

        assert!(matches!(
            m.apply_fill(&f, Utc::now()).unwrap(),
            FillOutcome::Applied(_)
        ));
        assert_eq!(m.apply_fill(&f, Utc::now()).unwrap(), FillOutcome::Duplicate);
        assert_eq!(m.order().filled_quantity, dec!(2));
        assert_eq!(m.trades().len(), 1);
    }

    #[test]
    fn test_out_of_order_fills_converge() {
        let fills = [
            fill("t1", dec!(1), dec!(100)),
            fill("t2", dec!(2), dec!(101)),
            fill("t3", dec!(3), dec!(99)),
        ];

        let mut in_order = open(dec!(6));
        for f in &fills {
            in_order.apply_fill(f, Utc::now()).unwrap();
        }

        let mut reversed = open(dec!(6));
        for f in fills.iter().rev() {
            reversed.apply_fill(f, Utc::now()).unwrap();
        }
        // Replays are harmless
        reversed.apply_fill(&fills[1], Utc::now()).unwrap();

        assert_eq!(in_order.status(), OrderStatus::Filled);
        assert_eq!(reversed.status(), OrderStatus::Filled);
        assert_eq!(
            in_order.order().filled_quantity,
            reversed.order().filled_quantity
        );
        assert_eq!(
            in_order.order().average_fill_price,
            reversed.order().average_fill_price
        );
    }

    #[test]
    fn test_fill_while_submitting_implies_ack() {
        let mut m = machine(dec!(2));
        m.begin_submit(Utc::now()).unwrap();

        m.apply_fill(&fill("t1", dec!(1), dec!(100)), Utc::now()).unwrap();
        assert_eq!(m.status(), OrderStatus::PartiallyFilled);
        assert_eq!(m.order().exchange_order_id.as_deref(), Some("X1"));

        // The trailing ack only confirms the id
        assert!(!m.on_ack("X1", Utc::now()).unwrap());
        assert_eq!(m.status(), OrderStatus::PartiallyFilled);
    }

    #[test]
    fn test_retry_counter() {
        let mut m = machine(dec!(1));
        assert!(m.record_retry(Utc::now()).is_err());

        m.begin_submit(Utc::now()).unwrap();
        m.record_retry(Utc::now()).unwrap();
        m.record_retry(Utc::now()).unwrap();
        assert_eq!(m.order().retry_count, 2);

        // A cancel during backoff ends the retries
        m.request_cancel(Utc::now()).unwrap();
        assert!(m.record_retry(Utc::now()).is_err());
        assert_eq!(m.order().retry_count, 2);
    }

    #[test]
    fn test_cancel_created_is_local() {
        let mut m = machine(dec!(1));
        assert_eq!(
            m.request_cancel(Utc::now()).unwrap(),
            CancelAction::CancelLocally
        );
        assert_eq!(m.status(), OrderStatus::Cancelled);
        assert_eq!(
            m.request_cancel(Utc::now()).unwrap(),
            CancelAction::AlreadyTerminal
        );
    }

    #[test]
    fn test_partial_fill_then_cancel() {
        let mut m = open(dec!(5));
        m.apply_fill(&fill("t1", dec!(2), dec!(100)), Utc::now()).unwrap();

        assert_eq!(
            m.request_cancel(Utc::now()).unwrap(),
            CancelAction::SendToExchange
        );
        assert_eq!(
            m.request_cancel(Utc::now()).unwrap(),
            CancelAction::AlreadyCancelling
        );

        // A fill racing the cancel stays Cancelling
        m.apply_fill(&fill("t2", dec!(1), dec!(100)), Utc::now()).unwrap();
        assert_eq!(m.status(), OrderStatus::Cancelling);

        assert!(m.on_cancel_confirmed(Utc::now()).unwrap());
        assert_eq!(m.status(), OrderStatus::Cancelled);
        assert_eq!(m.order().filled_quantity, dec!(3));
    }

    #[test]
    fn test_fill_completing_during_cancel_wins() {
        let mut m = open(dec!(2));
        m.request_cancel(Utc::now()).unwrap();
        m.apply_fill(&fill("t1", dec!(2), dec!(100)), Utc::now()).unwrap();

        assert_eq!(m.status(), OrderStatus::Filled);
        assert!(!m.on_cancel_confirmed(Utc::now()).unwrap());
        assert_eq!(m.status(), OrderStatus::Filled);
    }

    #[test]
    fn test_reject_only_from_submitting() {
        let mut m = machine(dec!(1));
        m.begin_submit(Utc::now()).unwrap();
        assert_eq!(
            m.on_exchange_reject("insufficient funds", Utc::now()).unwrap(),
            OrderStatus::Rejected
        );

        let mut m = open(dec!(1));
        let err = m.on_exchange_reject("late", Utc::now()).unwrap_err();
        assert!(matches!(err, OrderError::InvariantViolation { .. }));
        assert!(err.to_string().contains("OPEN -> REJECTED"));
        assert_eq!(m.status(), OrderStatus::Open);
    }

    #[test]
    fn test_reject_while_cancelling_ends_cancelled() {
        let mut m = machine(dec!(1));
        m.begin_submit(Utc::now()).unwrap();
        m.request_cancel(Utc::now()).unwrap();

        assert_eq!(
            m.on_exchange_reject("unknown", Utc::now()).unwrap(),
            OrderStatus::Cancelled
        );
    }

    #[test]
    fn test_reconcile_applies_missing_fills_and_state() {
        let mut m = open(dec!(5));
        m.apply_fill(&fill("t1", dec!(2), dec!(100)), Utc::now()).unwrap();

        let report = OrderStatusReport {
            client_order_id: m.order().client_order_id(),
            exchange_order_id: Some("X1".into()),
            state: VenueOrderState::Cancelled,
            filled_quantity: dec!(3),
            fills: vec![
                fill("t1", dec!(2), dec!(100)),
                fill("t2", dec!(1), dec!(101)),
            ],
            reject_reason: None,
        };

        let applied = m.reconcile(&report, Utc::now()).unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].trade_id, "t2");
        assert_eq!(m.status(), OrderStatus::Cancelled);
        assert_eq!(m.order().filled_quantity, dec!(3));
    }

    #[test]
    fn test_reconcile_learns_id_of_unacked_cancel() {
        let mut m = machine(dec!(2));
        m.begin_submit(Utc::now()).unwrap();
        m.request_cancel(Utc::now()).unwrap();

        let report = OrderStatusReport {
            client_order_id: m.order().client_order_id(),
            exchange_order_id: Some("X9".into()),
            state: VenueOrderState::Open,
            filled_quantity: dec!(0),
            fills: vec![],
            reject_reason: None,
        };

        assert!(m.reconcile(&report, Utc::now()).unwrap().is_empty());
        assert_eq!(m.status(), OrderStatus::Cancelling);
        assert_eq!(m.order().exchange_order_id.as_deref(), Some("X9"));
    }

    #[test]
    fn test_reconcile_filled_requires_fills() {
        let mut m = open(dec!(5));
        let report = OrderStatusReport {
            client_order_id: m.order().client_order_id(),
            exchange_order_id: Some("X1".into()),
            state: VenueOrderState::Filled,
            filled_quantity: dec!(5),
            fills: vec![fill("t1", dec!(3), dec!(100))],
            reject_reason: None,
        };

        assert!(matches!(
            m.reconcile(&report, Utc::now()),
            Err(OrderError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn test_reconcile_recovers_lost_ack() {
        let mut m = machine(dec!(1));
        m.begin_submit(Utc::now()).unwrap();

        let report = OrderStatusReport {
            client_order_id: m.order().client_order_id(),
            exchange_order_id: Some("X9".into()),
            state: VenueOrderState::Open,
            filled_quantity: dec!(0),
            fills: vec![],
            reject_reason: None,
        };
        m.reconcile(&report, Utc::now()).unwrap();

        assert_eq!(m.status(), OrderStatus::Open);
        assert_eq!(m.order().exchange_order_id.as_deref(), Some("X9"));
    }

    #[test]
    fn test_fail_from_any_non_terminal() {
        let mut m = open(dec!(1));
        assert!(m.fail("boom", Utc::now()).unwrap());
        assert_eq!(m.status(), OrderStatus::Failed);
        assert_eq!(m.failure_reason(), Some("boom"));
        assert!(!m.fail("again", Utc::now()).unwrap());
    }

    #[test]
    fn test_wrong_side_fill_rejected() {
        let mut m = open(dec!(1));
        let mut f = fill("t1", dec!(1), dec!(100));
        f.side = Side::Sell;

        assert!(m.apply_fill(&f, Utc::now()).is_err());
        assert_eq!(m.status(), OrderStatus::Open);
    }
}
