//! Simulated venue
//!
//! An in-process exchange that keeps an order book of states, deduplicates
//! by client order id, fills on command (or immediately) and misbehaves on
//! demand through a [`Fault`] script. Fills are also pushed out on an
//! event stream the way a venue's execution feed would.

use aegis_core::{Fill, Side};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use super::faults::{Fault, FaultScript, VenueOp};
use crate::error::VenueError;
use crate::exchange::VenueClient;
use crate::messages::order::{
    CancelAck, CancelRequest, OrderAck, OrderRequest, OrderStatusReport, OrderTypeWire,
    StatusQuery, VenueOrderState,
};

/// When accepted orders fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// Only when [`SimulatedVenue::fill`] is called
    #[default]
    Manual,
    /// In full, at acceptance
    Immediate,
}

/// Simulated venue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Delay applied to every call before it is processed
    pub latency_ms: u64,
    pub fill_mode: FillMode,
    /// Execution price for market orders
    pub reference_price: Decimal,
    /// Fee charged as a fraction of notional
    pub fee_rate: Decimal,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            fill_mode: FillMode::Manual,
            reference_price: dec!(100),
            fee_rate: Decimal::ZERO,
        }
    }
}

/// Execution feed message
#[derive(Debug, Clone, PartialEq)]
pub enum VenueEvent {
    Fill(Fill),
    /// Order left the book without (further) fills
    Closed {
        client_order_id: String,
        state: VenueOrderState,
    },
}

#[derive(Debug)]
struct VenueOrder {
    request: OrderRequest,
    exchange_order_id: String,
    state: VenueOrderState,
    filled: Decimal,
    fills: Vec<Fill>,
}

impl VenueOrder {
    fn report(&self) -> OrderStatusReport {
        OrderStatusReport {
            client_order_id: self.request.client_order_id.clone(),
            exchange_order_id: Some(self.exchange_order_id.clone()),
            state: self.state,
            filled_quantity: self.filled,
            fills: self.fills.clone(),
            reject_reason: None,
        }
    }
}

#[derive(Debug, Default)]
struct VenueBook {
    orders: HashMap<String, VenueOrder>,
    /// exchange id -> client id
    exchange_index: HashMap<String, String>,
    next_order: u64,
    next_trade: u64,
    /// Peak number of live orders seen per (symbol, side)
    peak_live: HashMap<(String, Side), usize>,
}

impl VenueBook {
    fn resolve(&self, client_order_id: &str, exchange_order_id: Option<&str>) -> Option<String> {
        if self.orders.contains_key(client_order_id) {
            return Some(client_order_id.to_string());
        }
        exchange_order_id.and_then(|id| self.exchange_index.get(id).cloned())
    }

    fn live_count(&self, symbol: &str, side: Side) -> usize {
        self.orders
            .values()
            .filter(|o| {
                o.request.symbol == symbol && o.request.side == side && !o.state.is_terminal()
            })
            .count()
    }
}

/// In-process venue implementing [`VenueClient`]
pub struct SimulatedVenue {
    config: SimulatorConfig,
    book: Mutex<VenueBook>,
    faults: Mutex<FaultScript>,
    events: mpsc::UnboundedSender<VenueEvent>,
    submit_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    query_calls: AtomicUsize,
    active_submits: AtomicUsize,
    peak_active_submits: AtomicUsize,
}

impl SimulatedVenue {
    /// Create a venue and the receiving end of its execution feed
    pub fn new(config: SimulatorConfig) -> (Self, mpsc::UnboundedReceiver<VenueEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let venue = Self {
            config,
            book: Mutex::new(VenueBook::default()),
            faults: Mutex::new(FaultScript::default()),
            events,
            submit_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            active_submits: AtomicUsize::new(0),
            peak_active_submits: AtomicUsize::new(0),
        };
        (venue, rx)
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    /// Queue `fault` for the next `times` calls of `op`
    pub fn inject(&self, op: VenueOp, fault: Fault, times: usize) {
        self.faults.lock().push(op, fault, times);
    }

    /// Apply `fault` to every call of `op` once queued faults run out
    pub fn fail_always(&self, op: VenueOp, fault: Fault) {
        self.faults.lock().set_always(op, Some(fault));
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    // ========================================================================
    // Venue-side actions
    // ========================================================================

    /// Execute `quantity` of a resting order at `price` and publish the fill
    pub fn fill(
        &self,
        client_order_id: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Fill, VenueError> {
        let fill = {
            let mut book = self.book.lock();
            Self::execute(&mut book, &self.config, client_order_id, quantity, price)?
        };
        let _ = self.events.send(VenueEvent::Fill(fill.clone()));
        Ok(fill)
    }

    /// Execute whatever is left of an order
    pub fn fill_remaining(&self, client_order_id: &str, price: Decimal) -> Result<Fill, VenueError> {
        let remaining = {
            let book = self.book.lock();
            let order = book
                .orders
                .get(client_order_id)
                .ok_or_else(|| VenueError::UnknownOrder(client_order_id.to_string()))?;
            order.request.quantity - order.filled
        };
        self.fill(client_order_id, remaining, price)
    }

    /// Expire a resting order (e.g. end of session)
    pub fn expire(&self, client_order_id: &str) -> Result<(), VenueError> {
        {
            let mut book = self.book.lock();
            let order = book
                .orders
                .get_mut(client_order_id)
                .ok_or_else(|| VenueError::UnknownOrder(client_order_id.to_string()))?;
            if order.state.is_terminal() {
                return Err(VenueError::NotCancellable(client_order_id.to_string()));
            }
            order.state = VenueOrderState::Expired;
        }
        let _ = self.events.send(VenueEvent::Closed {
            client_order_id: client_order_id.to_string(),
            state: VenueOrderState::Expired,
        });
        Ok(())
    }

    fn execute(
        book: &mut VenueBook,
        config: &SimulatorConfig,
        client_order_id: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Fill, VenueError> {
        book.next_trade += 1;
        let trade_id = format!("T{}", book.next_trade);

        let order = book
            .orders
            .get_mut(client_order_id)
            .ok_or_else(|| VenueError::UnknownOrder(client_order_id.to_string()))?;

        if order.state.is_terminal() {
            return Err(VenueError::Validation(format!(
                "order {} is {}",
                client_order_id,
                order.state.as_str()
            )));
        }
        if quantity <= Decimal::ZERO || order.filled + quantity > order.request.quantity {
            return Err(VenueError::Validation(format!(
                "fill of {} exceeds remaining {}",
                quantity,
                order.request.quantity - order.filled
            )));
        }

        let fill = Fill {
            trade_id,
            client_order_id: Some(client_order_id.to_string()),
            exchange_order_id: Some(order.exchange_order_id.clone()),
            symbol: order.request.symbol.clone(),
            side: order.request.side,
            quantity,
            price,
            fee: quantity * price * config.fee_rate,
            executed_at: Utc::now(),
        };

        order.filled += quantity;
        order.state = if order.filled == order.request.quantity {
            VenueOrderState::Filled
        } else {
            VenueOrderState::PartiallyFilled
        };
        order.fills.push(fill.clone());

        debug!(
            "[VENUE] fill {} {} @ {} for {}",
            fill.trade_id, quantity, price, client_order_id
        );
        Ok(fill)
    }

    // ========================================================================
    // Observation (tests, demo)
    // ========================================================================

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Number of distinct orders accepted
    pub fn order_count(&self) -> usize {
        self.book.lock().orders.len()
    }

    pub fn order_state(&self, client_order_id: &str) -> Option<VenueOrderState> {
        self.book.lock().orders.get(client_order_id).map(|o| o.state)
    }

    /// Client ids of all accepted orders
    pub fn client_order_ids(&self) -> Vec<String> {
        self.book.lock().orders.keys().cloned().collect()
    }

    /// Highest number of simultaneously live orders seen for a symbol and side
    pub fn peak_live_orders(&self, symbol: &str, side: Side) -> usize {
        self.book
            .lock()
            .peak_live
            .get(&(symbol.to_string(), side))
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of submit calls seen in progress at once
    pub fn peak_concurrent_submits(&self) -> usize {
        self.peak_active_submits.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    fn accept(&self, request: &OrderRequest) -> Result<(OrderAck, Option<Fill>), VenueError> {
        if request.quantity <= Decimal::ZERO {
            return Err(VenueError::Validation("quantity must be positive".into()));
        }
        if request.order_type == OrderTypeWire::Limit && request.price.is_none() {
            return Err(VenueError::Validation("limit order without price".into()));
        }

        let mut book = self.book.lock();
        if book.orders.contains_key(&request.client_order_id) {
            return Err(VenueError::DuplicateOrder(request.client_order_id.clone()));
        }

        book.next_order += 1;
        let exchange_order_id = format!("SIM-{}", book.next_order);
        book.orders.insert(
            request.client_order_id.clone(),
            VenueOrder {
                request: request.clone(),
                exchange_order_id: exchange_order_id.clone(),
                state: VenueOrderState::Open,
                filled: Decimal::ZERO,
                fills: Vec::new(),
            },
        );
        book.exchange_index
            .insert(exchange_order_id.clone(), request.client_order_id.clone());

        let live = book.live_count(&request.symbol, request.side);
        let peak = book
            .peak_live
            .entry((request.symbol.clone(), request.side))
            .or_insert(0);
        *peak = (*peak).max(live);

        info!(
            "[VENUE] accepted {} -> {} ({} {} {})",
            request.client_order_id, exchange_order_id, request.side, request.quantity, request.symbol
        );

        let fill = match self.config.fill_mode {
            FillMode::Manual => None,
            FillMode::Immediate => {
                let price = request.price.unwrap_or(self.config.reference_price);
                Some(Self::execute(
                    &mut book,
                    &self.config,
                    &request.client_order_id,
                    request.quantity,
                    price,
                )?)
            }
        };

        Ok((
            OrderAck {
                client_order_id: request.client_order_id.clone(),
                exchange_order_id,
                accepted_at: Utc::now(),
            },
            fill,
        ))
    }

    fn apply_cancel(&self, request: &CancelRequest) -> Result<CancelAck, VenueError> {
        let mut book = self.book.lock();
        let key = book
            .resolve(&request.client_order_id, request.exchange_order_id.as_deref())
            .ok_or_else(|| VenueError::UnknownOrder(request.client_order_id.clone()))?;
        let order = book
            .orders
            .get_mut(&key)
            .ok_or_else(|| VenueError::UnknownOrder(key.clone()))?;

        if order.state.is_terminal() {
            return Err(VenueError::NotCancellable(format!(
                "order {} is {}",
                key,
                order.state.as_str()
            )));
        }
        order.state = VenueOrderState::Cancelled;

        Ok(CancelAck {
            client_order_id: key,
            exchange_order_id: Some(order.exchange_order_id.clone()),
            filled_quantity: order.filled,
        })
    }

    fn track_submit_start(&self) {
        let active = self.active_submits.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active_submits.fetch_max(active, Ordering::SeqCst);
    }

    fn track_submit_end(&self) {
        self.active_submits.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VenueClient for SimulatedVenue {
    async fn place(&self, request: &OrderRequest) -> Result<OrderAck, VenueError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.track_submit_start();
        self.simulate_latency().await;
        self.track_submit_end();

        let lose_ack = match self.faults.lock().next(VenueOp::Submit) {
            Some(Fault::Fail(e)) => return Err(e),
            Some(Fault::ApplyThenTimeout) => true,
            None => false,
        };

        let (ack, fill) = self.accept(request)?;
        if let Some(fill) = fill {
            let _ = self.events.send(VenueEvent::Fill(fill));
        }

        if lose_ack {
            return Err(VenueError::Timeout);
        }
        Ok(ack)
    }

    async fn cancel(&self, request: &CancelRequest) -> Result<CancelAck, VenueError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let lose_ack = match self.faults.lock().next(VenueOp::Cancel) {
            Some(Fault::Fail(e)) => return Err(e),
            Some(Fault::ApplyThenTimeout) => true,
            None => false,
        };

        let ack = self.apply_cancel(request)?;
        let _ = self.events.send(VenueEvent::Closed {
            client_order_id: ack.client_order_id.clone(),
            state: VenueOrderState::Cancelled,
        });

        if lose_ack {
            return Err(VenueError::Timeout);
        }
        Ok(ack)
    }

    async fn query(&self, query: &StatusQuery) -> Result<OrderStatusReport, VenueError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(Fault::Fail(e)) = self.faults.lock().next(VenueOp::Query) {
            return Err(e);
        }

        let book = self.book.lock();
        book.resolve(&query.client_order_id, query.exchange_order_id.as_deref())
            .and_then(|key| book.orders.get(&key))
            .map(VenueOrder::report)
            .ok_or_else(|| VenueError::UnknownOrder(query.client_order_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(id: &str, qty: Decimal) -> OrderRequest {
        OrderRequest::market(id, "BTC-USD", Side::Buy, qty)
    }

    #[tokio::test]
    async fn test_duplicate_client_id_is_refused() {
        let (venue, _rx) = SimulatedVenue::new(SimulatorConfig::default());

        venue.place(&market("c1", dec!(1))).await.unwrap();
        let err = venue.place(&market("c1", dec!(1))).await.unwrap_err();

        assert!(matches!(err, VenueError::DuplicateOrder(_)));
        assert_eq!(venue.order_count(), 1);
        assert_eq!(venue.submit_calls(), 2);
    }

    #[tokio::test]
    async fn test_manual_fills_are_streamed() {
        let (venue, mut rx) = SimulatedVenue::new(SimulatorConfig::default());
        venue.place(&market("c1", dec!(5))).await.unwrap();

        venue.fill("c1", dec!(3), dec!(100)).unwrap();
        assert_eq!(venue.order_state("c1"), Some(VenueOrderState::PartiallyFilled));
        venue.fill_remaining("c1", dec!(101)).unwrap();
        assert_eq!(venue.order_state("c1"), Some(VenueOrderState::Filled));

        let Some(VenueEvent::Fill(first)) = rx.recv().await else {
            panic!("expected fill");
        };
        assert_eq!(first.quantity, dec!(3));
        let Some(VenueEvent::Fill(second)) = rx.recv().await else {
            panic!("expected fill");
        };
        assert_eq!(second.quantity, dec!(2));
        assert_ne!(first.trade_id, second.trade_id);
    }

    #[tokio::test]
    async fn test_overfill_refused() {
        let (venue, _rx) = SimulatedVenue::new(SimulatorConfig::default());
        venue.place(&market("c1", dec!(2))).await.unwrap();

        assert!(venue.fill("c1", dec!(3), dec!(100)).is_err());
    }

    #[tokio::test]
    async fn test_immediate_fill_mode() {
        let config = SimulatorConfig {
            fill_mode: FillMode::Immediate,
            reference_price: dec!(250),
            ..Default::default()
        };
        let (venue, mut rx) = SimulatedVenue::new(config);
        venue.place(&market("c1", dec!(2))).await.unwrap();

        let Some(VenueEvent::Fill(fill)) = rx.recv().await else {
            panic!("expected fill");
        };
        assert_eq!(fill.price, dec!(250));
        assert_eq!(venue.order_state("c1"), Some(VenueOrderState::Filled));
    }

    #[tokio::test]
    async fn test_apply_then_timeout_keeps_order() {
        let (venue, _rx) = SimulatedVenue::new(SimulatorConfig::default());
        venue.inject(VenueOp::Submit, Fault::ApplyThenTimeout, 1);

        let err = venue.place(&market("c1", dec!(1))).await.unwrap_err();
        assert_eq!(err, VenueError::Timeout);
        assert_eq!(venue.order_state("c1"), Some(VenueOrderState::Open));
    }

    #[tokio::test]
    async fn test_cancel_filled_order_refused() {
        let (venue, _rx) = SimulatedVenue::new(SimulatorConfig::default());
        venue.place(&market("c1", dec!(1))).await.unwrap();
        venue.fill("c1", dec!(1), dec!(100)).unwrap();

        let err = venue
            .cancel(&CancelRequest {
                client_order_id: "c1".into(),
                exchange_order_id: None,
                symbol: "BTC-USD".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VenueError::NotCancellable(_)));
    }
}
