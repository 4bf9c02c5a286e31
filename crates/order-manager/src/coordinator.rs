//! Execution Coordinator
//!
//! Entry point for strategy signals and exchange fills. Admission is
//! synchronous (validate, risk-check, reserve, create); everything after it
//! runs on a per-order driver task.
//!
//! Locking:
//! - one admission lock per symbol, held only across the synchronous
//!   check-and-reserve step (never across an await)
//! - one async lock per order around every state machine call; exchange
//!   calls are made with it released
//! - a cancel request sets a flag outside the order lock, so it is seen by
//!   the driver even while a submission is outstanding

use aegis_clock::SystemClock;
use aegis_core::{
    ExecutionEvent, Fill, IntentKey, Order, OrderId, OrderStatus, RejectionReason, Signal,
    Timestamp, Trade,
};
use aegis_gateway::{
    CancelRequest, ExchangeClient, ExchangeError, OrderAck, OrderRequest, StatusQuery,
    VenueEvent, VenueOrderState,
};
use aegis_ports::{Clock, EventSink, RiskProfileSource};
use aegis_risk_manager::{RiskContext, RiskDecision, RiskGate};
use dashmap::DashMap;
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{CoordinatorConfig, DuplicatePolicy};
use crate::error::{ExecutionError, OrderError, Result};
use crate::ledger::{PositionLedger, RiskMetrics};
use crate::reservations::ExposureReservations;
use crate::state_machine::{CancelAction, FillOutcome, OrderStateMachine, StatusChange};

/// What admission did with a signal
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    /// A new order was created and handed to its driver
    Admitted(OrderId),
    /// Folded into the pending quantity behind an in-flight order
    Coalesced { into: OrderId },
    /// Refused; no order exists and the exchange was never contacted
    Rejected(RejectionReason),
}

impl SignalOutcome {
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            SignalOutcome::Admitted(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, SignalOutcome::Admitted(_))
    }
}

// ============================================================================
// Internal state
// ============================================================================

struct OrderHandle {
    order_id: OrderId,
    signal: Signal,
    machine: tokio::sync::Mutex<OrderStateMachine>,
    cancel_requested: AtomicBool,
    /// An exchange cancel (with its retries) is outstanding
    cancel_sending: AtomicBool,
    status: watch::Sender<OrderStatus>,
    holds_slot: bool,
    finalized: AtomicBool,
}

impl OrderHandle {
    fn current_status(&self) -> OrderStatus {
        *self.status.borrow()
    }
}

/// The non-terminal order occupying an intent, plus any coalesced quantity
/// waiting behind it
struct IntentSlot {
    order_id: OrderId,
    parked: Option<Signal>,
    /// Reservation key for the parked quantity
    parked_key: Uuid,
}

struct Inner {
    config: CoordinatorConfig,
    exchange: Arc<dyn ExchangeClient>,
    profiles: Arc<dyn RiskProfileSource>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    gate: RiskGate,
    ledger: Arc<PositionLedger>,
    reservations: ExposureReservations,
    orders: DashMap<OrderId, Arc<OrderHandle>>,
    by_client_id: DashMap<String, OrderId>,
    by_exchange_id: DashMap<String, OrderId>,
    in_flight: DashMap<IntentKey, IntentSlot>,
    admission: DashMap<String, Arc<parking_lot::Mutex<()>>>,
    accepting: AtomicBool,
    poller: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

// ============================================================================
// Builder
// ============================================================================

pub struct CoordinatorBuilder {
    exchange: Arc<dyn ExchangeClient>,
    profiles: Arc<dyn RiskProfileSource>,
    sink: Arc<dyn EventSink>,
    config: CoordinatorConfig,
    clock: Option<Arc<dyn Clock>>,
    gate: Option<RiskGate>,
    ledger: Option<Arc<PositionLedger>>,
}

impl CoordinatorBuilder {
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_gate(mut self, gate: RiskGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Share an existing ledger (e.g. one already carrying positions)
    pub fn with_ledger(mut self, ledger: Arc<PositionLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn build(self) -> ExecutionCoordinator {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let gate = self.gate.unwrap_or_default();

        info!(
            "[ORDER] coordinator ready: policy {:?}, checks {:?}, clock {}",
            self.config.duplicate_policy,
            gate.check_names(),
            clock.name()
        );

        ExecutionCoordinator {
            inner: Arc::new(Inner {
                config: self.config,
                exchange: self.exchange,
                profiles: self.profiles,
                sink: self.sink,
                clock,
                gate,
                ledger: self.ledger.unwrap_or_default(),
                reservations: ExposureReservations::new(),
                orders: DashMap::new(),
                by_client_id: DashMap::new(),
                by_exchange_id: DashMap::new(),
                in_flight: DashMap::new(),
                admission: DashMap::new(),
                accepting: AtomicBool::new(true),
                poller: parking_lot::Mutex::new(None),
            }),
        }
    }
}

// ============================================================================
// Public surface
// ============================================================================

/// Turns signals into exchange orders under pre-trade risk control.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ExecutionCoordinator {
    inner: Arc<Inner>,
}

impl ExecutionCoordinator {
    pub fn builder(
        exchange: Arc<dyn ExchangeClient>,
        profiles: Arc<dyn RiskProfileSource>,
        sink: Arc<dyn EventSink>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            exchange,
            profiles,
            sink,
            config: CoordinatorConfig::default(),
            clock: None,
            gate: None,
            ledger: None,
        }
    }

    /// Admit or refuse a signal.
    ///
    /// Must be called inside a Tokio runtime: an admitted order's driver is
    /// spawned before this returns.
    pub fn handle_signal(&self, signal: Signal) -> SignalOutcome {
        self.inner.admit(signal)
    }

    /// Apply an exchange fill to the order it belongs to.
    ///
    /// Returns the new trade, or `None` for a fill already applied.
    pub async fn apply_fill(&self, fill: Fill) -> Result<Option<Trade>> {
        self.inner.apply_fill(fill).await
    }

    pub async fn cancel_order(&self, order_id: OrderId) -> Result<CancelAction> {
        self.inner.cancel(order_id).await
    }

    /// Query the exchange and bring the order in line with what it reports
    pub async fn reconcile_order(&self, order_id: OrderId) -> Result<OrderStatus> {
        let handle = self.inner.handle(order_id)?;
        self.inner.reconcile(&handle).await
    }

    /// Wait until the order reaches a terminal status
    pub async fn wait_for_terminal(&self, order_id: OrderId, within: Duration) -> Result<Order> {
        let handle = self.inner.handle(order_id)?;
        let mut status = handle.status.subscribe();

        let settled = async {
            loop {
                if status.borrow_and_update().is_terminal() {
                    return;
                }
                if status.changed().await.is_err() {
                    return;
                }
            }
        };
        tokio::time::timeout(within, settled)
            .await
            .map_err(|_| ExecutionError::WaitTimeout(order_id))?;

        Ok(handle.machine.lock().await.order().clone())
    }

    pub async fn order(&self, order_id: OrderId) -> Option<Order> {
        let handle = self.inner.orders.get(&order_id).map(|h| h.value().clone())?;
        let machine = handle.machine.lock().await;
        Some(machine.order().clone())
    }

    pub async fn trades(&self, order_id: OrderId) -> Vec<Trade> {
        match self.inner.handle(order_id) {
            Ok(handle) => handle.machine.lock().await.trades().to_vec(),
            Err(_) => Vec::new(),
        }
    }

    pub async fn history(&self, order_id: OrderId) -> Vec<StatusChange> {
        match self.inner.handle(order_id) {
            Ok(handle) => handle.machine.lock().await.history().to_vec(),
            Err(_) => Vec::new(),
        }
    }

    /// Orders not yet in a terminal status
    pub async fn open_orders(&self) -> Vec<Order> {
        let handles: Vec<_> = self
            .inner
            .orders
            .iter()
            .filter(|h| !h.current_status().is_terminal())
            .map(|h| h.value().clone())
            .collect();

        let mut orders = Vec::with_capacity(handles.len());
        for handle in handles {
            orders.push(handle.machine.lock().await.order().clone());
        }
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    /// Forget finished orders whose last update is older than `retention`.
    ///
    /// A late fill for a forgotten order is reported as unroutable. Returns
    /// how many orders were dropped.
    pub async fn prune_finished(&self, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = self.inner.now() - retention;

        let finished: Vec<_> = self
            .inner
            .orders
            .iter()
            .filter(|h| h.finalized.load(Ordering::Acquire))
            .map(|h| h.value().clone())
            .collect();

        let mut pruned = 0;
        for handle in finished {
            let order = handle.machine.lock().await.order().clone();
            if !order.is_terminal() || order.last_updated_at > cutoff {
                continue;
            }
            self.inner.orders.remove(&handle.order_id);
            self.inner.by_client_id.remove(&order.client_order_id());
            if let Some(exchange_id) = &order.exchange_order_id {
                self.inner.by_exchange_id.remove(exchange_id);
            }
            pruned += 1;
        }

        if pruned > 0 {
            info!("[ORDER] pruned {} finished orders", pruned);
        }
        pruned
    }

    /// The order currently occupying an intent, if any
    pub fn in_flight(&self, intent: &IntentKey) -> Option<OrderId> {
        self.inner.in_flight.get(intent).map(|slot| slot.order_id)
    }

    /// Quantity coalesced behind the in-flight order for an intent
    pub fn parked_quantity(&self, intent: &IntentKey) -> Decimal {
        self.inner
            .in_flight
            .get(intent)
            .and_then(|slot| slot.parked.as_ref().map(|s| s.quantity))
            .unwrap_or(Decimal::ZERO)
    }

    /// Signed exposure of admitted-but-unfilled quantity for a symbol
    pub fn reserved_exposure(&self, symbol: &str) -> Decimal {
        self.inner.reservations.reserved(symbol)
    }

    pub fn ledger(&self) -> Arc<PositionLedger> {
        self.inner.ledger.clone()
    }

    /// Account-level risk figures for the clock's current day
    pub fn risk_metrics(&self) -> RiskMetrics {
        self.inner.ledger.risk_metrics(self.inner.clock.now().date_naive())
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire)
    }

    /// Accept signals and start the status poll loop (if configured)
    pub fn start(&self) {
        self.inner.accepting.store(true, Ordering::Release);

        let Some(interval) = self.inner.config.status_poll_interval() else {
            return;
        };
        let mut poller = self.inner.poller.lock();
        if poller.is_some() {
            return;
        }

        let inner = self.inner.clone();
        *poller = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                inner.poll_working_orders().await;
            }
        }));
        info!("[ORDER] status polling every {:?}", interval);
    }

    /// Refuse new signals and stop polling. In-flight orders keep their
    /// drivers and still accept fills and cancels.
    pub fn stop(&self) {
        self.inner.accepting.store(false, Ordering::Release);
        if let Some(poller) = self.inner.poller.lock().take() {
            poller.abort();
        }
        info!("[ORDER] coordinator stopped accepting signals");
    }

    /// Consume signals from a channel with a fixed pool of workers.
    ///
    /// Signals for the same intent always land on the same worker, so they
    /// are admitted in arrival order.
    pub fn run_intake(&self, mut signals: mpsc::Receiver<Signal>) -> JoinHandle<()> {
        let workers = self.inner.config.worker_count.max(1);
        let capacity = self.inner.config.intake_capacity.max(1);

        let mut lanes = Vec::with_capacity(workers);
        let mut tasks = Vec::with_capacity(workers);
        for worker in 0..workers {
            let (tx, mut rx) = mpsc::channel::<Signal>(capacity);
            let coordinator = self.clone();
            lanes.push(tx);
            tasks.push(tokio::spawn(async move {
                while let Some(signal) = rx.recv().await {
                    let outcome = coordinator.handle_signal(signal);
                    debug!("[ORDER] intake worker {}: {:?}", worker, outcome);
                }
            }));
        }

        tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                let lane = lane_for(&signal.intent_key(), workers);
                if lanes[lane].send(signal).await.is_err() {
                    warn!("[ORDER] intake worker {} gone; stopping intake", lane);
                    break;
                }
            }
            drop(lanes);
            for task in tasks {
                let _ = task.await;
            }
        })
    }

    /// Route venue fills and close notices into the coordinator
    pub fn run_venue_feed(
        &self,
        mut events: mpsc::UnboundedReceiver<VenueEvent>,
    ) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    VenueEvent::Fill(fill) => {
                        if let Err(e) = coordinator.apply_fill(fill).await {
                            warn!("[ORDER] fill not applied: {}", e);
                        }
                    }
                    VenueEvent::Closed {
                        client_order_id,
                        state,
                    } => {
                        let Some(order_id) = coordinator
                            .inner
                            .by_client_id
                            .get(&client_order_id)
                            .map(|id| *id)
                        else {
                            debug!("[ORDER] close notice for unknown order {}", client_order_id);
                            continue;
                        };
                        debug!("[ORDER] venue closed {} ({})", client_order_id, state.as_str());
                        if let Err(e) = coordinator.reconcile_order(order_id).await {
                            warn!("[ORDER] reconcile of {} failed: {}", order_id, e);
                        }
                    }
                }
            }
        })
    }
}

fn lane_for(intent: &IntentKey, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    intent.hash(&mut hasher);
    (hasher.finish() % lanes as u64) as usize
}

// ============================================================================
// Admission
// ============================================================================

impl Inner {
    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn handle(&self, order_id: OrderId) -> Result<Arc<OrderHandle>> {
        self.orders
            .get(&order_id)
            .map(|h| h.value().clone())
            .ok_or(ExecutionError::UnknownOrder(order_id))
    }

    fn admission_lock(&self, symbol: &str) -> Arc<parking_lot::Mutex<()>> {
        if let Some(lock) = self.admission.get(symbol) {
            return lock.clone();
        }
        self.admission
            .entry(symbol.to_string())
            .or_default()
            .clone()
    }

    /// Position, pending exposure and account P&L as the gate sees them
    fn risk_context(&self, symbol: &str, exclude: Option<OrderId>) -> RiskContext {
        let mut held_symbols = self.ledger.held_symbols();
        held_symbols.extend(self.reservations.symbols());

        RiskContext {
            position: self.ledger.snapshot(symbol),
            reserved: self.reservations.reserved_excluding(symbol, exclude),
            held_symbols,
            daily_pnl: self.ledger.daily_pnl(self.now().date_naive()),
            consecutive_losses: self.ledger.consecutive_losses(),
        }
    }

    fn refuse(&self, signal: Signal, reason: RejectionReason) -> SignalOutcome {
        info!(
            "[RISK] {} {} {} from {} rejected: {}",
            signal.side, signal.quantity, signal.symbol, signal.strategy_id, reason
        );
        self.sink.publish(ExecutionEvent::OrderRejected {
            order: None,
            signal,
            reason: reason.clone(),
        });
        SignalOutcome::Rejected(reason)
    }

    fn admit(self: &Arc<Self>, signal: Signal) -> SignalOutcome {
        if !self.accepting.load(Ordering::Acquire) {
            return self.refuse(signal, RejectionReason::CoordinatorStopped);
        }
        if signal.quantity <= Decimal::ZERO {
            return self.refuse(signal, RejectionReason::InvalidQuantity);
        }
        let Some(profile) = self.profiles.profile(&signal.strategy_id) else {
            return self.refuse(signal, RejectionReason::UnknownStrategy);
        };

        let intent = signal.intent_key();
        let policy = self.config.duplicate_policy;

        let lock = self.admission_lock(&signal.symbol);
        let guard = lock.lock();

        let occupant = match policy {
            DuplicatePolicy::Allow => None,
            _ => self.in_flight.get(&intent).map(|slot| slot.order_id),
        };

        if let Some(existing) = occupant {
            if policy == DuplicatePolicy::Reject {
                drop(guard);
                debug!("[ORDER] {} already working as {}", intent, existing);
                return self.refuse(signal, RejectionReason::DuplicateInFlight);
            }

            let context = self.risk_context(&signal.symbol, None);
            if let RiskDecision::Reject(reason) = self.gate.evaluate(&signal, &profile, &context) {
                drop(guard);
                return self.refuse(signal, reason.into());
            }

            if let Some(mut slot) = self.in_flight.get_mut(&intent) {
                self.reservations
                    .reserve(slot.parked_key, &signal.symbol, signal.signed_quantity());
                match slot.parked.as_mut() {
                    Some(parked) => {
                        parked.quantity += signal.quantity;
                        parked.target_price = signal.target_price;
                        parked.timestamp = signal.timestamp;
                    }
                    None => slot.parked = Some(signal.clone()),
                }
            }
            drop(guard);

            info!(
                "[ORDER] {} {} coalesced behind {}",
                intent, signal.quantity, existing
            );
            return SignalOutcome::Coalesced { into: existing };
        }

        let context = self.risk_context(&signal.symbol, None);
        if let RiskDecision::Reject(reason) = self.gate.evaluate(&signal, &profile, &context) {
            drop(guard);
            return self.refuse(signal, reason.into());
        }

        let order = Order::from_signal(&signal, signal.quantity, self.now());
        let order_id = order.order_id;
        self.reservations.reserve(
            order_id,
            &order.symbol,
            order.side.signed(order.requested_quantity),
        );

        let (status, _) = watch::channel(order.status);
        let handle = Arc::new(OrderHandle {
            order_id,
            signal,
            machine: tokio::sync::Mutex::new(OrderStateMachine::new(order.clone())),
            cancel_requested: AtomicBool::new(false),
            cancel_sending: AtomicBool::new(false),
            status,
            holds_slot: policy != DuplicatePolicy::Allow,
            finalized: AtomicBool::new(false),
        });

        self.orders.insert(order_id, handle.clone());
        self.by_client_id.insert(order.client_order_id(), order_id);
        if handle.holds_slot {
            self.in_flight.insert(
                intent,
                IntentSlot {
                    order_id,
                    parked: None,
                    parked_key: Uuid::new_v4(),
                },
            );
        }
        drop(guard);

        info!(
            "[ORDER] admitted {} {} {} {} for {}",
            order_id, order.side, order.requested_quantity, order.symbol, order.strategy_id
        );
        self.sink.publish(ExecutionEvent::OrderAdmitted { order });

        let inner = self.clone();
        tokio::spawn(async move {
            inner.drive(&handle).await;
        });

        SignalOutcome::Admitted(order_id)
    }

    /// Re-run the gate just before first submission, against state that
    /// may have moved since admission. The order's own reservation is
    /// left out so it is not counted twice.
    fn recheck(&self, handle: &OrderHandle) -> Option<RejectionReason> {
        let signal = &handle.signal;
        let Some(profile) = self.profiles.profile(&signal.strategy_id) else {
            return Some(RejectionReason::UnknownStrategy);
        };

        let lock = self.admission_lock(&signal.symbol);
        let _guard = lock.lock();
        let context = self.risk_context(&signal.symbol, Some(handle.order_id));
        match self.gate.evaluate(signal, &profile, &context) {
            RiskDecision::Admit => None,
            RiskDecision::Reject(reason) => Some(reason.into()),
        }
    }

    // ========================================================================
    // Order driver
    // ========================================================================

    async fn drive(self: &Arc<Self>, handle: &Arc<OrderHandle>) {
        let mut machine = handle.machine.lock().await;
        if machine.status() != OrderStatus::Created {
            return;
        }

        let cancelled = handle.cancel_requested.load(Ordering::Acquire);
        let refused = if cancelled { None } else { self.recheck(handle) };
        if cancelled || refused.is_some() {
            if let Err(e) = machine.request_cancel(self.now()) {
                let event = self.abort(handle, &mut machine, &e);
                drop(machine);
                if let Some(event) = event {
                    self.finalize(handle, event);
                }
                return;
            }
            let order = machine.order().clone();
            drop(machine);

            let event = match refused {
                Some(reason) => {
                    info!("[RISK] {} refused before submission: {}", handle.order_id, reason);
                    ExecutionEvent::OrderRejected {
                        order: Some(order),
                        signal: handle.signal.clone(),
                        reason,
                    }
                }
                None => ExecutionEvent::OrderCancelled { order },
            };
            self.finalize(handle, event);
            return;
        }

        if let Err(e) = machine.begin_submit(self.now()) {
            let event = self.abort(handle, &mut machine, &e);
            drop(machine);
            if let Some(event) = event {
                self.finalize(handle, event);
            }
            return;
        }
        let request = OrderRequest::for_order(machine.order());
        handle.status.send_replace(machine.status());
        drop(machine);

        if self.submit_with_retry(handle, &request).await {
            self.send_cancel(handle).await;
        }
    }

    /// Submit until acked, rejected or out of attempts. Returns true when
    /// the exchange knows the order and a cancel was requested while the
    /// submission was outstanding.
    async fn submit_with_retry(
        self: &Arc<Self>,
        handle: &Arc<OrderHandle>,
        request: &OrderRequest,
    ) -> bool {
        let mut backoff = self.config.retry.backoff();

        loop {
            let attempt = backoff.record_attempt();
            debug!(
                "[EXCHANGE] submit {} attempt {}",
                request.client_order_id, attempt
            );

            let result = match tokio::time::timeout(
                self.config.submit_timeout(),
                self.exchange.submit_order(request),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ExchangeError::transient("submit timed out")),
            };

            match result {
                Ok(ack) => return self.on_submitted(handle, ack).await,
                Err(ExchangeError::Rejected { reason }) => {
                    self.on_submit_rejected(handle, &reason).await;
                    return false;
                }
                Err(ExchangeError::Transient { cause }) => {
                    if !backoff.can_retry() {
                        let reason =
                            format!("submission failed after {} attempts: {}", attempt, cause);
                        self.fail_order(handle, reason).await;
                        return false;
                    }

                    let delay = backoff.next_delay();
                    warn!(
                        "[EXCHANGE] submit {} attempt {} failed ({}); retrying in {:?}",
                        request.client_order_id, attempt, cause, delay
                    );
                    tokio::time::sleep(delay).await;

                    let mut machine = handle.machine.lock().await;
                    match machine.status() {
                        OrderStatus::Submitting => {}
                        OrderStatus::Cancelling if machine.order().exchange_order_id.is_none() => {
                            // Cancelled while backing off: never submit again
                            drop(machine);
                            self.resolve_unsent_cancel(handle).await;
                            return false;
                        }
                        status => {
                            // A fill or reconcile already established the order
                            debug!(
                                "[ORDER] {} resolved while backing off ({})",
                                handle.order_id, status
                            );
                            return status == OrderStatus::Cancelling;
                        }
                    }
                    if let Err(e) = machine.record_retry(self.now()) {
                        let event = self.abort(handle, &mut machine, &e);
                        drop(machine);
                        if let Some(event) = event {
                            self.finalize(handle, event);
                        }
                        return false;
                    }
                }
            }
        }
    }

    async fn on_submitted(self: &Arc<Self>, handle: &Arc<OrderHandle>, ack: OrderAck) -> bool {
        let mut machine = handle.machine.lock().await;
        match machine.on_ack(&ack.exchange_order_id, self.now()) {
            Ok(_) => {
                self.by_exchange_id
                    .insert(ack.exchange_order_id.clone(), handle.order_id);
                handle.status.send_replace(machine.status());
                info!(
                    "[ORDER] {} working as {} ({} retries)",
                    handle.order_id,
                    ack.exchange_order_id,
                    machine.order().retry_count
                );
                machine.status() == OrderStatus::Cancelling
            }
            Err(e) => {
                let event = self.abort(handle, &mut machine, &e);
                drop(machine);
                if let Some(event) = event {
                    self.finalize(handle, event);
                }
                false
            }
        }
    }

    async fn on_submit_rejected(self: &Arc<Self>, handle: &Arc<OrderHandle>, reason: &str) {
        let mut machine = handle.machine.lock().await;
        let event = match machine.on_exchange_reject(reason, self.now()) {
            Ok(OrderStatus::Cancelled) => ExecutionEvent::OrderCancelled {
                order: machine.order().clone(),
            },
            Ok(_) => {
                warn!("[ORDER] {} rejected by exchange: {}", handle.order_id, reason);
                ExecutionEvent::OrderRejected {
                    order: Some(machine.order().clone()),
                    signal: handle.signal.clone(),
                    reason: RejectionReason::Exchange(reason.to_string()),
                }
            }
            Err(e) => match self.abort(handle, &mut machine, &e) {
                Some(event) => event,
                None => return,
            },
        };
        drop(machine);
        self.finalize(handle, event);
    }

    /// A cancel arrived while submission was backing off. Every earlier
    /// attempt failed from our side, but one may still have reached the
    /// venue, so ask the venue before deciding.
    async fn resolve_unsent_cancel(self: &Arc<Self>, handle: &Arc<OrderHandle>) {
        let mut backoff = self.config.retry.backoff();

        loop {
            let attempt = backoff.record_attempt();
            match self.reconcile(handle).await {
                // Known to the venue; reconcile recorded it and sends the cancel
                Ok(status) => {
                    debug!(
                        "[ORDER] {} found at venue while cancelling ({})",
                        handle.order_id, status
                    );
                    return;
                }
                Err(ExecutionError::Exchange(ExchangeError::Rejected { reason })) => {
                    info!(
                        "[ORDER] {} never reached the venue ({}); cancelled locally",
                        handle.order_id, reason
                    );
                    self.confirm_cancelled(handle).await;
                    return;
                }
                Err(ExecutionError::Exchange(ExchangeError::Transient { cause })) => {
                    if !backoff.can_retry() {
                        let reason = format!(
                            "cancel unresolved after {} status queries: {}",
                            attempt, cause
                        );
                        self.fail_order(handle, reason).await;
                        return;
                    }
                    tokio::time::sleep(backoff.next_delay()).await;
                }
                Err(e) => {
                    warn!("[ORDER] {} status query failed: {}", handle.order_id, e);
                    return;
                }
            }
        }
    }

    async fn fail_order(self: &Arc<Self>, handle: &Arc<OrderHandle>, reason: String) {
        let mut machine = handle.machine.lock().await;
        match machine.fail(reason.clone(), self.now()) {
            Ok(true) => {
                warn!("[ORDER] {} {}", handle.order_id, reason);
                let order = machine.order().clone();
                drop(machine);
                self.finalize(handle, ExecutionEvent::OrderFailed { order, reason });
            }
            Ok(false) => {}
            Err(e) => {
                let event = self.abort(handle, &mut machine, &e);
                drop(machine);
                if let Some(event) = event {
                    self.finalize(handle, event);
                }
            }
        }
    }

    /// End one order after an invariant violation. Nothing else is touched.
    fn abort(
        &self,
        handle: &OrderHandle,
        machine: &mut OrderStateMachine,
        violation: &OrderError,
    ) -> Option<ExecutionEvent> {
        error!("[ORDER] {} invariant violated: {}", handle.order_id, violation);
        let reason = violation.to_string();
        match machine.fail(reason.clone(), self.now()) {
            Ok(true) => Some(ExecutionEvent::OrderFailed {
                order: machine.order().clone(),
                reason,
            }),
            _ => None,
        }
    }

    // ========================================================================
    // Fills and reconciliation
    // ========================================================================

    fn route(&self, fill: &Fill) -> Option<OrderId> {
        if let Some(id) = fill
            .client_order_id
            .as_ref()
            .and_then(|c| self.by_client_id.get(c))
        {
            return Some(*id);
        }
        fill.exchange_order_id
            .as_ref()
            .and_then(|x| self.by_exchange_id.get(x))
            .map(|id| *id)
    }

    fn book_trade(&self, order_id: OrderId, trade: &Trade) {
        if self.ledger.apply_trade(trade).is_some() {
            self.reservations.consume(order_id, trade.signed_quantity());
        }
    }

    async fn apply_fill(self: &Arc<Self>, fill: Fill) -> Result<Option<Trade>> {
        let order_id = self.route(&fill).ok_or_else(|| ExecutionError::UnroutableFill {
            trade_id: fill.trade_id.clone(),
        })?;
        let handle = self.handle(order_id)?;

        let mut machine = handle.machine.lock().await;
        let before = machine.status();
        match machine.apply_fill(&fill, self.now()) {
            Ok(FillOutcome::Duplicate) => {
                debug!("[ORDER] {} duplicate fill {}", order_id, fill.trade_id);
                Ok(None)
            }
            Ok(FillOutcome::Applied(trade)) => {
                self.book_trade(order_id, &trade);
                if before.is_terminal() {
                    warn!(
                        "[ORDER] late fill {} on {} order {}",
                        trade.trade_id, before, order_id
                    );
                }
                let order = machine.order().clone();
                drop(machine);

                self.publish_progress(&handle, before, order, vec![trade.clone()], None);
                Ok(Some(trade))
            }
            Err(e) => {
                let event = self.abort(&handle, &mut machine, &e);
                drop(machine);
                if let Some(event) = event {
                    self.finalize(&handle, event);
                }
                Err(e.into())
            }
        }
    }

    // Boxed with an explicit `Send` bound to break the reconcile <-> send_cancel
    // async cycle, which the compiler cannot otherwise prove `Send`.
    fn reconcile_boxed<'a>(
        self: &'a Arc<Self>,
        handle: &'a Arc<OrderHandle>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<OrderStatus>> + Send + 'a>> {
        Box::pin(self.reconcile(handle))
    }

    async fn reconcile(self: &Arc<Self>, handle: &Arc<OrderHandle>) -> Result<OrderStatus> {
        let query = {
            let machine = handle.machine.lock().await;
            if machine.status() == OrderStatus::Created {
                return Ok(OrderStatus::Created);
            }
            StatusQuery::for_order(machine.order())
        };
        let report = self.exchange.query_order_status(&query).await?;

        let mut machine = handle.machine.lock().await;
        let before = machine.status();
        match machine.reconcile(&report, self.now()) {
            Ok(trades) => {
                for trade in &trades {
                    self.book_trade(handle.order_id, trade);
                }
                let order = machine.order().clone();
                let reason = machine.failure_reason().map(str::to_string);
                drop(machine);

                if order.status != before || !trades.is_empty() {
                    info!(
                        "[ORDER] reconciled {}: {} -> {} ({} missed fills)",
                        handle.order_id,
                        before,
                        order.status,
                        trades.len()
                    );
                }
                let status = order.status;
                let resend = status == OrderStatus::Cancelling
                    && order.exchange_order_id.is_some()
                    && matches!(
                        report.state,
                        VenueOrderState::Open | VenueOrderState::PartiallyFilled
                    )
                    && !handle.cancel_sending.load(Ordering::Acquire);
                self.publish_progress(handle, before, order, trades, reason);

                if resend {
                    info!(
                        "[ORDER] {} still live at venue while cancelling; resending cancel",
                        handle.order_id
                    );
                    let inner = self.clone();
                    let handle = handle.clone();
                    tokio::spawn(async move {
                        inner.send_cancel(&handle).await;
                    });
                }
                Ok(status)
            }
            Err(e) => {
                let event = self.abort(handle, &mut machine, &e);
                drop(machine);
                if let Some(event) = event {
                    self.finalize(handle, event);
                }
                Err(e.into())
            }
        }
    }

    /// Publish what a batch of trades (and possibly a status change) did
    /// to an order; terminal changes go through `finalize`.
    fn publish_progress(
        self: &Arc<Self>,
        handle: &Arc<OrderHandle>,
        before: OrderStatus,
        order: Order,
        mut trades: Vec<Trade>,
        reason: Option<String>,
    ) {
        if let Some(exchange_id) = &order.exchange_order_id {
            self.by_exchange_id.insert(exchange_id.clone(), handle.order_id);
        }

        let completed = order.status == OrderStatus::Filled && before != OrderStatus::Filled;
        let last = if completed { trades.pop() } else { None };

        for trade in trades {
            self.sink.publish(ExecutionEvent::OrderPartiallyFilled {
                order: order.clone(),
                trade,
            });
        }

        let ended = order.status.is_terminal() && !before.is_terminal();
        if !ended {
            handle.status.send_replace(order.status);
            return;
        }

        let event = match (order.status, last) {
            (OrderStatus::Filled, Some(trade)) => ExecutionEvent::OrderFilled { order, trade },
            (OrderStatus::Cancelled, _) => ExecutionEvent::OrderCancelled { order },
            (OrderStatus::Failed, _) => ExecutionEvent::OrderFailed {
                order,
                reason: reason.unwrap_or_default(),
            },
            _ => ExecutionEvent::OrderRejected {
                order: Some(order),
                signal: handle.signal.clone(),
                reason: RejectionReason::Exchange(reason.unwrap_or_default()),
            },
        };
        self.finalize(handle, event);
    }

    async fn poll_working_orders(self: &Arc<Self>) {
        let working: Vec<_> = self
            .orders
            .iter()
            .filter(|h| h.current_status().is_working())
            .map(|h| h.value().clone())
            .collect();

        for handle in working {
            if let Err(e) = self.reconcile(&handle).await {
                debug!("[ORDER] poll of {} failed: {}", handle.order_id, e);
            }
        }
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    async fn cancel(self: &Arc<Self>, order_id: OrderId) -> Result<CancelAction> {
        let handle = self.handle(order_id)?;
        handle.cancel_requested.store(true, Ordering::Release);

        let mut machine = handle.machine.lock().await;
        let action = match machine.request_cancel(self.now()) {
            Ok(action) => action,
            Err(e) => {
                let event = self.abort(&handle, &mut machine, &e);
                drop(machine);
                if let Some(event) = event {
                    self.finalize(&handle, event);
                }
                return Err(e.into());
            }
        };
        let order = machine.order().clone();
        drop(machine);

        match action {
            CancelAction::CancelLocally => {
                info!("[ORDER] {} cancelled before submission", order_id);
                self.finalize(&handle, ExecutionEvent::OrderCancelled { order });
            }
            CancelAction::SendToExchange if order.exchange_order_id.is_some() => {
                handle.status.send_replace(order.status);
                self.send_cancel(&handle).await;
            }
            CancelAction::SendToExchange => {
                handle.status.send_replace(order.status);
                debug!("[ORDER] {} cancel deferred until submission resolves", order_id);
            }
            CancelAction::AlreadyCancelling | CancelAction::AlreadyTerminal => {}
        }
        Ok(action)
    }

    /// Issue the exchange cancel, retrying transient failures with the
    /// submit backoff. Between attempts a status query checks whether the
    /// cancel (or a fill) landed anyway. Only one cancel loop runs per order.
    async fn send_cancel(self: &Arc<Self>, handle: &Arc<OrderHandle>) {
        if handle.cancel_sending.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel_with_retry(handle).await;
        handle.cancel_sending.store(false, Ordering::Release);
    }

    async fn cancel_with_retry(self: &Arc<Self>, handle: &Arc<OrderHandle>) {
        let mut backoff = self.config.retry.backoff();

        loop {
            let request = {
                let machine = handle.machine.lock().await;
                if machine.status() != OrderStatus::Cancelling {
                    return;
                }
                CancelRequest::for_order(machine.order())
            };
            let attempt = backoff.record_attempt();

            let result = match tokio::time::timeout(
                self.config.cancel_timeout(),
                self.exchange.cancel_order(&request),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ExchangeError::transient("cancel timed out")),
            };

            let err = match result {
                Ok(ack) => {
                    let filled = self.order_filled(handle).await;
                    if ack.filled_quantity > filled {
                        debug!(
                            "[ORDER] {} cancel ack reports {} filled, {} applied so far",
                            handle.order_id, ack.filled_quantity, filled
                        );
                    }
                    self.confirm_cancelled(handle).await;
                    return;
                }
                Err(e) => e,
            };

            warn!(
                "[ORDER] cancel of {} attempt {} not confirmed ({}); querying status",
                handle.order_id, attempt, err
            );
            match self.reconcile_boxed(handle).await {
                Ok(OrderStatus::Cancelling) => {}
                Ok(_) => return,
                Err(ExecutionError::Order(_)) => return,
                Err(e) => warn!("[ORDER] status query for {} failed: {}", handle.order_id, e),
            }

            let exhausted = !err.is_transient() || !backoff.can_retry();
            if exhausted {
                let reason = match err {
                    ExchangeError::Rejected { reason } => format!("cancel refused: {}", reason),
                    ExchangeError::Transient { cause } => format!(
                        "cancel not confirmed after {} attempts: {}",
                        attempt, cause
                    ),
                };
                self.fail_order(handle, reason).await;
                return;
            }
            tokio::time::sleep(backoff.next_delay()).await;
        }
    }

    async fn order_filled(&self, handle: &OrderHandle) -> Decimal {
        handle.machine.lock().await.order().filled_quantity
    }

    /// Cancelling -> Cancelled, once the venue confirmed it or never had
    /// the order
    async fn confirm_cancelled(self: &Arc<Self>, handle: &Arc<OrderHandle>) {
        let mut machine = handle.machine.lock().await;
        match machine.on_cancel_confirmed(self.now()) {
            Ok(true) => {
                let order = machine.order().clone();
                drop(machine);
                info!("[ORDER] {} cancelled", handle.order_id);
                self.finalize(handle, ExecutionEvent::OrderCancelled { order });
            }
            Ok(false) => {}
            Err(e) => {
                let event = self.abort(handle, &mut machine, &e);
                drop(machine);
                if let Some(event) = event {
                    self.finalize(handle, event);
                }
            }
        }
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Runs once per order, on its first terminal status: drop the pending
    /// reservation, free the intent, publish, then admit anything that was
    /// coalesced behind it.
    fn finalize(self: &Arc<Self>, handle: &OrderHandle, event: ExecutionEvent) {
        if handle.finalized.swap(true, Ordering::AcqRel) {
            return;
        }

        self.reservations.release(handle.order_id);

        let parked = if handle.holds_slot {
            let lock = self.admission_lock(&handle.signal.symbol);
            let _guard = lock.lock();
            self.in_flight
                .remove_if(&handle.signal.intent_key(), |_, slot| {
                    slot.order_id == handle.order_id
                })
                .and_then(|(_, slot)| {
                    self.reservations.release(slot.parked_key);
                    slot.parked
                })
        } else {
            None
        };

        let status = event.order().map(|o| o.status);
        info!("[EVENTS] {} {}", event.kind(), handle.order_id);
        self.sink.publish(event);

        if let Some(signal) = parked {
            info!(
                "[ORDER] resubmitting {} {} coalesced behind {}",
                signal.intent_key(),
                signal.quantity,
                handle.order_id
            );
            self.admit(signal);
        }

        if let Some(status) = status {
            handle.status.send_replace(status);
        }
    }
}
