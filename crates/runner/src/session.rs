//! Scripted session
//!
//! Wires a coordinator to an in-process venue, replays the configured
//! script step by step and reports what happened.

use aegis_core::{ExecutionEvent, OrderId, OrderStatus, Position, Side, Signal};
use aegis_gateway::{ChannelEventSink, ClassifyingExchange, SimulatedVenue};
use aegis_order_manager::{ExecutionCoordinator, RiskMetrics, SignalOutcome};
use aegis_risk_manager::InMemoryProfileStore;
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{RunnerConfig, ScriptStep};

const EVENT_BUFFER: usize = 4096;
const SETTLE_POLL: Duration = Duration::from_millis(5);

/// Summary of a finished session
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    pub signals: usize,
    pub admitted: usize,
    pub coalesced: usize,
    pub rejected: usize,
    /// Event counts by kind
    pub events: BTreeMap<String, usize>,
    pub positions: Vec<Position>,
    pub metrics: Option<RiskMetrics>,
    pub submit_calls: usize,
    pub venue_orders: usize,
}

pub struct Session {
    config: RunnerConfig,
    coordinator: ExecutionCoordinator,
    venue: Arc<SimulatedVenue>,
    sink: Arc<ChannelEventSink>,
}

impl Session {
    pub fn new(config: RunnerConfig) -> Self {
        let (venue, feed) = SimulatedVenue::new(config.simulator.clone());
        let venue = Arc::new(venue);
        let (sink, _) = ChannelEventSink::pair(EVENT_BUFFER);
        let sink = Arc::new(sink);
        let profiles = Arc::new(InMemoryProfileStore::from_profiles(config.profiles.clone()));

        let coordinator = ExecutionCoordinator::builder(
            Arc::new(ClassifyingExchange::new(venue.clone())),
            profiles,
            sink.clone(),
        )
        .with_config(config.coordinator.clone())
        .build();
        coordinator.run_venue_feed(feed);

        Self {
            config,
            coordinator,
            venue,
            sink,
        }
    }

    pub fn coordinator(&self) -> &ExecutionCoordinator {
        &self.coordinator
    }

    pub fn venue(&self) -> &Arc<SimulatedVenue> {
        &self.venue
    }

    /// Replay the script, then stop the coordinator and report
    pub async fn run(self) -> SessionReport {
        let mut events = self.sink.subscribe();
        let mut report = SessionReport::default();

        self.coordinator.start();
        info!(
            "[SESSION] replaying {} steps against {} strategies",
            self.config.script.len(),
            self.config.profiles.len()
        );

        for (i, step) in self.config.script.iter().enumerate() {
            self.step(i, step, &mut report).await;
        }

        self.coordinator.stop();

        while let Some(event) = events.try_next() {
            log_event(&event);
            *report.events.entry(event.kind().to_string()).or_default() += 1;
        }

        let ledger = self.coordinator.ledger();
        let mut positions = ledger.positions();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        report.positions = positions;
        report.metrics = Some(self.coordinator.risk_metrics());
        report.submit_calls = self.venue.submit_calls();
        report.venue_orders = self.venue.order_count();
        report
    }

    async fn step(&self, index: usize, step: &ScriptStep, report: &mut SessionReport) {
        match step {
            ScriptStep::Signal {
                strategy,
                symbol,
                side,
                quantity,
                price,
            } => {
                let mut signal = Signal::new(strategy.as_str(), symbol.as_str(), *side, *quantity);
                if let Some(price) = price {
                    signal = signal.with_target_price(*price);
                }

                report.signals += 1;
                match self.coordinator.handle_signal(signal) {
                    SignalOutcome::Admitted(order_id) => {
                        report.admitted += 1;
                        self.settle(order_id).await;
                    }
                    SignalOutcome::Coalesced { .. } => report.coalesced += 1,
                    SignalOutcome::Rejected(reason) => {
                        report.rejected += 1;
                        info!("[SESSION] step {}: signal rejected ({})", index, reason);
                    }
                }
            }
            ScriptStep::Fill {
                strategy,
                symbol,
                side,
                quantity,
                price,
            } => {
                let Some(order_id) = self.working_order(strategy, symbol, *side).await else {
                    warn!("[SESSION] step {}: nothing working to fill", index);
                    return;
                };
                let Some(order) = self.coordinator.order(order_id).await else {
                    return;
                };
                let client_id = order.client_order_id();
                let executed = match quantity {
                    Some(quantity) => self.venue.fill(&client_id, *quantity, *price),
                    None => self.venue.fill_remaining(&client_id, *price),
                };
                match executed {
                    // Also arrives via the venue feed; the second copy is ignored
                    Ok(fill) => {
                        if let Err(e) = self.coordinator.apply_fill(fill).await {
                            warn!("[SESSION] step {}: fill not applied: {}", index, e);
                        }
                    }
                    Err(e) => warn!("[SESSION] step {}: venue refused fill: {}", index, e),
                }
            }
            ScriptStep::Cancel {
                strategy,
                symbol,
                side,
            } => {
                let Some(order_id) = self.working_order(strategy, symbol, *side).await else {
                    warn!("[SESSION] step {}: nothing working to cancel", index);
                    return;
                };
                match self.coordinator.cancel_order(order_id).await {
                    Ok(action) => info!("[SESSION] step {}: cancel -> {:?}", index, action),
                    Err(e) => warn!("[SESSION] step {}: cancel failed: {}", index, e),
                }
            }
            ScriptStep::Mark { symbol, price } => {
                self.coordinator
                    .ledger()
                    .mark_price(symbol, *price, Utc::now());
            }
            ScriptStep::Fault { op, kind, times } => {
                self.venue.inject((*op).into(), kind.to_fault(), *times);
            }
            ScriptStep::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
        }
    }

    /// Oldest open order for the intent. Under the allow policy several may
    /// be open at once and none of them occupies the intent slot.
    async fn working_order(&self, strategy: &str, symbol: &str, side: Side) -> Option<OrderId> {
        let intent = Signal::new(strategy, symbol, side, rust_decimal::Decimal::ONE).intent_key();
        self.coordinator
            .open_orders()
            .await
            .into_iter()
            .filter(|order| order.intent_key() == intent)
            .min_by_key(|order| order.created_at)
            .map(|order| order.order_id)
    }

    /// Give a new order's driver time to get past submission
    async fn settle(&self, order_id: OrderId) {
        let budget = self.config.coordinator.submit_timeout()
            * self.config.coordinator.retry.max_attempts.max(1);
        let deadline = tokio::time::Instant::now() + budget;

        while tokio::time::Instant::now() < deadline {
            match self.coordinator.order(order_id).await.map(|o| o.status) {
                Some(OrderStatus::Created) | Some(OrderStatus::Submitting) => {
                    tokio::time::sleep(SETTLE_POLL).await;
                }
                _ => return,
            }
        }
        warn!("[SESSION] order {} still unresolved after {:?}", order_id, budget);
    }
}

fn log_event(event: &ExecutionEvent) {
    match event.order() {
        Some(order) => info!(
            "[EVENTS] {} {} {} {}/{} {}",
            event.kind(),
            order.strategy_id,
            order.symbol,
            order.filled_quantity,
            order.requested_quantity,
            order.status
        ),
        None => info!("[EVENTS] {}", event.kind()),
    }
}
