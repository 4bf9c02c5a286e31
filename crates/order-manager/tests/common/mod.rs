//! Shared wiring for coordinator integration tests

#![allow(dead_code)]

use aegis_core::{OrderId, OrderStatus, RiskProfile};
use aegis_gateway::{ClassifyingExchange, RecordingSink, SimulatedVenue, SimulatorConfig, VenueEvent};
use aegis_order_manager::{CoordinatorConfig, ExecutionCoordinator, PositionLedger, RetryPolicy};
use aegis_risk_manager::InMemoryProfileStore;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub struct Harness {
    pub coordinator: ExecutionCoordinator,
    pub venue: Arc<SimulatedVenue>,
    pub sink: Arc<RecordingSink>,
    pub profiles: Arc<InMemoryProfileStore>,
    pub ledger: Arc<PositionLedger>,
    pub feed: Option<UnboundedReceiver<VenueEvent>>,
}

/// Fast retries, no background polling
pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        status_poll_interval_ms: 0,
        ..CoordinatorConfig::default()
    }
    .with_retry(RetryPolicy::new(
        Duration::from_millis(10),
        Duration::from_millis(100),
        5,
    ))
}

pub fn harness(config: CoordinatorConfig) -> Harness {
    harness_with(config, SimulatorConfig::default(), Arc::new(PositionLedger::new()))
}

pub fn harness_with(
    config: CoordinatorConfig,
    simulator: SimulatorConfig,
    ledger: Arc<PositionLedger>,
) -> Harness {
    let _ = env_logger::try_init();

    let (venue, feed) = SimulatedVenue::new(simulator);
    let venue = Arc::new(venue);
    let sink = Arc::new(RecordingSink::new());

    let profiles = Arc::new(InMemoryProfileStore::new());
    profiles.upsert(
        "trend",
        RiskProfile::default()
            .with_max_position_size(dec!(10))
            .with_max_daily_loss(dec!(500)),
    );
    profiles.upsert("meanrev", RiskProfile::default());

    let coordinator = ExecutionCoordinator::builder(
        Arc::new(ClassifyingExchange::new(venue.clone())),
        profiles.clone(),
        sink.clone(),
    )
    .with_config(config)
    .with_ledger(ledger.clone())
    .build();

    Harness {
        coordinator,
        venue,
        sink,
        profiles,
        ledger,
        feed: Some(feed),
    }
}

/// Poll until the order reaches `status`
pub async fn wait_for_status(coordinator: &ExecutionCoordinator, order_id: OrderId, status: OrderStatus) {
    for _ in 0..1_000 {
        if coordinator.order(order_id).await.map(|o| o.status) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let actual = coordinator.order(order_id).await.map(|o| o.status);
    panic!("order {} never reached {} (is {:?})", order_id, status, actual);
}

pub async fn client_id(coordinator: &ExecutionCoordinator, order_id: OrderId) -> String {
    coordinator
        .order(order_id)
        .await
        .expect("order exists")
        .client_order_id()
}
