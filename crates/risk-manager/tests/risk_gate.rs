//! Integration test: RiskGate against profiles from the store

use aegis_core::{Position, RiskProfile, RiskRejectReason, Side, Signal};
use aegis_ports::RiskProfileSource;
use aegis_risk_manager::{InMemoryProfileStore, RiskContext, RiskDecision, RiskGate};
use chrono::Utc;
use rust_decimal_macros::dec;

fn store() -> InMemoryProfileStore {
    let _ = env_logger::try_init();
    let store = InMemoryProfileStore::new();
    store.upsert(
        "trend",
        RiskProfile::default()
            .with_max_position_size(dec!(10))
            .with_max_daily_loss(dec!(500)),
    );
    store
}

#[test]
fn test_buy_beyond_position_limit_rejected() {
    let store = store();
    let gate = RiskGate::standard();

    let mut position = Position::flat("BTC-USD");
    position.apply_fill(Side::Buy, dec!(8), dec!(100), dec!(0), Utc::now());
    let context = RiskContext {
        position,
        ..RiskContext::flat("BTC-USD")
    }
    .with_held_symbols(["BTC-USD"]);

    let signal = Signal::new("trend", "BTC-USD", Side::Buy, dec!(5));
    let profile = store.profile("trend").unwrap();

    assert_eq!(
        gate.evaluate(&signal, &profile, &context),
        RiskDecision::Reject(RiskRejectReason::PositionLimitExceeded)
    );

    let smaller = Signal::new("trend", "BTC-USD", Side::Buy, dec!(2));
    assert_eq!(gate.evaluate(&smaller, &profile, &context), RiskDecision::Admit);
}

#[test]
fn test_deactivation_applies_to_next_evaluation() {
    let store = store();
    let gate = RiskGate::standard();
    let signal = Signal::new("trend", "ETH-USD", Side::Sell, dec!(1));
    let context = RiskContext::flat("ETH-USD");

    let before = store.profile("trend").unwrap();
    assert!(gate.evaluate(&signal, &before, &context).is_admit());

    store.set_active("trend", false);

    let after = store.profile("trend").unwrap();
    assert_eq!(
        gate.evaluate(&signal, &after, &context),
        RiskDecision::Reject(RiskRejectReason::StrategyInactive)
    );
}

#[test]
fn test_daily_loss_blocks_even_small_orders() {
    let store = store();
    let gate = RiskGate::standard();
    let profile = store.profile("trend").unwrap();

    let context = RiskContext::flat("BTC-USD").with_daily_pnl(dec!(-750));
    let signal = Signal::new("trend", "BTC-USD", Side::Buy, dec!(0.1));

    assert_eq!(
        gate.evaluate(&signal, &profile, &context),
        RiskDecision::Reject(RiskRejectReason::DailyLossLimitExceeded)
    );
}
