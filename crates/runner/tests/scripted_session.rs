//! Integration test: a full scripted session against the simulated venue

use aegis_runner::{Session, load_config_from_str, load_default_config};
use rust_decimal_macros::dec;

#[tokio::test(start_paused = true)]
async fn test_default_script_runs_to_completion() {
    let config = load_default_config().unwrap();
    config.validate().unwrap();

    let report = Session::new(config).run().await;

    assert_eq!(report.signals, 4);
    assert_eq!(report.admitted, 3);
    assert_eq!(report.rejected, 1);

    let btc = report.positions.iter().find(|p| p.symbol == "BTC-USD").unwrap();
    assert_eq!(btc.net_quantity, dec!(5));
    assert_eq!(btc.average_entry_price, dec!(100.8));

    let eth = report.positions.iter().find(|p| p.symbol == "ETH-USD").unwrap();
    assert_eq!(eth.net_quantity, dec!(-3));

    // Two network failures before the ETH order got through, one lost ack
    // recovered for SOL
    assert_eq!(report.venue_orders, 3);
    assert_eq!(report.submit_calls, 6);

    assert_eq!(report.events.get("OrderFilled"), Some(&2));
    assert_eq!(report.events.get("OrderCancelled"), Some(&1));
    assert_eq!(report.events.get("OrderRejected"), Some(&1));
    assert_eq!(report.events.get("OrderFailed"), None);

    let metrics = report.metrics.unwrap();
    assert_eq!(metrics.open_positions, 2);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_reported_as_failure() {
    let config = load_config_from_str(
        r#"{
            "coordinator": {
                "retry": {"base_delay_ms": 10, "max_delay_ms": 50, "max_attempts": 3},
                "status_poll_interval_ms": 0
            },
            "profiles": {"s1": {}},
            "script": [
                {"action": "fault", "op": "submit", "kind": "unavailable", "times": 3},
                {"action": "signal", "strategy": "s1", "symbol": "BTC-USD", "side": "buy", "quantity": "1"}
            ]
        }"#,
    )
    .unwrap();
    config.validate().unwrap();

    let session = Session::new(config);
    let venue = session.venue().clone();
    let report = session.run().await;

    assert_eq!(venue.submit_calls(), 3);
    assert_eq!(venue.order_count(), 0);
    assert_eq!(report.events.get("OrderFailed"), Some(&1));
    assert!(report.positions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_allow_policy_script_fills_each_order() {
    let config = load_config_from_str(
        r#"{
            "coordinator": {"duplicate_policy": "allow", "status_poll_interval_ms": 0},
            "profiles": {"s1": {}},
            "script": [
                {"action": "signal", "strategy": "s1", "symbol": "BTC-USD", "side": "buy", "quantity": "1", "price": "100"},
                {"action": "signal", "strategy": "s1", "symbol": "BTC-USD", "side": "buy", "quantity": "1", "price": "102"},
                {"action": "fill", "strategy": "s1", "symbol": "BTC-USD", "side": "buy", "price": "100"},
                {"action": "fill", "strategy": "s1", "symbol": "BTC-USD", "side": "buy", "price": "102"}
            ]
        }"#,
    )
    .unwrap();
    config.validate().unwrap();

    let report = Session::new(config).run().await;

    assert_eq!(report.admitted, 2);
    assert_eq!(report.venue_orders, 2);
    assert_eq!(report.events.get("OrderFilled"), Some(&2));

    let btc = report.positions.iter().find(|p| p.symbol == "BTC-USD").unwrap();
    assert_eq!(btc.net_quantity, dec!(2));
    assert_eq!(btc.average_entry_price, dec!(101));
}
