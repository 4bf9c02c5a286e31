//! Aegis Order Manager
//!
//! Sits between strategies and the exchange gateway:
//! - **Admission**: validates signals, enforces one in-flight order per intent,
//!   and runs the pre-trade risk gate before any order exists
//! - **Order lifecycle**: one state machine per order; every status change is
//!   checked against the transition table
//! - **Submission**: bounded retries with exponential backoff on transient
//!   exchange failures, never on rejections
//! - **Ledger**: positions and P&L derived only from applied trades
//!
//! ## Architecture
//!
//! ```text
//! Strategies ──► Signals ──► ┌────────────────────────────────────────┐
//!                            │        Execution Coordinator           │
//!                            │  ┌─────────────────────────────────┐   │
//!                            │  │   Admission (per-symbol lock)   │   │
//!                            │  │   - intent dedup / coalesce     │   │
//!                            │  │   - RiskGate + reservations     │   │
//!                            │  └───────────────┬─────────────────┘   │
//!                            │                  │ Order (Created)     │
//!                            │  ┌───────────────▼─────────────────┐   │
//!                            │  │   Order driver (per order)      │   │
//!                            │  │   - pre-submit re-check         │   │
//!                            │  │   - submit / backoff / retry    │   │
//!                            │  │   - deferred cancel             │   │
//!                            │  └───────────────┬─────────────────┘   │
//!                            └──────────────────┼─────────────────────┘
//!                                               │
//! ExchangeClient ◄──────────── OrderRequest ◄───┘
//!
//! Venue fills ──► apply_fill ──► OrderStateMachine ──► PositionLedger
//!                                       │
//!                                       ▼
//!                               ExecutionEvent ──► EventSink
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let coordinator = ExecutionCoordinator::builder(exchange, profiles, sink)
//!     .with_config(config)
//!     .build();
//! coordinator.start();
//!
//! let outcome = coordinator.handle_signal(
//!     Signal::new("trend", "BTC-USD", Side::Buy, dec!(1.5)).with_target_price(dec!(50000)),
//! );
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod reservations;
pub mod retry;
pub mod state_machine;

pub use config::{CoordinatorConfig, DuplicatePolicy};
pub use coordinator::{CoordinatorBuilder, ExecutionCoordinator, SignalOutcome};
pub use error::{ExecutionError, OrderError, Result};
pub use ledger::{PositionLedger, RiskMetrics, TradeImpact};
pub use reservations::ExposureReservations;
pub use retry::{Backoff, RetryPolicy};
pub use state_machine::{CancelAction, FillOutcome, OrderStateMachine, StatusChange};
