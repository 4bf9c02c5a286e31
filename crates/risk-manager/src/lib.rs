//! Aegis Risk Manager
//!
//! Pre-trade risk gate for the execution engine. Every signal is evaluated
//! against its strategy's [`RiskProfile`](aegis_core::RiskProfile) and a
//! snapshot of current exposure before any order exists:
//!
//! - **Strategy state**: inactive strategies are refused
//! - **Position limits**: account-wide and per-symbol caps on net quantity
//! - **Open positions**: cap on distinct symbols held
//! - **Daily loss**: realized + unrealized P&L for the trading day
//! - **Circuit breaker**: consecutive losing closes
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        RiskGate                          │
//! │                                                          │
//! │  Signal ──┐                                              │
//! │  Profile ─┼─► [Active] ─► [Position] ─► [OpenPositions]  │
//! │  Context ─┘       ─► [DailyLoss] ─► [ConsecutiveLoss]    │
//! │                                                          │
//! │           first failure short-circuits ──► Reject(reason)│
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The gate holds no mutable state. Callers build a fresh [`RiskContext`]
//! and re-read the profile for every evaluation.

pub mod checks;
pub mod context;
pub mod gate;
pub mod profiles;

// Re-export main types
pub use checks::{
    ConsecutiveLossCheck, DailyLossCheck, OpenPositionsCheck, PositionLimitCheck, RiskCheck,
    StrategyActiveCheck,
};
pub use context::RiskContext;
pub use gate::{RiskDecision, RiskGate};
pub use profiles::InMemoryProfileStore;
