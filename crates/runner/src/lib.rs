//! Aegis Runner - Scripted Execution Sessions
//!
//! Loads a JSON configuration and drives the execution engine against the
//! in-process venue:
//!
//! - **Config**: log level, coordinator settings, risk profiles, venue
//!   settings and a script of signals, fills, cancels and faults
//! - **Session**: wires everything together, replays the script and
//!   summarizes positions, P&L and event counts
//!
//! ## Architecture
//!
//! ```text
//!   config.json ──► RunnerConfig ──► Session
//!                                      │
//!            script steps ─────────────┤
//!                                      ▼
//!                         ┌────────────────────────┐
//!                         │  ExecutionCoordinator  │──► ChannelEventSink
//!                         └───────────┬────────────┘
//!                                     │ orders / cancels / queries
//!                                     ▼
//!                         ┌────────────────────────┐
//!                         │  ClassifyingExchange   │
//!                         │    └─ SimulatedVenue   │──► venue feed (fills)
//!                         └────────────────────────┘
//! ```

pub mod config;
pub mod session;

pub use config::{
    ConfigError, FaultKind, RunnerConfig, ScriptOp, ScriptStep, load_config,
    load_config_from_str, load_default_config,
};
pub use session::{Session, SessionReport};
