//! Aegis Core Domain
//!
//! Pure domain types for the Aegis execution engine.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod entities;
pub mod events;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    // Signal intake
    IntentKey,
    // Orders
    Order,
    OrderId,
    OrderStatus,
    // Fills, trades, positions
    Fill,
    Position,
    // Rejections
    RejectionReason,
    RiskProfile,
    RiskRejectReason,
    Side,
    Signal,
    Trade,
    TradeId,
};
pub use events::ExecutionEvent;
pub use values::{Price, Quantity, StrategyId, Symbol, Timestamp};
