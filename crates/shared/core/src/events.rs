//! Execution outcome events
//!
//! Published to the event sink whenever an order is admitted, rejected,
//! filled, cancelled or failed. Every event carries the full order so
//! consumers never need to query back.

use serde::{Deserialize, Serialize};

use crate::entities::{Order, RejectionReason, Signal, Trade};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    OrderAdmitted {
        order: Order,
    },
    /// `order` is `None` when the signal was refused before an order existed
    OrderRejected {
        order: Option<Order>,
        signal: Signal,
        reason: RejectionReason,
    },
    OrderPartiallyFilled {
        order: Order,
        trade: Trade,
    },
    OrderFilled {
        order: Order,
        trade: Trade,
    },
    OrderCancelled {
        order: Order,
    },
    OrderFailed {
        order: Order,
        reason: String,
    },
}

impl ExecutionEvent {
    pub fn order(&self) -> Option<&Order> {
        match self {
            ExecutionEvent::OrderAdmitted { order }
            | ExecutionEvent::OrderPartiallyFilled { order, .. }
            | ExecutionEvent::OrderFilled { order, .. }
            | ExecutionEvent::OrderCancelled { order }
            | ExecutionEvent::OrderFailed { order, .. } => Some(order),
            ExecutionEvent::OrderRejected { order, .. } => order.as_ref(),
        }
    }

    pub fn trade(&self) -> Option<&Trade> {
        match self {
            ExecutionEvent::OrderPartiallyFilled { trade, .. }
            | ExecutionEvent::OrderFilled { trade, .. } => Some(trade),
            _ => None,
        }
    }

    /// Short event name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionEvent::OrderAdmitted { .. } => "OrderAdmitted",
            ExecutionEvent::OrderRejected { .. } => "OrderRejected",
            ExecutionEvent::OrderPartiallyFilled { .. } => "OrderPartiallyFilled",
            ExecutionEvent::OrderFilled { .. } => "OrderFilled",
            ExecutionEvent::OrderCancelled { .. } => "OrderCancelled",
            ExecutionEvent::OrderFailed { .. } => "OrderFailed",
        }
    }
}
