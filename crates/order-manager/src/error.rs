//! Order Manager errors

use aegis_core::OrderId;
use aegis_gateway::ExchangeError;
use thiserror::Error;

/// Errors raised by a single order's state machine.
///
/// A status change outside the transition table is one kind of invariant
/// violation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("Invariant violation on order {order_id}: {detail}")]
    InvariantViolation { order_id: OrderId, detail: String },
}

impl OrderError {
    pub fn invariant(order_id: OrderId, detail: impl Into<String>) -> Self {
        OrderError::InvariantViolation {
            order_id,
            detail: detail.into(),
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            OrderError::InvariantViolation { order_id, .. } => *order_id,
        }
    }
}

/// Errors returned by the execution coordinator's API
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Unknown order: {0}")]
    UnknownOrder(OrderId),

    #[error("No order matches fill {trade_id}")]
    UnroutableFill { trade_id: String },

    #[error("Timed out waiting for order {0}")]
    WaitTimeout(OrderId),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
