use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{IntentKey, OrderStatus, Side, Signal};
use crate::values::{Price, Quantity, StrategyId, Symbol, Timestamp};

/// Unique identifier for an order (system-generated, stable)
pub type OrderId = Uuid;

/// Full order details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    /// Strategy the order is attributed to
    pub strategy_id: StrategyId,
    /// Assigned on successful submission
    pub exchange_order_id: Option<String>,
    pub symbol: Symbol,
    pub side: Side,
    pub requested_quantity: Quantity,
    pub filled_quantity: Quantity,
    /// Limit price; `None` for market orders
    pub price: Option<Price>,
    /// Quantity-weighted average of applied fills
    pub average_fill_price: Option<Price>,
    pub status: OrderStatus,
    pub created_at: Timestamp,
    pub last_updated_at: Timestamp,
    /// Submission attempts beyond the first
    pub retry_count: u32,
}

impl Order {
    /// Create a new order in `Created` for `quantity` of the signal's intent
    pub fn from_signal(signal: &Signal, quantity: Quantity, timestamp: Timestamp) -> Self {
        Self {
            order_id: Uuid::new_v4(),
            strategy_id: signal.strategy_id.clone(),
            exchange_order_id: None,
            symbol: signal.symbol.clone(),
            side: signal.side,
            requested_quantity: quantity,
            filled_quantity: Decimal::ZERO,
            price: signal.target_price,
            average_fill_price: None,
            status: OrderStatus::Created,
            created_at: timestamp,
            last_updated_at: timestamp,
            retry_count: 0,
        }
    }

    /// Client order id sent to the exchange.
    ///
    /// Derived from the stable order id so that resubmissions of the same
    /// order carry the same identifier.
    pub fn client_order_id(&self) -> String {
        self.order_id.simple().to_string()
    }

    /// The (strategy, symbol, side) intent this order serves
    pub fn intent_key(&self) -> IntentKey {
        IntentKey {
            strategy_id: self.strategy_id.clone(),
            symbol: self.symbol.clone(),
            side: self.side,
        }
    }

    /// Returns remaining quantity to be filled
    pub fn remaining_quantity(&self) -> Quantity {
        self.requested_quantity - self.filled_quantity
    }

    /// Remaining quantity with the side's sign applied
    pub fn signed_remaining(&self) -> Decimal {
        self.side.signed(self.remaining_quantity())
    }

    /// Returns true if the order is completely filled
    pub fn is_filled(&self) -> bool {
        self.filled_quantity >= self.requested_quantity
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_market(&self) -> bool {
        self.price.is_none()
    }
}
