use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Order, OrderId, Side};
use crate::values::{Price, Quantity, StrategyId, Symbol, Timestamp};

/// Exchange-assigned trade identifier (deduplication key for fills)
pub type TradeId = String;

/// A fill event as reported by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub trade_id: TradeId,
    /// Client order id we sent (if the venue echoes it)
    pub client_order_id: Option<String>,
    /// Exchange-assigned order id
    pub exchange_order_id: Option<String>,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Quantity,
    pub price: Price,
    /// Exchange fee (positive = cost)
    pub fee: Decimal,
    pub executed_at: Timestamp,
}

impl Fill {
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// An executed trade attributed to one of our orders.
///
/// Created only from an applied [`Fill`]; immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    /// Back-reference to the order (many trades per order)
    pub order_id: OrderId,
    pub strategy_id: StrategyId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Quantity,
    pub price: Price,
    pub fee: Decimal,
    pub executed_at: Timestamp,
}

impl Trade {
    /// Attribute an exchange fill to an order
    pub fn from_fill(order: &Order, fill: &Fill) -> Self {
        Self {
            trade_id: fill.trade_id.clone(),
            order_id: order.order_id,
            strategy_id: order.strategy_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: fill.quantity,
            price: fill.price,
            fee: fill.fee,
            executed_at: fill.executed_at,
        }
    }

    /// Returns the notional value of the trade (price * quantity)
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }

    /// Quantity with the side's sign applied (buys positive)
    pub fn signed_quantity(&self) -> Decimal {
        self.side.signed(self.quantity)
    }
}
