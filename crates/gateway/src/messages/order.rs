//! Order message types

use aegis_core::{Fill, Order, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderTypeWire {
    Limit,
    Market,
}

impl OrderTypeWire {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Limit => "limit",
            Self::Market => "market",
        }
    }
}

/// Time in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForceWire {
    /// Good Till Cancelled
    Gtc,
    /// Immediate Or Cancel
    Ioc,
}

/// Order submission request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client-assigned order ID; identical across resubmissions of one order
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderTypeWire,
    pub quantity: Decimal,
    /// Price (required for limit orders)
    pub price: Option<Decimal>,
    pub time_in_force: TimeInForceWire,
}

impl OrderRequest {
    /// Create a new limit order request
    pub fn limit(
        client_order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            client_order_id: client_order_id.into(),
            symbol: symbol.into(),
            side,
            order_type: OrderTypeWire::Limit,
            quantity,
            price: Some(price),
            time_in_force: TimeInForceWire::Gtc,
        }
    }

    /// Create a new market order request
    pub fn market(
        client_order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
    ) -> Self {
        Self {
            client_order_id: client_order_id.into(),
            symbol: symbol.into(),
            side,
            order_type: OrderTypeWire::Market,
            quantity,
            price: None,
            time_in_force: TimeInForceWire::Ioc, // Market orders are always IOC
        }
    }

    /// Build the request for an order's full requested quantity
    pub fn for_order(order: &Order) -> Self {
        match order.price {
            Some(price) => Self::limit(
                order.client_order_id(),
                &order.symbol,
                order.side,
                order.requested_quantity,
                price,
            ),
            None => Self::market(
                order.client_order_id(),
                &order.symbol,
                order.side,
                order.requested_quantity,
            ),
        }
    }
}

/// Successful submission acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub client_order_id: String,
    pub exchange_order_id: String,
    pub accepted_at: Timestamp,
}

/// Cancel order request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub client_order_id: String,
    /// Exchange-assigned order ID (if known)
    pub exchange_order_id: Option<String>,
    /// Symbol (for routing)
    pub symbol: String,
}

impl CancelRequest {
    pub fn for_order(order: &Order) -> Self {
        Self {
            client_order_id: order.client_order_id(),
            exchange_order_id: order.exchange_order_id.clone(),
            symbol: order.symbol.clone(),
        }
    }
}

/// Confirmation that the venue cancelled the order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelAck {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    /// Quantity that had filled before the cancel took effect
    pub filled_quantity: Decimal,
}

/// Status query for a single order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusQuery {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub symbol: String,
}

impl StatusQuery {
    pub fn for_order(order: &Order) -> Self {
        Self {
            client_order_id: order.client_order_id(),
            exchange_order_id: order.exchange_order_id.clone(),
            symbol: order.symbol.clone(),
        }
    }
}

/// Order state as the venue sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VenueOrderState {
    /// Resting, no fills
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl VenueOrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    /// Check if the order is terminal (no more updates expected)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }
}

/// Result of a status query: venue state plus every fill it knows about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub state: VenueOrderState,
    /// Cumulative filled quantity
    pub filled_quantity: Decimal,
    pub fills: Vec<Fill>,
    /// Rejection reason (if rejected)
    pub reject_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::Signal;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_request_for_limit_order() {
        let signal = Signal::new("s1", "BTC-USD", Side::Buy, dec!(1)).with_target_price(dec!(50000));
        let order = Order::from_signal(&signal, dec!(1), Utc::now());
        let request = OrderRequest::for_order(&order);

        assert_eq!(request.client_order_id, order.client_order_id());
        assert_eq!(request.symbol, "BTC-USD");
        assert_eq!(request.order_type, OrderTypeWire::Limit);
        assert_eq!(request.price, Some(dec!(50000)));
        assert_eq!(request.time_in_force, TimeInForceWire::Gtc);
    }

    #[test]
    fn test_request_for_market_order() {
        let signal = Signal::new("s1", "ETH-USD", Side::Sell, dec!(10));
        let order = Order::from_signal(&signal, dec!(10), Utc::now());
        let request = OrderRequest::for_order(&order);

        assert_eq!(request.order_type, OrderTypeWire::Market);
        assert!(request.price.is_none());
        assert_eq!(request.time_in_force, TimeInForceWire::Ioc);
    }

    #[test]
    fn test_venue_state_terminal() {
        assert!(!VenueOrderState::Open.is_terminal());
        assert!(!VenueOrderState::PartiallyFilled.is_terminal());
        assert!(VenueOrderState::Filled.is_terminal());
        assert!(VenueOrderState::Expired.is_terminal());
    }
}
