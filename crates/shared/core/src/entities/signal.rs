//! Signal - What strategies output
//!
//! A signal is a directive from a strategy to buy or sell a quantity of a
//! symbol. Signals are produced upstream, are immutable, and are consumed
//! exactly once by the execution coordinator.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;
use crate::values::{Price, Quantity, StrategyId, Symbol, Timestamp};

/// Signal from a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Which strategy generated this signal
    pub strategy_id: StrategyId,
    /// Symbol to trade
    pub symbol: Symbol,
    pub side: Side,
    /// Unsigned quantity to trade
    pub quantity: Quantity,
    /// Limit price; `None` means a market order
    pub target_price: Option<Price>,
    /// When the signal was generated
    pub timestamp: Timestamp,
}

impl Signal {
    /// Create a new market signal stamped with the current time
    pub fn new(
        strategy_id: impl Into<StrategyId>,
        symbol: impl Into<Symbol>,
        side: Side,
        quantity: Quantity,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            symbol: symbol.into(),
            side,
            quantity,
            target_price: None,
            timestamp: Utc::now(),
        }
    }

    /// Builder: Set a limit price
    pub fn with_target_price(mut self, price: Price) -> Self {
        self.target_price = Some(price);
        self
    }

    /// Builder: Set the generation timestamp
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Is this a market order?
    pub fn is_market(&self) -> bool {
        self.target_price.is_none()
    }

    /// Quantity with the side's sign applied (buys positive)
    pub fn signed_quantity(&self) -> Decimal {
        self.side.signed(self.quantity)
    }

    /// The (strategy, symbol, side) intent this signal belongs to
    pub fn intent_key(&self) -> IntentKey {
        IntentKey {
            strategy_id: self.strategy_id.clone(),
            symbol: self.symbol.clone(),
            side: self.side,
        }
    }
}

/// Identity of a trading intent.
///
/// At most one non-terminal order exists per intent unless configuration
/// explicitly allows concurrent orders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentKey {
    pub strategy_id: StrategyId,
    pub symbol: Symbol,
    pub side: Side,
}

impl std::fmt::Display for IntentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.strategy_id, self.symbol, self.side)
    }
}
