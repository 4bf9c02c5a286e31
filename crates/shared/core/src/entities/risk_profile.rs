//! Risk Profile
//!
//! Per-strategy risk limits. Owned by the risk configuration collaborator;
//! the execution engine only reads them, and re-reads them on every
//! evaluation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Risk limits for one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskProfile {
    /// Strategy active flag; inactive strategies are never admitted
    pub active: bool,
    /// Maximum absolute net position per symbol
    pub max_position_size: Decimal,
    /// Maximum loss for the trading day (positive number)
    pub max_daily_loss: Decimal,
    /// Maximum number of distinct symbols held at once
    pub max_open_positions: usize,
    /// Optional tighter cap per symbol
    pub per_symbol_limit: Option<Decimal>,
    /// Halt after this many losing closes in a row
    pub max_consecutive_losses: Option<u32>,
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self {
            active: true,
            max_position_size: dec!(10),
            max_daily_loss: dec!(500),
            max_open_positions: 5,
            per_symbol_limit: None,
            max_consecutive_losses: None,
        }
    }
}

impl RiskProfile {
    /// Builder: Set max position size
    pub fn with_max_position_size(mut self, size: Decimal) -> Self {
        self.max_position_size = size;
        self
    }

    /// Builder: Set max daily loss
    pub fn with_max_daily_loss(mut self, loss: Decimal) -> Self {
        self.max_daily_loss = loss;
        self
    }

    /// Builder: Set max open positions
    pub fn with_max_open_positions(mut self, count: usize) -> Self {
        self.max_open_positions = count;
        self
    }

    /// Builder: Set per-symbol limit
    pub fn with_per_symbol_limit(mut self, limit: Decimal) -> Self {
        self.per_symbol_limit = Some(limit);
        self
    }

    /// Builder: Set consecutive loss circuit breaker
    pub fn with_max_consecutive_losses(mut self, count: u32) -> Self {
        self.max_consecutive_losses = Some(count);
        self
    }

    /// Builder: Mark the strategy inactive
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let profile: RiskProfile =
            serde_json::from_str(r#"{"max_position_size": "25", "per_symbol_limit": "5"}"#)
                .unwrap();

        assert!(profile.active);
        assert_eq!(profile.max_position_size, dec!(25));
        assert_eq!(profile.per_symbol_limit, Some(dec!(5)));
        assert_eq!(profile.max_daily_loss, dec!(500));
        assert_eq!(profile.max_consecutive_losses, None);
    }
}
