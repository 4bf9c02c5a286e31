use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the risk gate refused a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskRejectReason {
    StrategyInactive,
    PositionLimitExceeded,
    SymbolLimitExceeded,
    MaxOpenPositionsExceeded,
    DailyLossLimitExceeded,
    ConsecutiveLossLimit,
}

impl RiskRejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskRejectReason::StrategyInactive => "STRATEGY_INACTIVE",
            RiskRejectReason::PositionLimitExceeded => "POSITION_LIMIT_EXCEEDED",
            RiskRejectReason::SymbolLimitExceeded => "SYMBOL_LIMIT_EXCEEDED",
            RiskRejectReason::MaxOpenPositionsExceeded => "MAX_OPEN_POSITIONS_EXCEEDED",
            RiskRejectReason::DailyLossLimitExceeded => "DAILY_LOSS_LIMIT_EXCEEDED",
            RiskRejectReason::ConsecutiveLossLimit => "CONSECUTIVE_LOSS_LIMIT",
        }
    }
}

impl fmt::Display for RiskRejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a signal or order did not proceed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Refused by a risk check
    Risk(RiskRejectReason),
    /// Another order for the same intent is still in flight
    DuplicateInFlight,
    /// No risk profile is configured for the strategy
    UnknownStrategy,
    /// Quantity was zero or negative
    InvalidQuantity,
    /// Signal arrived after the coordinator was stopped
    CoordinatorStopped,
    /// The exchange refused the order
    Exchange(String),
}

impl RejectionReason {
    pub fn is_risk(&self) -> bool {
        matches!(self, RejectionReason::Risk(_))
    }
}

impl From<RiskRejectReason> for RejectionReason {
    fn from(reason: RiskRejectReason) -> Self {
        RejectionReason::Risk(reason)
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::Risk(r) => write!(f, "risk: {}", r),
            RejectionReason::DuplicateInFlight => f.write_str("duplicate in flight"),
            RejectionReason::UnknownStrategy => f.write_str("unknown strategy"),
            RejectionReason::InvalidQuantity => f.write_str("invalid quantity"),
            RejectionReason::CoordinatorStopped => f.write_str("coordinator stopped"),
            RejectionReason::Exchange(msg) => write!(f, "exchange: {}", msg),
        }
    }
}
