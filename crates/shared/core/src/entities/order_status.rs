use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle status
///
/// ```text
/// Created ──► Submitting ──► Open ◄──► PartiallyFilled ──► Filled
///    │            │  │        │              │
///    │            │  └─► Rejected            │
///    └────────────┴───────────┴──► Cancelling ◄┘ ──► Cancelled
///
/// any non-terminal ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Admitted locally, nothing sent to the exchange yet
    Created,
    /// Submission in progress (including backoff between retries)
    Submitting,
    /// Acknowledged by the exchange, resting
    Open,
    /// Some quantity executed, remainder resting
    PartiallyFilled,
    /// Completely filled
    Filled,
    /// Cancel requested, awaiting confirmation
    Cancelling,
    /// Cancel confirmed
    Cancelled,
    /// Refused by the exchange
    Rejected,
    /// Retries exhausted or processing aborted
    Failed,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Failed
        )
    }

    /// Returns true if the order still counts against its intent
    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the order is (or may be) resting on the exchange
    pub fn is_working(&self) -> bool {
        matches!(
            self,
            OrderStatus::Open | OrderStatus::PartiallyFilled | OrderStatus::Cancelling
        )
    }

    /// The transition table. Anything not listed here is an invariant violation.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Created, Submitting)
                | (Created, Cancelling)
                | (Submitting, Open)
                | (Submitting, Rejected)
                | (Submitting, Cancelling)
                | (Open, PartiallyFilled)
                | (Open, Filled)
                | (Open, Cancelling)
                | (PartiallyFilled, Open)
                | (PartiallyFilled, PartiallyFilled)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Cancelling)
                | (Cancelling, Cancelling)
                | (Cancelling, Cancelled)
                | (Cancelling, Filled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Submitting => "SUBMITTING",
            OrderStatus::Open => "OPEN",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelling => "CANCELLING",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
