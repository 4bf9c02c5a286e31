//! Error types for the gateway crate

use thiserror::Error;

/// Classified outcome of a failed exchange call.
///
/// Together with `Ok` these are the only outcomes the engine reasons about.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// The exchange refused the request; retrying will not help
    #[error("Exchange rejected: {reason}")]
    Rejected { reason: String },

    /// The call may succeed if repeated
    #[error("Transient failure: {cause}")]
    Transient { cause: String },
}

impl ExchangeError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        ExchangeError::Rejected {
            reason: reason.into(),
        }
    }

    pub fn transient(cause: impl Into<String>) -> Self {
        ExchangeError::Transient {
            cause: cause.into(),
        }
    }

    /// Returns true if the call may be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Transient { .. })
    }
}

/// Raw errors surfaced by a venue protocol client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VenueError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Unknown order: {0}")]
    UnknownOrder(String),

    #[error("Duplicate order: {0}")]
    DuplicateOrder(String),

    #[error("Order not cancellable: {0}")]
    NotCancellable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Timeout waiting for venue")]
    Timeout,

    #[error("Venue unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

impl VenueError {
    /// Map a raw venue failure onto the two-outcome taxonomy
    pub fn classify(&self) -> ExchangeError {
        match self {
            VenueError::Authentication(_)
            | VenueError::Validation(_)
            | VenueError::InsufficientFunds(_)
            | VenueError::UnknownOrder(_)
            | VenueError::DuplicateOrder(_)
            | VenueError::NotCancellable(_) => ExchangeError::rejected(self.to_string()),

            VenueError::Network(_)
            | VenueError::RateLimited
            | VenueError::Timeout
            | VenueError::Unavailable(_) => ExchangeError::transient(self.to_string()),

            VenueError::Http { status, .. } => match *status {
                429 | 500..=599 => ExchangeError::transient(self.to_string()),
                _ => ExchangeError::rejected(self.to_string()),
            },
        }
    }
}

impl From<VenueError> for ExchangeError {
    fn from(e: VenueError) -> Self {
        e.classify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(!VenueError::Authentication("bad key".into()).classify().is_transient());
        assert!(!VenueError::InsufficientFunds("usd".into()).classify().is_transient());
        assert!(!VenueError::UnknownOrder("x".into()).classify().is_transient());
        assert!(VenueError::Network("reset".into()).classify().is_transient());
        assert!(VenueError::RateLimited.classify().is_transient());
        assert!(VenueError::Timeout.classify().is_transient());
        assert!(VenueError::Unavailable("maintenance".into()).classify().is_transient());
    }

    #[test]
    fn test_http_status_classification() {
        let http = |status| VenueError::Http {
            status,
            body: String::new(),
        };

        assert!(!http(400).classify().is_transient());
        assert!(!http(401).classify().is_transient());
        assert!(!http(403).classify().is_transient());
        assert!(http(429).classify().is_transient());
        assert!(http(502).classify().is_transient());
        assert!(http(503).classify().is_transient());
    }
}
