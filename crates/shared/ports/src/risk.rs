use aegis_core::RiskProfile;

/// Port for per-strategy risk configuration
///
/// Read on every evaluation. Implementations must return the current
/// profile, so runtime updates take effect on the next signal.
pub trait RiskProfileSource: Send + Sync {
    /// Current profile for a strategy, `None` if the strategy is unknown
    fn profile(&self, strategy_id: &str) -> Option<RiskProfile>;
}
