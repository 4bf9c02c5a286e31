//! Risk Gate
//!
//! Composes an ordered list of [`RiskCheck`]s. The first failing check
//! decides the rejection reason; later checks are not consulted.

use aegis_core::{RiskProfile, RiskRejectReason, Signal};
use log::{debug, info};

use crate::checks::{
    ConsecutiveLossCheck, DailyLossCheck, OpenPositionsCheck, PositionLimitCheck, RiskCheck,
    StrategyActiveCheck,
};
use crate::context::RiskContext;

/// Outcome of a risk evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskDecision {
    Admit,
    Reject(RiskRejectReason),
}

impl RiskDecision {
    pub fn is_admit(&self) -> bool {
        matches!(self, RiskDecision::Admit)
    }
}

/// Ordered chain of pure risk checks
pub struct RiskGate {
    checks: Vec<Box<dyn RiskCheck>>,
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::standard()
    }
}

impl RiskGate {
    /// Gate with no checks (admits everything)
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    /// The standard chain: active, position, open positions, daily loss,
    /// consecutive losses
    pub fn standard() -> Self {
        Self::empty()
            .with_check(StrategyActiveCheck)
            .with_check(PositionLimitCheck)
            .with_check(OpenPositionsCheck)
            .with_check(DailyLossCheck)
            .with_check(ConsecutiveLossCheck)
    }

    /// Builder: Append a check to the end of the chain
    pub fn with_check(mut self, check: impl RiskCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    /// Names of the configured checks, in evaluation order
    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn evaluate(
        &self,
        signal: &Signal,
        profile: &RiskProfile,
        context: &RiskContext,
    ) -> RiskDecision {
        for check in &self.checks {
            if let Err(reason) = check.evaluate(signal, profile, context) {
                info!(
                    "[RISK] reject {} {} {} {}: {} ({})",
                    signal.strategy_id,
                    signal.side,
                    signal.quantity,
                    signal.symbol,
                    reason,
                    check.name()
                );
                return RiskDecision::Reject(reason);
            }
        }

        debug!(
            "[RISK] admit {} {} {} {} (net {}, reserved {})",
            signal.strategy_id,
            signal.side,
            signal.quantity,
            signal.symbol,
            context.position.net_quantity,
            context.reserved
        );
        RiskDecision::Admit
    }
}
