//! Individual risk checks
//!
//! Each check is a pure predicate over (signal, profile, context). Checks
//! hold no state and never mutate the context.

use aegis_core::{RiskProfile, RiskRejectReason, Signal};
use rust_decimal::Decimal;

use crate::context::RiskContext;

/// A single pre-trade predicate
pub trait RiskCheck: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    fn evaluate(
        &self,
        signal: &Signal,
        profile: &RiskProfile,
        context: &RiskContext,
    ) -> Result<(), RiskRejectReason>;
}

/// Refuse everything from an inactive strategy
pub struct StrategyActiveCheck;

impl RiskCheck for StrategyActiveCheck {
    fn name(&self) -> &'static str {
        "strategy_active"
    }

    fn evaluate(
        &self,
        _signal: &Signal,
        profile: &RiskProfile,
        _context: &RiskContext,
    ) -> Result<(), RiskRejectReason> {
        if profile.active {
            Ok(())
        } else {
            Err(RiskRejectReason::StrategyInactive)
        }
    }
}

/// Cap the absolute net position (including pending exposure).
///
/// An order that shrinks absolute exposure always passes, so a position
/// left over a lowered limit can still be worked down.
pub struct PositionLimitCheck;

impl RiskCheck for PositionLimitCheck {
    fn name(&self) -> &'static str {
        "position_limit"
    }

    fn evaluate(
        &self,
        signal: &Signal,
        profile: &RiskProfile,
        context: &RiskContext,
    ) -> Result<(), RiskRejectReason> {
        let current = context.current_exposure().abs();
        let projected = context.projected_exposure(signal).abs();

        if projected <= current {
            return Ok(());
        }
        if projected > profile.max_position_size {
            return Err(RiskRejectReason::PositionLimitExceeded);
        }
        if let Some(limit) = profile.per_symbol_limit {
            if projected > limit {
                return Err(RiskRejectReason::SymbolLimitExceeded);
            }
        }
        Ok(())
    }
}

/// Cap the number of distinct symbols held
pub struct OpenPositionsCheck;

impl RiskCheck for OpenPositionsCheck {
    fn name(&self) -> &'static str {
        "open_positions"
    }

    fn evaluate(
        &self,
        signal: &Signal,
        profile: &RiskProfile,
        context: &RiskContext,
    ) -> Result<(), RiskRejectReason> {
        let opens_new = !context.holds(&signal.symbol)
            && !context.projected_exposure(signal).is_zero();
        if !opens_new {
            return Ok(());
        }

        if context.held_symbols.len() + 1 > profile.max_open_positions {
            Err(RiskRejectReason::MaxOpenPositionsExceeded)
        } else {
            Ok(())
        }
    }
}

/// Stop trading once the day's loss exceeds the limit
pub struct DailyLossCheck;

impl RiskCheck for DailyLossCheck {
    fn name(&self) -> &'static str {
        "daily_loss"
    }

    fn evaluate(
        &self,
        _signal: &Signal,
        profile: &RiskProfile,
        context: &RiskContext,
    ) -> Result<(), RiskRejectReason> {
        if context.daily_pnl < Decimal::ZERO && -context.daily_pnl > profile.max_daily_loss {
            Err(RiskRejectReason::DailyLossLimitExceeded)
        } else {
            Ok(())
        }
    }
}

/// Circuit breaker on losing closes in a row
pub struct ConsecutiveLossCheck;

impl RiskCheck for ConsecutiveLossCheck {
    fn name(&self) -> &'static str {
        "consecutive_losses"
    }

    fn evaluate(
        &self,
        _signal: &Signal,
        profile: &RiskProfile,
        context: &RiskContext,
    ) -> Result<(), RiskRejectReason> {
        match profile.max_consecutive_losses {
            Some(max) if context.consecutive_losses >= max => {
                Err(RiskRejectReason::ConsecutiveLossLimit)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::Side;
    use rust_decimal_macros::dec;

    fn buy(qty: Decimal) -> Signal {
        Signal::new("s1", "BTC-USD", Side::Buy, qty)
    }

    fn sell(qty: Decimal) -> Signal {
        Signal::new("s1", "BTC-USD", Side::Sell, qty)
    }

    #[test]
    fn test_inactive_strategy() {
        let profile = RiskProfile::default().inactive();
        let ctx = RiskContext::flat("BTC-USD");

        assert_eq!(
            StrategyActiveCheck.evaluate(&buy(dec!(1)), &profile, &ctx),
            Err(RiskRejectReason::StrategyInactive)
        );
    }

    #[test]
    fn test_position_limit_at_boundary() {
        let profile = RiskProfile::default().with_max_position_size(dec!(10));
        let ctx = RiskContext::flat("BTC-USD").with_net_quantity(dec!(8));

        assert!(PositionLimitCheck.evaluate(&buy(dec!(2)), &profile, &ctx).is_ok());
        assert_eq!(
            PositionLimitCheck.evaluate(&buy(dec!(3)), &profile, &ctx),
            Err(RiskRejectReason::PositionLimitExceeded)
        );
    }

    #[test]
    fn test_position_limit_counts_reserved() {
        let profile = RiskProfile::default().with_max_position_size(dec!(10));
        let ctx = RiskContext::flat("BTC-USD")
            .with_net_quantity(dec!(4))
            .with_reserved(dec!(5));

        assert_eq!(
            PositionLimitCheck.evaluate(&buy(dec!(2)), &profile, &ctx),
            Err(RiskRejectReason::PositionLimitExceeded)
        );
        assert!(PositionLimitCheck.evaluate(&buy(dec!(1)), &profile, &ctx).is_ok());
    }

    #[test]
    fn test_position_limit_short_side() {
        let profile = RiskProfile::default().with_max_position_size(dec!(10));
        let ctx = RiskContext::flat("BTC-USD").with_net_quantity(dec!(-9));

        assert_eq!(
            PositionLimitCheck.evaluate(&sell(dec!(2)), &profile, &ctx),
            Err(RiskRejectReason::PositionLimitExceeded)
        );
        // Flipping through zero to +9 stays within the limit
        assert!(PositionLimitCheck.evaluate(&buy(dec!(18)), &profile, &ctx).is_ok());
    }

    #[test]
    fn test_reducing_order_allowed_over_limit() {
        let profile = RiskProfile::default().with_max_position_size(dec!(5));
        let ctx = RiskContext::flat("BTC-USD").with_net_quantity(dec!(8));

        assert!(PositionLimitCheck.evaluate(&sell(dec!(1)), &profile, &ctx).is_ok());
        assert!(PositionLimitCheck.evaluate(&buy(dec!(1)), &profile, &ctx).is_err());
    }

    #[test]
    fn test_per_symbol_limit() {
        let profile = RiskProfile::default()
            .with_max_position_size(dec!(100))
            .with_per_symbol_limit(dec!(3));
        let ctx = RiskContext::flat("BTC-USD");

        assert_eq!(
            PositionLimitCheck.evaluate(&buy(dec!(4)), &profile, &ctx),
            Err(RiskRejectReason::SymbolLimitExceeded)
        );
    }

    #[test]
    fn test_open_positions() {
        let profile = RiskProfile::default().with_max_open_positions(2);
        let ctx = RiskContext::flat("BTC-USD").with_held_symbols(["ETH-USD", "SOL-USD"]);

        assert_eq!(
            OpenPositionsCheck.evaluate(&buy(dec!(1)), &profile, &ctx),
            Err(RiskRejectReason::MaxOpenPositionsExceeded)
        );

        // Already holding the symbol: no new position is opened
        let ctx = RiskContext::flat("BTC-USD")
            .with_held_symbols(["ETH-USD"])
            .with_net_quantity(dec!(1));
        assert!(OpenPositionsCheck.evaluate(&buy(dec!(1)), &profile, &ctx).is_ok());
    }

    #[test]
    fn test_daily_loss() {
        let profile = RiskProfile::default().with_max_daily_loss(dec!(500));

        let at_limit = RiskContext::flat("BTC-USD").with_daily_pnl(dec!(-500));
        assert!(DailyLossCheck.evaluate(&buy(dec!(1)), &profile, &at_limit).is_ok());

        let beyond = RiskContext::flat("BTC-USD").with_daily_pnl(dec!(-500.01));
        assert_eq!(
            DailyLossCheck.evaluate(&buy(dec!(1)), &profile, &beyond),
            Err(RiskRejectReason::DailyLossLimitExceeded)
        );
    }

    #[test]
    fn test_consecutive_losses_only_when_configured() {
        let ctx = RiskContext::flat("BTC-USD").with_consecutive_losses(7);

        let unset = RiskProfile::default();
        assert!(ConsecutiveLossCheck.evaluate(&buy(dec!(1)), &unset, &ctx).is_ok());

        let set = RiskProfile::default().with_max_consecutive_losses(3);
        assert_eq!(
            ConsecutiveLossCheck.evaluate(&buy(dec!(1)), &set, &ctx),
            Err(RiskRejectReason::ConsecutiveLossLimit)
        );
    }
}
