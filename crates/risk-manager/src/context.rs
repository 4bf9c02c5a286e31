//! Risk context - the state snapshot a risk evaluation reads

use aegis_core::{Position, Signal, Symbol};
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Snapshot of current exposure for one evaluation
#[derive(Debug, Clone)]
pub struct RiskContext {
    /// Current ledger position for the signal's symbol
    pub position: Position,
    /// Signed quantity still pending on in-flight orders for the symbol
    pub reserved: Decimal,
    /// Symbols currently held or reserved across the account
    pub held_symbols: HashSet<Symbol>,
    /// Realized + unrealized P&L for the current trading day
    pub daily_pnl: Decimal,
    /// Losing closes in a row
    pub consecutive_losses: u32,
}

impl RiskContext {
    /// Context for a symbol with nothing held and nothing pending
    pub fn flat(symbol: impl Into<Symbol>) -> Self {
        Self {
            position: Position::flat(symbol),
            reserved: Decimal::ZERO,
            held_symbols: HashSet::new(),
            daily_pnl: Decimal::ZERO,
            consecutive_losses: 0,
        }
    }

    /// Net position plus pending exposure
    pub fn current_exposure(&self) -> Decimal {
        self.position.net_quantity + self.reserved
    }

    /// Exposure if the signal were fully executed
    pub fn projected_exposure(&self, signal: &Signal) -> Decimal {
        self.current_exposure() + signal.signed_quantity()
    }

    /// Is the symbol already counted as an open position?
    pub fn holds(&self, symbol: &str) -> bool {
        self.held_symbols.contains(symbol)
    }

    // Builders for tests and callers assembling a context by hand

    pub fn with_net_quantity(mut self, quantity: Decimal) -> Self {
        self.position.net_quantity = quantity;
        if !quantity.is_zero() {
            self.held_symbols.insert(self.position.symbol.clone());
        }
        self
    }

    pub fn with_reserved(mut self, reserved: Decimal) -> Self {
        self.reserved = reserved;
        self
    }

    pub fn with_held_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.held_symbols.extend(symbols.into_iter().map(Into::into));
        self
    }

    pub fn with_daily_pnl(mut self, pnl: Decimal) -> Self {
        self.daily_pnl = pnl;
        self
    }

    pub fn with_consecutive_losses(mut self, losses: u32) -> Self {
        self.consecutive_losses = losses;
        self
    }
}
