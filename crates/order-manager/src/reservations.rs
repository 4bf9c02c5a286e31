//! Exposure reservations
//!
//! Signed quantity that admitted-but-unfilled orders may still add to a
//! position. Risk evaluation adds it to the ledger's net quantity so two
//! admissions racing on one symbol see each other's pending exposure.

use aegis_core::{OrderId, Symbol};
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::Signed;
use std::collections::HashSet;

#[derive(Default)]
pub struct ExposureReservations {
    /// reservation id -> (symbol, signed remaining quantity)
    entries: DashMap<OrderId, (Symbol, Decimal)>,
}

impl ExposureReservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add signed quantity under a reservation id
    pub fn reserve(&self, id: OrderId, symbol: &str, signed_quantity: Decimal) {
        self.entries
            .entry(id)
            .and_modify(|(_, qty)| *qty += signed_quantity)
            .or_insert_with(|| (symbol.to_string(), signed_quantity));
    }

    /// Consume part of a reservation as it fills. Never flips its sign.
    pub fn consume(&self, id: OrderId, signed_quantity: Decimal) {
        if let Some(mut entry) = self.entries.get_mut(&id) {
            let (_, qty) = entry.value_mut();
            let remaining = *qty - signed_quantity;
            *qty = if remaining.signum() == qty.signum() {
                remaining
            } else {
                Decimal::ZERO
            };
        }
    }

    /// Drop a reservation entirely; returns what was left
    pub fn release(&self, id: OrderId) -> Decimal {
        self.entries
            .remove(&id)
            .map(|(_, (_, qty))| qty)
            .unwrap_or(Decimal::ZERO)
    }

    /// Net reserved quantity for a symbol
    pub fn reserved(&self, symbol: &str) -> Decimal {
        self.reserved_excluding(symbol, None)
    }

    /// Net reserved quantity for a symbol, ignoring one reservation
    pub fn reserved_excluding(&self, symbol: &str, exclude: Option<OrderId>) -> Decimal {
        self.entries
            .iter()
            .filter(|e| Some(*e.key()) != exclude && e.value().0 == symbol)
            .map(|e| e.value().1)
            .sum()
    }

    /// Symbols with any non-zero reservation
    pub fn symbols(&self) -> HashSet<Symbol> {
        self.entries
            .iter()
            .filter(|e| !e.value().1.is_zero())
            .map(|e| e.value().0.clone())
            .collect()
    }
}
