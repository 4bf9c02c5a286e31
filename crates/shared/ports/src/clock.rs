use aegis_core::Timestamp;

/// Port for time abstraction
///
/// Production wires the wall clock; tests and simulations wire a clock they
/// can move by hand so order timestamps and trading days are deterministic.
pub trait Clock: Send + Sync {
    /// Get the current time according to this clock
    fn now(&self) -> Timestamp;

    /// Get the clock's name/identifier for debugging
    fn name(&self) -> &str {
        "Clock"
    }
}
