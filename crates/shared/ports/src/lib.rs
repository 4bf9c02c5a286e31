//! Aegis Ports
//!
//! Port definitions (traits) for the Aegis execution engine.
//! These define the boundaries between domain logic and infrastructure.

mod clock;
mod events;
mod risk;

pub use clock::Clock;
pub use events::EventSink;
pub use risk::RiskProfileSource;
