//! Exchange adapters
//!
//! Adapters implement [`VenueClient`](crate::exchange::VenueClient) for a
//! concrete venue. Only the simulator is provided.

pub mod simulator;

pub use simulator::{Fault, FillMode, SimulatedVenue, SimulatorConfig, VenueEvent, VenueOp};
