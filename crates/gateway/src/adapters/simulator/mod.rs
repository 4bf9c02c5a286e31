//! Simulator exchange adapter
//!
//! In-process venue used by the runner demo and by tests.

mod faults;
mod venue;

pub use faults::{Fault, VenueOp};
pub use venue::{FillMode, SimulatedVenue, SimulatorConfig, VenueEvent};
