//! Aegis Clock Infrastructure
//!
//! Time sources for the execution engine:
//!
//! - [`SystemClock`] returns wall-clock time (production).
//! - [`ManualClock`] only moves when told to (tests, replays).
//!
//! ## Usage
//!
//! ```ignore
//! use aegis_clock::{Clock, ManualClock};
//! use chrono::Duration;
//!
//! let clock = ManualClock::starting_at(start);
//! clock.advance(Duration::hours(24)); // next trading day
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use aegis_ports::Clock;
