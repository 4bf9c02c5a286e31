//! Aegis Gateway
//!
//! Exchange boundary for the Aegis execution engine. Provides:
//! - The [`ExchangeClient`] port with its three-outcome contract
//! - Wire message types for orders, cancels and status queries
//! - Classification of raw venue failures into rejected or transient
//! - A simulated venue with scripted failure injection
//! - Event sinks for execution outcomes
//!
//! ## Architecture
//!
//! ```text
//!   Execution Coordinator
//!         │ ExchangeClient
//!    ┌────▼──────────────┐
//!    │ClassifyingExchange│  VenueError -> Rejected | Transient
//!    └────┬──────────────┘
//!         │ VenueClient
//!    ┌────▼────┐
//!    │  Venue  │  (SimulatedVenue, or a real protocol client)
//!    └─────────┘
//! ```
//!
//! The facade never retries. Retry policy belongs to the coordinator.

pub mod adapters;
pub mod error;
pub mod exchange;
pub mod messages;
pub mod transport;

// Re-export commonly used types
pub use adapters::simulator::{
    Fault, FillMode, SimulatedVenue, SimulatorConfig, VenueEvent, VenueOp,
};
pub use error::{ExchangeError, VenueError};
pub use exchange::{ClassifyingExchange, ExchangeClient, VenueClient};
pub use messages::order::{
    CancelAck, CancelRequest, OrderAck, OrderRequest, OrderStatusReport, OrderTypeWire,
    StatusQuery, TimeInForceWire, VenueOrderState,
};
pub use transport::{ChannelEventSink, EventSubscriber, RecordingSink};
