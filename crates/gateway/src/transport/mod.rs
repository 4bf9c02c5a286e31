//! Outcome event transport
//!
//! [`EventSink`](aegis_ports::EventSink) implementations: a tokio broadcast
//! channel for live consumers and an in-memory recorder.

pub mod channel;
pub mod memory;

pub use channel::{ChannelEventSink, EventSubscriber};
pub use memory::RecordingSink;
