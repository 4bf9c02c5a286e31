//! Tokio channel-based event transport for single-process mode
//!
//! Uses broadcast channels for pub/sub semantics within a single process.
//! No serialization overhead - events are passed directly.

use aegis_core::ExecutionEvent;
use aegis_ports::EventSink;
use log::{debug, warn};
use tokio::sync::broadcast;

/// Event sink publishing to a broadcast channel
pub struct ChannelEventSink {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl ChannelEventSink {
    /// Create a sink/subscriber pair with given capacity
    pub fn pair(capacity: usize) -> (Self, EventSubscriber) {
        let (tx, rx) = broadcast::channel(capacity);
        (Self { tx }, EventSubscriber { rx })
    }

    /// Get another subscriber for this sink
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            rx: self.tx.subscribe(),
        }
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: ExecutionEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            debug!("[EVENTS] no subscribers for {}", kind);
        }
    }
}

/// Receiving side of a [`ChannelEventSink`]
pub struct EventSubscriber {
    rx: broadcast::Receiver<ExecutionEvent>,
}

impl EventSubscriber {
    /// Wait for the next event; `None` once every sink is dropped
    pub async fn next(&mut self) -> Option<ExecutionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Skip lagged events and continue
                    warn!("[EVENTS] subscriber lagged, {} events skipped", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive without waiting
    pub fn try_next(&mut self) -> Option<ExecutionEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
