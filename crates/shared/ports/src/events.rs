use aegis_core::ExecutionEvent;

/// Port for outcome events
///
/// `publish` must not block: it is called from order tasks while they
/// hold no locks, but a slow sink still delays that order.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ExecutionEvent);
}
