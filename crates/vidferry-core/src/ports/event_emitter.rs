//! Session event emitter port.
//!
//! This port abstracts event emission, allowing sessions to report
//! progress and state changes without coupling to transport details
//! (chat message edits, SSE, logs).

use crate::events::SessionEvent;

/// Port for emitting session events.
///
/// Implementations handle the actual delivery (channels, chat edits).
/// `emit` is called from session tasks and must not block.
pub trait SessionEventEmitter: Send + Sync {
    /// Emit a session event.
    fn emit(&self, event: SessionEvent);

    /// Clone this emitter into a boxed trait object.
    ///
    /// This enables cloning of `Arc<dyn SessionEventEmitter>` without
    /// requiring the underlying type to implement Clone.
    fn clone_box(&self) -> Box<dyn SessionEventEmitter>;
}

/// A no-op emitter for tests and contexts without a user-facing surface.
#[derive(Debug, Clone, Default)]
pub struct NoopSessionEmitter;

impl NoopSessionEmitter {
    /// Create a new no-op emitter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SessionEventEmitter for NoopSessionEmitter {
    fn emit(&self, _event: SessionEvent) {
        // Intentionally do nothing
    }

    fn clone_box(&self) -> Box<dyn SessionEventEmitter> {
        Box::new(self.clone())
    }
}

/// An emitter that logs every event at debug level.
///
/// Useful as the default wiring for headless deployments where the chat
/// adapter is attached separately.
#[derive(Debug, Clone, Default)]
pub struct TracingSessionEmitter;

impl TracingSessionEmitter {
    /// Create a new tracing emitter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SessionEventEmitter for TracingSessionEmitter {
    fn emit(&self, event: SessionEvent) {
        tracing::debug!(
            request_id = %event.request_id(),
            event = event.event_name(),
            "session event"
        );
    }

    fn clone_box(&self) -> Box<dyn SessionEventEmitter> {
        Box::new(self.clone())
    }
}
