//! Platform event representation.
//!
//! The chat-platform SDK emits named events with a JSON payload; the
//! registries key their subscription tables on the event *name*, so the
//! payload stays schemaless at this layer. Adapters that know the concrete
//! shape deserialize the payload on their side of the seam.

use std::sync::Arc;

use serde_json::Value;

/// A single event emitted by the platform SDK.
///
/// Events are shared across every handler of one emission via
/// [`SharedEvent`]; handlers receive a reference, never a copy, and must not
/// assume exclusive access to the payload.
#[derive(Debug, Clone)]
pub struct Event {
    name: String,
    payload: Value,
}

/// An event shared across all handlers of one emission.
pub type SharedEvent = Arc<Event>;

impl Event {
    /// Creates a new event with the given name and payload.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Creates an event with an empty (`null`) payload.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }

    /// Returns the event name (e.g. `"message_create"`, `"interaction"`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the raw JSON payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Convenience: wraps the event for fan-out.
    pub fn into_shared(self) -> SharedEvent {
        Arc::new(self)
    }
}
