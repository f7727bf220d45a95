//! Platform SDK seam: event subscription.
//!
//! The actual chat-platform client (connection, gateway, REST) lives outside
//! this workspace. The framework only needs an `on`/`off`-style subscription
//! surface, captured by the [`Gateway`] trait. The event dispatcher attaches
//! **one** listener per event name and fans out internally, so the trait
//! never sees per-handler registrations.
//!
//! [`LocalGateway`] is the in-process implementation used by the runtime's
//! demo wiring and by unit tests; a production deployment substitutes the
//! real SDK behind the same trait.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::trace;

use crate::event::SharedEvent;

/// Callback invoked by the gateway for every emission of a subscribed event.
pub type EventSink = Arc<dyn Fn(SharedEvent) + Send + Sync>;

/// Identifies one platform-level listener attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Event-subscription surface of the platform SDK.
pub trait Gateway: Send + Sync {
    /// Attaches a listener for the named event and returns its id.
    fn attach(&self, event_name: &str, sink: EventSink) -> ListenerId;

    /// Detaches a previously attached listener. Unknown ids are ignored.
    fn detach(&self, id: ListenerId);
}

// ─── LocalGateway ─────────────────────────────────────────────────────────────

struct Attachment {
    id: ListenerId,
    event_name: String,
    sink: EventSink,
}

/// In-process [`Gateway`] implementation.
///
/// Emissions are delivered synchronously to every attached sink, in
/// attachment order. The dispatcher's sinks spawn their own async fan-out,
/// so delivery here never blocks on handler work.
#[derive(Default)]
pub struct LocalGateway {
    listeners: RwLock<HashMap<String, Vec<Attachment>>>,
    next_id: AtomicU64,
}

impl LocalGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers an event to every listener attached for its name.
    pub fn emit(&self, event: SharedEvent) {
        let listeners = self.listeners.read();
        if let Some(attachments) = listeners.get(event.name()) {
            trace!(event = event.name(), sinks = attachments.len(), "Gateway emit");
            for attachment in attachments {
                (attachment.sink)(Arc::clone(&event));
            }
        }
    }

    /// Number of listeners currently attached for `event_name`.
    pub fn listener_count(&self, event_name: &str) -> usize {
        self.listeners
            .read()
            .get(event_name)
            .map_or(0, Vec::len)
    }
}

impl Gateway for LocalGateway {
    fn attach(&self, event_name: &str, sink: EventSink) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(event_name.to_string())
            .or_default()
            .push(Attachment {
                id,
                event_name: event_name.to_string(),
                sink,
            });
        trace!(event = event_name, ?id, "Gateway listener attached");
        id
    }

    fn detach(&self, id: ListenerId) {
        let mut listeners = self.listeners.write();
        let mut emptied = None;
        for (name, attachments) in listeners.iter_mut() {
            if let Some(pos) = attachments.iter().position(|a| a.id == id) {
                let removed = attachments.remove(pos);
                trace!(event = %removed.event_name, ?id, "Gateway listener detached");
                if attachments.is_empty() {
                    emptied = Some(name.clone());
                }
                break;
            }
        }
        if let Some(name) = emptied {
            listeners.remove(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn emit_reaches_only_matching_listeners() {
        let gateway = LocalGateway::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        gateway.attach(
            "message_create",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        gateway.emit(Event::named("message_create").into_shared());
        gateway.emit(Event::named("member_join").into_shared());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detach_removes_listener_and_empty_bucket() {
        let gateway = LocalGateway::new();
        let id = gateway.attach("message_create", Arc::new(|_| {}));
        assert_eq!(gateway.listener_count("message_create"), 1);

        gateway.detach(id);
        assert_eq!(gateway.listener_count("message_create"), 0);

        // Detaching twice is a no-op.
        gateway.detach(id);
    }
}
