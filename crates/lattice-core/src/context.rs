//! Invocation context passed to command handlers.

use std::collections::BTreeSet;

use parking_lot::Mutex;

use crate::event::SharedEvent;

/// The user on whose behalf a command is being dispatched.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    /// Platform user id.
    pub id: String,
    /// Permission tags granted to this user in the invoking community.
    pub permissions: BTreeSet<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            permissions: BTreeSet::new(),
        }
    }

    /// Builder-style permission grant.
    pub fn with_permission(mut self, tag: impl Into<String>) -> Self {
        self.permissions.insert(tag.into());
        self
    }

    /// Whether this actor holds every tag in `required`.
    pub fn satisfies(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.permissions)
    }
}

/// Context handed to every command handler as its first argument.
///
/// Replies are captured on the context; the adapter that produced the
/// invocation drains them back to the platform once dispatch completes.
#[derive(Debug)]
pub struct CommandContext {
    community: Option<String>,
    actor: Actor,
    event: Option<SharedEvent>,
    replies: Mutex<Vec<String>>,
}

impl CommandContext {
    pub fn new(community: Option<String>, actor: Actor) -> Self {
        Self {
            community,
            actor,
            event: None,
            replies: Mutex::new(Vec::new()),
        }
    }

    /// Attaches the originating platform event.
    pub fn with_event(mut self, event: SharedEvent) -> Self {
        self.event = Some(event);
        self
    }

    /// Community (guild/workspace) the invocation came from, if any.
    pub fn community(&self) -> Option<&str> {
        self.community.as_deref()
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// The originating platform event, when the invocation came off the wire.
    pub fn event(&self) -> Option<&SharedEvent> {
        self.event.as_ref()
    }

    /// Queues a user-visible reply.
    pub fn reply(&self, message: impl Into<String>) {
        self.replies.lock().push(message.into());
    }

    /// Drains every queued reply, oldest first.
    pub fn take_replies(&self) -> Vec<String> {
        std::mem::take(&mut *self.replies.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_permission_subset() {
        let actor = Actor::new("u1")
            .with_permission("manage_messages")
            .with_permission("kick_members");

        let mut required = BTreeSet::new();
        required.insert("manage_messages".to_string());
        assert!(actor.satisfies(&required));

        required.insert("administrator".to_string());
        assert!(!actor.satisfies(&required));
    }

    #[test]
    fn replies_drain_in_order() {
        let ctx = CommandContext::new(None, Actor::new("u1"));
        ctx.reply("first");
        ctx.reply("second");
        assert_eq!(ctx.take_replies(), vec!["first", "second"]);
        assert!(ctx.take_replies().is_empty());
    }
}
