//! Interaction router.
//!
//! Interactions are acknowledgment-requiring inbound events: slash-style
//! commands, context-menu commands, component presses, modal submissions,
//! and autocomplete queries. Each kind routes through its own handler
//! table; within a table, exact-id entries are checked before pattern
//! entries and at most one handler runs per inbound interaction.
//!
//! Unmatched interactions are silently dropped — when several process
//! instances share one application, each instance only knows its own ids.
//!
//! The slash and context-menu tables double as the source of the declarative
//! command manifest; see [`manifest`] for the publish path.

pub mod manifest;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{Level, debug, error, span};

use lattice_core::{BoxError, Event};

pub use manifest::{
    BotCredentials, CommandManifestEntry, DeploySummary, ManifestError, ManifestKind,
    ManifestScope, ManifestTransport,
};

/// Reply sent when a handler fails and nothing better is registered.
const GENERIC_FAILURE: &str = "Sorry, something went wrong handling that.";

/// The interaction kinds the router discriminates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Slash,
    ContextMenu,
    Component,
    Modal,
    Autocomplete,
}

impl InteractionKind {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "slash" => Self::Slash,
            "context_menu" => Self::ContextMenu,
            "component" => Self::Component,
            "modal" => Self::Modal,
            "autocomplete" => Self::Autocomplete,
            _ => return None,
        })
    }
}

/// Errors from the acknowledgment state machine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AckError {
    /// `reply`/`defer` called on an already-acknowledged interaction.
    #[error("interaction was already acknowledged")]
    AlreadyAcknowledged,
    /// `follow_up` called before any acknowledgment.
    #[error("interaction has not been acknowledged yet")]
    NotAcknowledged,
}

/// Responses recorded against an interaction, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionReply {
    Reply(String),
    Deferred,
    FollowUp(String),
}

/// One inbound interaction.
///
/// The acknowledged flag is atomic: the first `reply`/`defer` wins and any
/// second acknowledgment attempt is rejected, which is what makes the
/// router's exactly-once failure acknowledgment safe.
#[derive(Debug)]
pub struct Interaction {
    kind: InteractionKind,
    id: String,
    community: Option<String>,
    user: String,
    data: Value,
    acknowledged: AtomicBool,
    replies: Mutex<Vec<InteractionReply>>,
}

impl Interaction {
    pub fn new(kind: InteractionKind, id: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            community: None,
            user: user.into(),
            data: Value::Null,
            acknowledged: AtomicBool::new(false),
            replies: Mutex::new(Vec::new()),
        }
    }

    pub fn with_community(mut self, community: impl Into<String>) -> Self {
        self.community = Some(community.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Parses the platform's single "interaction received" event.
    ///
    /// Expected payload shape:
    /// `{ "kind": "component", "id": "...", "user": "...", "community": ..., "data": ... }`
    pub fn from_event(event: &Event) -> Option<Self> {
        let payload = event.payload();
        let kind = InteractionKind::parse(payload.get("kind")?.as_str()?)?;
        let id = payload.get("id")?.as_str()?.to_string();
        let user = payload.get("user")?.as_str()?.to_string();
        let mut interaction = Self::new(kind, id, user);
        if let Some(community) = payload.get("community").and_then(Value::as_str) {
            interaction = interaction.with_community(community);
        }
        if let Some(data) = payload.get("data") {
            interaction = interaction.with_data(data.clone());
        }
        Some(interaction)
    }

    pub fn kind(&self) -> InteractionKind {
        self.kind
    }

    /// The routing id: command name for slash/context-menu/autocomplete,
    /// the component or modal custom id otherwise.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn community(&self) -> Option<&str> {
        self.community.as_deref()
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::SeqCst)
    }

    /// First acknowledgment with a message.
    pub fn reply(&self, message: impl Into<String>) -> Result<(), AckError> {
        self.acknowledge(InteractionReply::Reply(message.into()))
    }

    /// First acknowledgment without content, buying time for a follow-up.
    pub fn defer(&self) -> Result<(), AckError> {
        self.acknowledge(InteractionReply::Deferred)
    }

    /// Additional message after the interaction was acknowledged.
    pub fn follow_up(&self, message: impl Into<String>) -> Result<(), AckError> {
        if !self.is_acknowledged() {
            return Err(AckError::NotAcknowledged);
        }
        self.replies.lock().push(InteractionReply::FollowUp(message.into()));
        Ok(())
    }

    fn acknowledge(&self, reply: InteractionReply) -> Result<(), AckError> {
        if self
            .acknowledged
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AckError::AlreadyAcknowledged);
        }
        self.replies.lock().push(reply);
        Ok(())
    }

    /// Drains everything recorded against this interaction.
    pub fn take_replies(&self) -> Vec<InteractionReply> {
        std::mem::take(&mut *self.replies.lock())
    }
}

// ─── Matchers and handlers ───────────────────────────────────────────────────

/// How a table entry matches an inbound interaction id.
///
/// The lookup algorithm is fixed — exact entries first, then the first
/// accepting pattern — regardless of which matcher variant an entry uses.
#[derive(Debug, Clone)]
pub enum IdMatcher {
    Exact(String),
    Pattern(Regex),
}

impl IdMatcher {
    pub fn exact(id: impl Into<String>) -> Self {
        Self::Exact(id.into())
    }

    /// Compiles a pattern matcher. The pattern is anchored implicitly by
    /// the caller's choice; no anchoring is added here.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Pattern(Regex::new(pattern)?))
    }

    pub fn matches(&self, id: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == id,
            Self::Pattern(regex) => regex.is_match(id),
        }
    }

    fn exact_key(&self) -> Option<&str> {
        match self {
            Self::Exact(exact) => Some(exact),
            Self::Pattern(_) => None,
        }
    }
}

/// Async interaction handler.
pub trait InteractionHandler: Send + Sync {
    fn call(&self, interaction: Arc<Interaction>) -> BoxFuture<'static, Result<(), BoxError>>;
}

impl<F, Fut> InteractionHandler for F
where
    F: Fn(Arc<Interaction>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn call(&self, interaction: Arc<Interaction>) -> BoxFuture<'static, Result<(), BoxError>> {
        Box::pin(self(interaction))
    }
}

/// Identifies one routing entry for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u64);

struct RouteEntry {
    id: EntryId,
    matcher: IdMatcher,
    handler: Arc<dyn InteractionHandler>,
    manifest: Option<CommandManifestEntry>,
}

/// One handler table: insertion-ordered entries with an exact-id index.
#[derive(Default)]
struct RouteTable {
    entries: Vec<RouteEntry>,
    exact_index: HashMap<String, EntryId>,
}

impl RouteTable {
    /// Inserts an entry. An exact matcher replaces any previous entry with
    /// the same exact id (same-name re-registration overwrites).
    fn insert(&mut self, entry: RouteEntry) {
        if let Some(key) = entry.matcher.exact_key() {
            if let Some(&previous) = self.exact_index.get(key) {
                self.entries.retain(|e| e.id != previous);
            }
            self.exact_index.insert(key.to_string(), entry.id);
        }
        self.entries.push(entry);
    }

    fn remove(&mut self, id: EntryId) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = self.entries.remove(pos);
        if let Some(key) = entry.matcher.exact_key() {
            self.exact_index.remove(key);
        }
        true
    }

    /// Exact match first, then the first accepting pattern.
    fn find(&self, id: &str) -> Option<Arc<dyn InteractionHandler>> {
        if let Some(&entry_id) = self.exact_index.get(id) {
            return self
                .entries
                .iter()
                .find(|e| e.id == entry_id)
                .map(|e| Arc::clone(&e.handler));
        }
        self.entries
            .iter()
            .find(|e| matches!(e.matcher, IdMatcher::Pattern(_)) && e.matcher.matches(id))
            .map(|e| Arc::clone(&e.handler))
    }

    fn manifest_entries(&self) -> impl Iterator<Item = &CommandManifestEntry> {
        self.entries.iter().filter_map(|e| e.manifest.as_ref())
    }
}

// ─── InteractionRouter ───────────────────────────────────────────────────────

/// Routes inbound interactions to their handler tables and owns the
/// declarative command manifest.
pub struct InteractionRouter {
    slash: RwLock<RouteTable>,
    context_menus: RwLock<RouteTable>,
    components: RwLock<RouteTable>,
    modals: RwLock<RouteTable>,
    autocomplete: RwLock<RouteTable>,
    next_id: AtomicU64,
}

impl Default for InteractionRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionRouter {
    pub fn new() -> Self {
        Self {
            slash: RwLock::new(RouteTable::default()),
            context_menus: RwLock::new(RouteTable::default()),
            components: RwLock::new(RouteTable::default()),
            modals: RwLock::new(RouteTable::default()),
            autocomplete: RwLock::new(RouteTable::default()),
            next_id: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> EntryId {
        EntryId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn table(&self, kind: InteractionKind) -> &RwLock<RouteTable> {
        match kind {
            InteractionKind::Slash => &self.slash,
            InteractionKind::ContextMenu => &self.context_menus,
            InteractionKind::Component => &self.components,
            InteractionKind::Modal => &self.modals,
            InteractionKind::Autocomplete => &self.autocomplete,
        }
    }

    /// Registers a slash-style command; the manifest entry is what gets
    /// published by [`deploy_manifest`](Self::deploy_manifest).
    pub fn register_slash(
        &self,
        entry: CommandManifestEntry,
        handler: impl InteractionHandler + 'static,
    ) -> EntryId {
        let id = self.next_id();
        self.slash.write().insert(RouteEntry {
            id,
            matcher: IdMatcher::exact(entry.name.clone()),
            handler: Arc::new(handler),
            manifest: Some(entry),
        });
        id
    }

    /// Registers a context-menu command (user or message kind).
    pub fn register_context_menu(
        &self,
        entry: CommandManifestEntry,
        handler: impl InteractionHandler + 'static,
    ) -> EntryId {
        let id = self.next_id();
        self.context_menus.write().insert(RouteEntry {
            id,
            matcher: IdMatcher::exact(entry.name.clone()),
            handler: Arc::new(handler),
            manifest: Some(entry),
        });
        id
    }

    /// Registers a component callback keyed by literal id or pattern.
    pub fn register_component(
        &self,
        matcher: IdMatcher,
        handler: impl InteractionHandler + 'static,
    ) -> EntryId {
        self.register_plain(InteractionKind::Component, matcher, handler)
    }

    /// Registers a modal-submission callback keyed by literal id or pattern.
    pub fn register_modal(
        &self,
        matcher: IdMatcher,
        handler: impl InteractionHandler + 'static,
    ) -> EntryId {
        self.register_plain(InteractionKind::Modal, matcher, handler)
    }

    /// Registers an autocomplete provider for a command name.
    pub fn register_autocomplete(
        &self,
        command: impl Into<String>,
        handler: impl InteractionHandler + 'static,
    ) -> EntryId {
        self.register_plain(
            InteractionKind::Autocomplete,
            IdMatcher::exact(command),
            handler,
        )
    }

    fn register_plain(
        &self,
        kind: InteractionKind,
        matcher: IdMatcher,
        handler: impl InteractionHandler + 'static,
    ) -> EntryId {
        let id = self.next_id();
        self.table(kind).write().insert(RouteEntry {
            id,
            matcher,
            handler: Arc::new(handler),
            manifest: None,
        });
        id
    }

    /// Removes an entry from whichever table holds it.
    pub fn remove(&self, id: EntryId) -> bool {
        [
            &self.slash,
            &self.context_menus,
            &self.components,
            &self.modals,
            &self.autocomplete,
        ]
        .into_iter()
        .any(|table| table.write().remove(id))
    }

    /// Number of entries across all tables.
    pub fn len(&self) -> usize {
        [
            &self.slash,
            &self.context_menus,
            &self.components,
            &self.modals,
            &self.autocomplete,
        ]
        .into_iter()
        .map(|table| table.read().entries.len())
        .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Routes one inbound interaction to at most one handler of its table.
    ///
    /// Handler failures are isolated here and answered with a single
    /// generic acknowledgment: a `reply` when the handler never
    /// acknowledged, a `follow_up` when it already had.
    pub async fn route(&self, interaction: Arc<Interaction>) {
        let span = span!(
            Level::DEBUG,
            "route_interaction",
            kind = ?interaction.kind(),
            id = interaction.id()
        );
        let _enter = span.enter();

        let handler = self.table(interaction.kind()).read().find(interaction.id());
        let Some(handler) = handler else {
            debug!("No handler for interaction, ignoring");
            return;
        };

        if let Err(e) = handler.call(Arc::clone(&interaction)).await {
            error!(error = %e, "Interaction handler failed");
            let result = if interaction.is_acknowledged() {
                interaction.follow_up(GENERIC_FAILURE)
            } else {
                interaction.reply(GENERIC_FAILURE)
            };
            if let Err(ack) = result {
                // Lost a race with the failing handler's own late reply;
                // never acknowledge twice.
                debug!(error = %ack, "Skipped failure acknowledgment");
            }
        }
    }

    /// Serializes every slash and context-menu registration into the
    /// platform manifest shape, slash entries first.
    pub fn manifest(&self) -> Vec<Value> {
        let slash = self.slash.read();
        let menus = self.context_menus.read();
        slash
            .manifest_entries()
            .chain(menus.manifest_entries())
            .map(CommandManifestEntry::to_manifest_value)
            .collect()
    }

    /// Full-replace publish of the manifest to the platform's remote
    /// command catalog.
    ///
    /// Scoped to one community when `community_id` is given (fast
    /// propagation, for iteration), global otherwise. Reports the exact
    /// published count and fails loudly on transport error.
    pub async fn deploy_manifest(
        &self,
        transport: &dyn ManifestTransport,
        credentials: &BotCredentials,
        application_id: &str,
        community_id: Option<&str>,
    ) -> Result<DeploySummary, ManifestError> {
        let body = Value::Array(self.manifest());
        let scope = ManifestScope {
            application_id: application_id.to_string(),
            community_id: community_id.map(str::to_string),
        };

        let published = transport
            .put_commands(credentials, &scope, &body)
            .await
            .map_err(|source| {
                error!(error = %source, "Manifest publish failed");
                ManifestError::Transport(source)
            })?;

        tracing::info!(
            published,
            community = community_id.unwrap_or("<global>"),
            "Manifest published"
        );
        Ok(DeploySummary { published, scope })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: Arc<AtomicUsize>) -> impl InteractionHandler {
        move |_interaction: Arc<Interaction>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn exact_entry_wins_over_pattern() {
        let router = InteractionRouter::new();
        let exact_hits = Arc::new(AtomicUsize::new(0));
        let pattern_hits = Arc::new(AtomicUsize::new(0));

        router.register_component(
            IdMatcher::pattern("^ticket:").unwrap(),
            counting(Arc::clone(&pattern_hits)),
        );
        router.register_component(IdMatcher::exact("ticket:close"), counting(Arc::clone(&exact_hits)));

        router
            .route(Arc::new(Interaction::new(
                InteractionKind::Component,
                "ticket:close",
                "u1",
            )))
            .await;

        assert_eq!(exact_hits.load(Ordering::SeqCst), 1);
        assert_eq!(pattern_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn first_matching_pattern_wins() {
        let router = InteractionRouter::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        router.register_component(IdMatcher::pattern("^ticket:").unwrap(), counting(Arc::clone(&first)));
        router.register_component(IdMatcher::pattern("^ticket:open:").unwrap(), counting(Arc::clone(&second)));

        router
            .route(Arc::new(Interaction::new(
                InteractionKind::Component,
                "ticket:open:42",
                "u1",
            )))
            .await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unmatched_interaction_is_silently_ignored() {
        let router = InteractionRouter::new();
        let interaction = Arc::new(Interaction::new(
            InteractionKind::Component,
            "unknown",
            "u1",
        ));
        router.route(Arc::clone(&interaction)).await;
        assert!(!interaction.is_acknowledged());
        assert!(interaction.take_replies().is_empty());
    }

    #[tokio::test]
    async fn tables_are_independent() {
        let router = InteractionRouter::new();
        let modal_hits = Arc::new(AtomicUsize::new(0));
        router.register_modal(IdMatcher::exact("report"), counting(Arc::clone(&modal_hits)));

        // Same id arriving as a component must not hit the modal table.
        router
            .route(Arc::new(Interaction::new(
                InteractionKind::Component,
                "report",
                "u1",
            )))
            .await;
        assert_eq!(modal_hits.load(Ordering::SeqCst), 0);

        router
            .route(Arc::new(Interaction::new(
                InteractionKind::Modal,
                "report",
                "u1",
            )))
            .await;
        assert_eq!(modal_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_handler_gets_exactly_one_generic_reply() {
        let router = InteractionRouter::new();
        router.register_component(IdMatcher::exact("boom"), |_i: Arc<Interaction>| async {
            Err::<(), BoxError>("broken".into())
        });

        let interaction = Arc::new(Interaction::new(InteractionKind::Component, "boom", "u1"));
        router.route(Arc::clone(&interaction)).await;

        let replies = interaction.take_replies();
        assert_eq!(replies.len(), 1);
        assert!(matches!(replies[0], InteractionReply::Reply(_)));
    }

    #[tokio::test]
    async fn failure_after_defer_becomes_follow_up() {
        let router = InteractionRouter::new();
        router.register_component(IdMatcher::exact("boom"), |i: Arc<Interaction>| async move {
            i.defer().unwrap();
            Err::<(), BoxError>("broken".into())
        });

        let interaction = Arc::new(Interaction::new(InteractionKind::Component, "boom", "u1"));
        router.route(Arc::clone(&interaction)).await;

        let replies = interaction.take_replies();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], InteractionReply::Deferred);
        assert!(matches!(replies[1], InteractionReply::FollowUp(_)));
    }

    #[test]
    fn double_acknowledgment_is_rejected() {
        let interaction = Interaction::new(InteractionKind::Slash, "ping", "u1");
        interaction.reply("pong").unwrap();
        assert_eq!(
            interaction.reply("again").unwrap_err(),
            AckError::AlreadyAcknowledged
        );
        assert_eq!(interaction.defer().unwrap_err(), AckError::AlreadyAcknowledged);
        interaction.follow_up("more").unwrap();
    }

    #[test]
    fn follow_up_requires_acknowledgment() {
        let interaction = Interaction::new(InteractionKind::Slash, "ping", "u1");
        assert_eq!(
            interaction.follow_up("early").unwrap_err(),
            AckError::NotAcknowledged
        );
    }

    #[test]
    fn interaction_parses_from_platform_event() {
        let event = Event::new(
            "interaction",
            json!({
                "kind": "slash",
                "id": "ping",
                "user": "u1",
                "community": "guild-1",
                "data": {"options": []}
            }),
        );
        let interaction = Interaction::from_event(&event).unwrap();
        assert_eq!(interaction.kind(), InteractionKind::Slash);
        assert_eq!(interaction.id(), "ping");
        assert_eq!(interaction.community(), Some("guild-1"));

        let bogus = Event::new("interaction", json!({"kind": "nope"}));
        assert!(Interaction::from_event(&bogus).is_none());
    }

    #[tokio::test]
    async fn removed_entry_no_longer_routes() {
        let router = InteractionRouter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let id = router.register_component(IdMatcher::exact("x"), counting(Arc::clone(&hits)));

        assert!(router.remove(id));
        assert!(!router.remove(id));

        router
            .route(Arc::new(Interaction::new(InteractionKind::Component, "x", "u1")))
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
