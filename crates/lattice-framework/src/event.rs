//! Event registry and dispatcher.
//!
//! Named subscriptions fan out from a *single* platform-level listener per
//! event name: the first subscription for a name attaches one gateway
//! listener, later subscriptions reuse it, and removing the last one
//! detaches it. Handlers fire in registration order, each isolated so one
//! failure cannot starve its siblings.
//!
//! Ordering within one emission: pre-filter veto → named handlers
//! (registration order, `once` entries removed right after their own call
//! completes) → the global fallthrough handler → wildcard listeners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{Level, debug, error, span, trace};

use lattice_core::{BoxError, Event, Gateway, ListenerId, SharedEvent};

/// Failure modes of [`EventDispatcher::wait_for`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    /// No matching event arrived inside the window.
    #[error("timed out waiting for event")]
    Timeout,
}

/// Async event handler.
pub trait EventHandler: Send + Sync {
    fn call(&self, event: SharedEvent) -> BoxFuture<'static, Result<(), BoxError>>;
}

impl<F, Fut> EventHandler for F
where
    F: Fn(SharedEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn call(&self, event: SharedEvent) -> BoxFuture<'static, Result<(), BoxError>> {
        Box::pin(self(event))
    }
}

/// Global before-event middleware; returning `false` vetoes the emission.
pub type PreFilter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Identifies one subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Options accepted at subscription time.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Remove the registration after its first invocation.
    pub once: bool,
    /// Diagnostic label carried in dispatch logs.
    pub group: Option<String>,
}

impl SubscribeOptions {
    pub fn once() -> Self {
        Self {
            once: true,
            group: None,
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            once: false,
            group: Some(name.into()),
        }
    }
}

#[derive(Clone)]
struct Registration {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
    once: bool,
    group: Option<String>,
}

struct Stream {
    listener: ListenerId,
    entries: Vec<Registration>,
}

struct Inner {
    gateway: Arc<dyn Gateway>,
    streams: RwLock<HashMap<String, Stream>>,
    wildcards: RwLock<Vec<Registration>>,
    fallthrough: RwLock<Option<Arc<dyn EventHandler>>>,
    pre_filter: RwLock<Option<PreFilter>>,
    next_id: AtomicU64,
}

/// Owns named event subscriptions and bridges platform emissions into them.
///
/// Cloning is cheap and shares the subscription tables.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<Inner>,
}

impl EventDispatcher {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                streams: RwLock::new(HashMap::new()),
                wildcards: RwLock::new(Vec::new()),
                fallthrough: RwLock::new(None),
                pre_filter: RwLock::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a handler for `event_name`.
    ///
    /// The first registration for a name attaches one gateway listener;
    /// subsequent registrations reuse it and the dispatcher fans out
    /// internally.
    pub fn subscribe(
        &self,
        event_name: &str,
        handler: impl EventHandler + 'static,
        options: SubscribeOptions,
    ) -> SubscriptionId {
        let id = self.next_id();
        let registration = Registration {
            id,
            handler: Arc::new(handler),
            once: options.once,
            group: options.group,
        };

        let mut streams = self.inner.streams.write();
        match streams.get_mut(event_name) {
            Some(stream) => stream.entries.push(registration),
            None => {
                let listener = self.attach_listener(event_name);
                streams.insert(
                    event_name.to_string(),
                    Stream {
                        listener,
                        entries: vec![registration],
                    },
                );
            }
        }
        trace!(event = event_name, ?id, "Event subscription added");
        id
    }

    /// Registers a wildcard listener invoked for every emission, after the
    /// named handlers and the fallthrough handler.
    pub fn subscribe_wildcard(&self, handler: impl EventHandler + 'static) -> SubscriptionId {
        let id = self.next_id();
        self.inner.wildcards.write().push(Registration {
            id,
            handler: Arc::new(handler),
            once: false,
            group: None,
        });
        id
    }

    /// Sets the global "all events" handler.
    pub fn set_fallthrough(&self, handler: impl EventHandler + 'static) {
        *self.inner.fallthrough.write() = Some(Arc::new(handler));
    }

    /// Sets the before-event middleware. Returning `false` vetoes all
    /// processing of that emission.
    pub fn set_pre_filter(&self, filter: impl Fn(&Event) -> bool + Send + Sync + 'static) {
        *self.inner.pre_filter.write() = Some(Arc::new(filter));
    }

    /// Removes a single subscription by id. Detaches the gateway listener
    /// when the last registration for a name goes away.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        {
            let mut streams = self.inner.streams.write();
            let mut emptied: Option<String> = None;
            for (name, stream) in streams.iter_mut() {
                if let Some(pos) = stream.entries.iter().position(|r| r.id == id) {
                    stream.entries.remove(pos);
                    if stream.entries.is_empty() {
                        emptied = Some(name.clone());
                    } else {
                        return true;
                    }
                    break;
                }
            }
            if let Some(name) = emptied {
                let stream = streams.remove(&name).expect("stream present under lock");
                self.inner.gateway.detach(stream.listener);
                trace!(event = %name, "Last subscription removed, listener detached");
                return true;
            }
        }

        let mut wildcards = self.inner.wildcards.write();
        if let Some(pos) = wildcards.iter().position(|r| r.id == id) {
            wildcards.remove(pos);
            return true;
        }
        false
    }

    /// Removes every handler for `event_name` and detaches its listener.
    pub fn unsubscribe_all(&self, event_name: &str) {
        if let Some(stream) = self.inner.streams.write().remove(event_name) {
            self.inner.gateway.detach(stream.listener);
        }
    }

    /// Number of live registrations for `event_name`.
    pub fn subscription_count(&self, event_name: &str) -> usize {
        self.inner
            .streams
            .read()
            .get(event_name)
            .map_or(0, |s| s.entries.len())
    }

    /// Delivers one emission through the full pipeline.
    ///
    /// The runtime's gateway bridge calls this; tests may call it directly.
    pub async fn emit(&self, event: SharedEvent) {
        Inner::emit(Arc::clone(&self.inner), event).await;
    }

    /// Resolves with the first emission of `event_name` accepted by
    /// `predicate`, or fails with [`WaitError::Timeout`].
    ///
    /// The temporary subscription is removed on both outcomes — a timed-out
    /// wait leaves no one-shot listener behind.
    pub async fn wait_for(
        &self,
        event_name: &str,
        predicate: impl Fn(&Event) -> bool + Send + Sync + 'static,
        timeout: Duration,
    ) -> Result<SharedEvent, WaitError> {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let predicate = Arc::new(predicate);

        let id = self.subscribe(
            event_name,
            move |event: SharedEvent| {
                let slot = Arc::clone(&slot);
                let predicate = Arc::clone(&predicate);
                async move {
                    if predicate(&event)
                        && let Some(tx) = slot.lock().take()
                    {
                        let _ = tx.send(event);
                    }
                    Ok(())
                }
            },
            SubscribeOptions::default(),
        );

        let result = tokio::time::timeout(timeout, rx).await;
        self.unsubscribe(id);

        match result {
            Ok(Ok(event)) => Ok(event),
            _ => Err(WaitError::Timeout),
        }
    }

    fn attach_listener(&self, event_name: &str) -> ListenerId {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.gateway.attach(
            event_name,
            Arc::new(move |event| {
                if let Some(inner) = weak.upgrade() {
                    tokio::spawn(Inner::emit(inner, event));
                }
            }),
        )
    }
}

impl Inner {
    async fn emit(inner: Arc<Inner>, event: SharedEvent) {
        let span = span!(Level::DEBUG, "dispatch_event", event = event.name());
        let _enter = span.enter();

        if let Some(filter) = inner.pre_filter.read().clone()
            && !filter(&event)
        {
            debug!("Emission vetoed by pre-filter");
            return;
        }

        // Snapshot so handlers registered mid-dispatch only see later
        // emissions, and removal of `once` entries does not skew iteration.
        let named: Vec<Registration> = inner
            .streams
            .read()
            .get(event.name())
            .map(|s| s.entries.clone())
            .unwrap_or_default();

        for registration in &named {
            Self::invoke(registration, Arc::clone(&event)).await;
            if registration.once {
                Self::remove_registration(&inner, event.name(), registration.id);
            }
        }

        let fallthrough = inner.fallthrough.read().clone();
        if let Some(handler) = fallthrough
            && let Err(e) = handler.call(Arc::clone(&event)).await
        {
            error!(error = %e, "Fallthrough event handler failed");
        }

        let wildcards: Vec<Registration> = inner.wildcards.read().clone();
        for registration in &wildcards {
            Self::invoke(registration, Arc::clone(&event)).await;
        }
    }

    async fn invoke(registration: &Registration, event: SharedEvent) {
        if let Err(e) = registration.handler.call(event).await {
            error!(
                group = registration.group.as_deref().unwrap_or("unnamed"),
                error = %e,
                "Event handler failed"
            );
        }
    }

    fn remove_registration(inner: &Arc<Inner>, event_name: &str, id: SubscriptionId) {
        let mut streams = inner.streams.write();
        let Some(stream) = streams.get_mut(event_name) else {
            return;
        };
        if let Some(pos) = stream.entries.iter().position(|r| r.id == id) {
            stream.entries.remove(pos);
        }
        if stream.entries.is_empty() {
            let stream = streams.remove(event_name).expect("stream present under lock");
            inner.gateway.detach(stream.listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::LocalGateway;
    use std::sync::atomic::AtomicUsize;

    fn setup() -> (Arc<LocalGateway>, EventDispatcher) {
        let gateway = Arc::new(LocalGateway::new());
        let dispatcher = EventDispatcher::new(Arc::clone(&gateway) as Arc<dyn Gateway>);
        (gateway, dispatcher)
    }

    fn counting(counter: Arc<AtomicUsize>) -> impl EventHandler {
        move |_event: SharedEvent| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn handlers_share_one_gateway_listener() {
        let (gateway, dispatcher) = setup();
        let hits = Arc::new(AtomicUsize::new(0));

        dispatcher.subscribe("message_create", counting(Arc::clone(&hits)), SubscribeOptions::default());
        dispatcher.subscribe("message_create", counting(Arc::clone(&hits)), SubscribeOptions::default());

        assert_eq!(gateway.listener_count("message_create"), 1);

        dispatcher
            .emit(Event::named("message_create").into_shared())
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_handler_does_not_starve_siblings() {
        let (_gateway, dispatcher) = setup();
        let hits = Arc::new(AtomicUsize::new(0));

        dispatcher.subscribe(
            "message_create",
            |_event: SharedEvent| async { Err::<(), BoxError>("broken".into()) },
            SubscribeOptions::default(),
        );
        dispatcher.subscribe("message_create", counting(Arc::clone(&hits)), SubscribeOptions::default());

        dispatcher
            .emit(Event::named("message_create").into_shared())
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn once_handlers_all_fire_for_single_emission() {
        let (gateway, dispatcher) = setup();
        let hits = Arc::new(AtomicUsize::new(0));

        dispatcher.subscribe("ready", counting(Arc::clone(&hits)), SubscribeOptions::once());
        dispatcher.subscribe("ready", counting(Arc::clone(&hits)), SubscribeOptions::once());

        dispatcher.emit(Event::named("ready").into_shared()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        // Both registrations are gone, and so is the platform listener.
        assert_eq!(dispatcher.subscription_count("ready"), 0);
        assert_eq!(gateway.listener_count("ready"), 0);

        dispatcher.emit(Event::named("ready").into_shared()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_once_handler_is_still_removed() {
        let (_gateway, dispatcher) = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        dispatcher.subscribe(
            "ready",
            move |_event: SharedEvent| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), BoxError>("broken".into())
                }
            },
            SubscribeOptions::once(),
        );

        dispatcher.emit(Event::named("ready").into_shared()).await;
        dispatcher.emit(Event::named("ready").into_shared()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pre_filter_vetoes_everything() {
        let (_gateway, dispatcher) = setup();
        let hits = Arc::new(AtomicUsize::new(0));

        dispatcher.subscribe("message_create", counting(Arc::clone(&hits)), SubscribeOptions::default());
        dispatcher.subscribe_wildcard(counting(Arc::clone(&hits)));
        dispatcher.set_fallthrough(counting(Arc::clone(&hits)));
        dispatcher.set_pre_filter(|_event| false);

        dispatcher
            .emit(Event::named("message_create").into_shared())
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fallthrough_then_wildcards_after_named() {
        let (_gateway, dispatcher) = setup();
        let order = Arc::new(Mutex::new(Vec::new()));

        let named = Arc::clone(&order);
        dispatcher.subscribe(
            "message_create",
            move |_event: SharedEvent| {
                let order = Arc::clone(&named);
                async move {
                    order.lock().push("named");
                    Ok(())
                }
            },
            SubscribeOptions::default(),
        );
        let fall = Arc::clone(&order);
        dispatcher.set_fallthrough(move |_event: SharedEvent| {
            let order = Arc::clone(&fall);
            async move {
                order.lock().push("fallthrough");
                Ok(())
            }
        });
        let wild = Arc::clone(&order);
        dispatcher.subscribe_wildcard(move |_event: SharedEvent| {
            let order = Arc::clone(&wild);
            async move {
                order.lock().push("wildcard");
                Ok(())
            }
        });

        dispatcher
            .emit(Event::named("message_create").into_shared())
            .await;
        assert_eq!(*order.lock(), vec!["named", "fallthrough", "wildcard"]);
    }

    #[tokio::test]
    async fn gateway_emission_reaches_handlers() {
        let (gateway, dispatcher) = setup();
        let hits = Arc::new(AtomicUsize::new(0));
        dispatcher.subscribe("member_join", counting(Arc::clone(&hits)), SubscribeOptions::default());

        gateway.emit(Event::named("member_join").into_shared());
        // The gateway sink spawns the fan-out; let it run.
        tokio::task::yield_now().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wait_for_resolves_on_matching_event() {
        let (_gateway, dispatcher) = setup();

        let waiter = dispatcher.clone();
        let wait = tokio::spawn(async move {
            waiter
                .wait_for(
                    "message_create",
                    |event| event.payload()["author"] == "u1",
                    Duration::from_secs(5),
                )
                .await
        });
        tokio::task::yield_now().await;

        dispatcher
            .emit(Event::new("message_create", serde_json::json!({"author": "u2"})).into_shared())
            .await;
        dispatcher
            .emit(Event::new("message_create", serde_json::json!({"author": "u1"})).into_shared())
            .await;

        let event = wait.await.unwrap().unwrap();
        assert_eq!(event.payload()["author"], "u1");
        assert_eq!(dispatcher.subscription_count("message_create"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_timeout_cleans_up_listener() {
        let (gateway, dispatcher) = setup();

        let result = dispatcher
            .wait_for("message_create", |_event| true, Duration::from_secs(1))
            .await;
        assert_eq!(result.unwrap_err(), WaitError::Timeout);
        assert_eq!(dispatcher.subscription_count("message_create"), 0);
        assert_eq!(gateway.listener_count("message_create"), 0);
    }

    #[tokio::test]
    async fn unsubscribe_all_detaches_listener() {
        let (gateway, dispatcher) = setup();
        let hits = Arc::new(AtomicUsize::new(0));
        dispatcher.subscribe("member_join", counting(Arc::clone(&hits)), SubscribeOptions::default());
        dispatcher.subscribe("member_join", counting(Arc::clone(&hits)), SubscribeOptions::default());

        dispatcher.unsubscribe_all("member_join");
        assert_eq!(gateway.listener_count("member_join"), 0);

        dispatcher.emit(Event::named("member_join").into_shared()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
