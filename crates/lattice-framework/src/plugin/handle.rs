//! Plugin-scoped registration surface.
//!
//! Every registration a plugin makes goes through its [`PluginHandle`] and
//! is recorded in the plugin's ownership set. Unload tears the whole set
//! down through the owning managers, which is what guarantees "no traces of
//! an unloaded plugin remain" even when a plugin's `on_unload` forgets
//! something.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::task::AbortHandle;
use tracing::warn;

use lattice_core::{BoxError, KvStore, StoreResult};

use crate::command::{CommandDispatcher, CommandSpec, RegistryError};
use crate::event::{EventDispatcher, EventHandler, SubscribeOptions, SubscriptionId};
use crate::interaction::{
    CommandManifestEntry, EntryId, IdMatcher, InteractionHandler, InteractionRouter,
};

/// A named, plugin-scoped invocable callable from other plugins by name.
pub trait Hook: Send + Sync {
    fn invoke(&self, args: Value) -> BoxFuture<'static, Result<Value, BoxError>>;
}

impl<F, Fut> Hook for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
{
    fn invoke(&self, args: Value) -> BoxFuture<'static, Result<Value, BoxError>> {
        Box::pin(self(args))
    }
}

/// plugin name → hook name → hook. Owned by the manager, shared with every
/// handle; callers only ever receive lookup results, never the table.
pub(crate) type HookTable = HashMap<String, HashMap<String, Arc<dyn Hook>>>;

/// Periodic task registered by a plugin.
pub trait IntervalTask: Send + Sync + 'static {
    fn run(&self) -> BoxFuture<'static, ()>;
}

impl<F, Fut> IntervalTask for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn run(&self) -> BoxFuture<'static, ()> {
        Box::pin(self())
    }
}

#[derive(Default)]
struct Owned {
    commands: Vec<String>,
    subscriptions: Vec<SubscriptionId>,
    interactions: Vec<EntryId>,
    timers: Vec<AbortHandle>,
    hooks: Vec<String>,
}

/// Registration surface handed to a plugin's lifecycle hooks.
pub struct PluginHandle {
    plugin: String,
    commands: Arc<CommandDispatcher>,
    events: EventDispatcher,
    interactions: Arc<InteractionRouter>,
    store: Arc<dyn KvStore>,
    hooks: Arc<RwLock<HookTable>>,
    owned: Mutex<Owned>,
}

impl PluginHandle {
    pub(crate) fn new(
        plugin: impl Into<String>,
        commands: Arc<CommandDispatcher>,
        events: EventDispatcher,
        interactions: Arc<InteractionRouter>,
        store: Arc<dyn KvStore>,
        hooks: Arc<RwLock<HookTable>>,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            commands,
            events,
            interactions,
            store,
            hooks,
            owned: Mutex::new(Owned::default()),
        }
    }

    /// The owning plugin's name.
    pub fn plugin_name(&self) -> &str {
        &self.plugin
    }

    /// The command dispatcher, for introspection (e.g. listing commands).
    pub fn commands(&self) -> &Arc<CommandDispatcher> {
        &self.commands
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn interactions(&self) -> &Arc<InteractionRouter> {
        &self.interactions
    }

    // ─── Registration ────────────────────────────────────────────────────

    /// Registers a command owned by this plugin.
    pub fn add_command(&self, spec: CommandSpec) -> Result<(), RegistryError> {
        let name = spec.name().to_string();
        self.commands.registry().register(spec)?;
        self.owned.lock().commands.push(name);
        Ok(())
    }

    /// Subscribes to a named platform event.
    pub fn add_event(
        &self,
        event_name: &str,
        handler: impl EventHandler + 'static,
        options: SubscribeOptions,
    ) -> SubscriptionId {
        let id = self.events.subscribe(event_name, handler, options);
        self.owned.lock().subscriptions.push(id);
        id
    }

    /// Registers a slash command (routed and published in the manifest).
    pub fn add_slash(
        &self,
        entry: CommandManifestEntry,
        handler: impl InteractionHandler + 'static,
    ) -> EntryId {
        let id = self.interactions.register_slash(entry, handler);
        self.owned.lock().interactions.push(id);
        id
    }

    /// Registers a context-menu command.
    pub fn add_context_menu(
        &self,
        entry: CommandManifestEntry,
        handler: impl InteractionHandler + 'static,
    ) -> EntryId {
        let id = self.interactions.register_context_menu(entry, handler);
        self.owned.lock().interactions.push(id);
        id
    }

    /// Registers a component callback.
    pub fn add_component(
        &self,
        matcher: IdMatcher,
        handler: impl InteractionHandler + 'static,
    ) -> EntryId {
        let id = self.interactions.register_component(matcher, handler);
        self.owned.lock().interactions.push(id);
        id
    }

    /// Registers a modal-submission callback.
    pub fn add_modal(
        &self,
        matcher: IdMatcher,
        handler: impl InteractionHandler + 'static,
    ) -> EntryId {
        let id = self.interactions.register_modal(matcher, handler);
        self.owned.lock().interactions.push(id);
        id
    }

    /// Registers an autocomplete provider for a command name.
    pub fn add_autocomplete(
        &self,
        command: impl Into<String>,
        handler: impl InteractionHandler + 'static,
    ) -> EntryId {
        let id = self.interactions.register_autocomplete(command, handler);
        self.owned.lock().interactions.push(id);
        id
    }

    /// Starts a periodic task. The first run happens one `period` after
    /// registration; the task is aborted on unload.
    pub fn add_interval(&self, period: Duration, task: impl IntervalTask) {
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                task.run().await;
            }
        });
        self.owned.lock().timers.push(handle.abort_handle());
    }

    /// Exposes a named hook under this plugin's namespace.
    pub fn add_hook(&self, hook_name: impl Into<String>, hook: impl Hook + 'static) {
        let hook_name = hook_name.into();
        self.hooks
            .write()
            .entry(self.plugin.clone())
            .or_default()
            .insert(hook_name.clone(), Arc::new(hook));
        self.owned.lock().hooks.push(hook_name);
    }

    // ─── Plugin-scoped configuration ─────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> StoreResult<Option<Value>> {
        self.store.get(&self.config_key(key)).await
    }

    pub async fn config_set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.store.set(&self.config_key(key), value).await
    }

    fn config_key(&self, key: &str) -> String {
        format!("plugins.{}.config.{key}", self.plugin)
    }

    // ─── Teardown ────────────────────────────────────────────────────────

    /// Removes every registration recorded for this plugin. Idempotent:
    /// anything the plugin already removed itself is skipped.
    pub(crate) fn cleanup(&self) {
        let owned = std::mem::take(&mut *self.owned.lock());

        for name in owned.commands {
            match self.commands.unregister(&name) {
                Ok(()) | Err(RegistryError::NotFound { .. }) => {}
                Err(e) => warn!(plugin = %self.plugin, error = %e, "Command cleanup failed"),
            }
        }
        for id in owned.subscriptions {
            self.events.unsubscribe(id);
        }
        for id in owned.interactions {
            self.interactions.remove(id);
        }
        for timer in owned.timers {
            timer.abort();
        }
        if !owned.hooks.is_empty() {
            self.hooks.write().remove(&self.plugin);
        }
    }
}
