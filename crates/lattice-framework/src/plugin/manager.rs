//! Plugin lifecycle management.
//!
//! [`PluginManager`] is the only component that mutates the command, event,
//! and interaction registries in bulk. It owns the descriptor list
//! (discovery order), the live instances, the cross-plugin hook table, and
//! the persisted enabled/disabled records.
//!
//! Lifecycle per plugin: `Unloaded → Loading → Loaded → Unloading →
//! Unloaded`, with dependency edges enforced in both directions — a load
//! fails while a declared dependency is missing, an unload fails while a
//! loaded dependent remains.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use lattice_core::{BoxError, HandlerError, KvStore};

use crate::command::CommandDispatcher;
use crate::event::EventDispatcher;
use crate::interaction::InteractionRouter;

use super::descriptor::{PluginDescriptor, PluginState};
use super::handle::{HookTable, PluginHandle};

/// Plugin-graph and lifecycle errors. These are setup-time programmer or
/// configuration mistakes and propagate to the caller of
/// `load`/`unload`/`reload`.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin '{0}' is not registered")]
    NotRegistered(String),

    #[error("plugin '{0}' is already loaded")]
    AlreadyLoaded(String),

    #[error("plugin '{0}' is not loaded")]
    NotLoaded(String),

    #[error("plugin '{plugin}' depends on '{dependency}', which is not loaded")]
    MissingDependency { plugin: String, dependency: String },

    #[error("plugin '{plugin}' is still required by: {}", dependents.join(", "))]
    DependentsExist {
        plugin: String,
        dependents: Vec<String>,
    },

    #[error("plugin '{plugin}' failed to load: {source}")]
    LoadFailed {
        plugin: String,
        #[source]
        source: BoxError,
    },
}

/// Errors from cross-plugin hook calls. Both lookup failures are expected,
/// recoverable conditions for callers — a target plugin may simply not be
/// loaded right now.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("plugin '{0}' is not loaded")]
    PluginNotLoaded(String),

    #[error("plugin '{plugin}' has no hook named '{hook}'")]
    HookNotFound { plugin: String, hook: String },

    #[error(transparent)]
    Failed(HandlerError),
}

struct LoadedPlugin {
    descriptor: PluginDescriptor,
    instance: Box<dyn super::Plugin>,
    handle: Arc<PluginHandle>,
}

/// Owns plugin registration, lifecycle, persisted state, and hooks.
pub struct PluginManager {
    commands: Arc<CommandDispatcher>,
    events: EventDispatcher,
    interactions: Arc<InteractionRouter>,
    store: Arc<dyn KvStore>,
    /// Discovery order; `load_all` walks this.
    descriptors: RwLock<Vec<PluginDescriptor>>,
    states: RwLock<HashMap<String, PluginState>>,
    loaded: RwLock<HashMap<String, Arc<LoadedPlugin>>>,
    /// Names in load order, for reverse-order shutdown.
    load_order: RwLock<Vec<String>>,
    hooks: Arc<RwLock<HookTable>>,
}

impl PluginManager {
    pub fn new(
        commands: Arc<CommandDispatcher>,
        events: EventDispatcher,
        interactions: Arc<InteractionRouter>,
        store: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            commands,
            events,
            interactions,
            store,
            descriptors: RwLock::new(Vec::new()),
            states: RwLock::new(HashMap::new()),
            loaded: RwLock::new(HashMap::new()),
            load_order: RwLock::new(Vec::new()),
            hooks: Arc::new(RwLock::new(HookTable::new())),
        }
    }

    /// Registers a descriptor. Registration alone loads nothing.
    pub fn register(&self, descriptor: PluginDescriptor) {
        let mut descriptors = self.descriptors.write();
        if descriptors.iter().any(|d| d.name == descriptor.name) {
            warn!(plugin = descriptor.name, "Duplicate plugin registration ignored");
            return;
        }
        descriptors.push(descriptor);
        info!(plugin = descriptor.name, version = descriptor.version, "Plugin registered");
    }

    /// Current lifecycle state of `name`.
    pub fn plugin_state(&self, name: &str) -> PluginState {
        self.states
            .read()
            .get(name)
            .copied()
            .unwrap_or(PluginState::Unloaded)
    }

    /// (name, state) for every registered plugin, in discovery order.
    pub fn plugin_states(&self) -> Vec<(String, PluginState)> {
        let descriptors = self.descriptors.read();
        descriptors
            .iter()
            .map(|d| (d.name.to_string(), self.plugin_state(d.name)))
            .collect()
    }

    fn descriptor(&self, name: &str) -> Option<PluginDescriptor> {
        self.descriptors.read().iter().find(|d| d.name == name).copied()
    }

    /// Loads a registered plugin.
    ///
    /// Fails when a declared dependency is not in `Loaded` state. A failed
    /// `on_load` rolls back every registration the plugin made before the
    /// failure.
    pub async fn load(&self, name: &str) -> Result<(), PluginError> {
        let descriptor = self
            .descriptor(name)
            .ok_or_else(|| PluginError::NotRegistered(name.to_string()))?;

        {
            let mut states = self.states.write();
            match states.get(name) {
                None | Some(PluginState::Unloaded) => {}
                Some(_) => return Err(PluginError::AlreadyLoaded(name.to_string())),
            }
            for dependency in descriptor.dependencies {
                if states.get(*dependency) != Some(&PluginState::Loaded) {
                    return Err(PluginError::MissingDependency {
                        plugin: name.to_string(),
                        dependency: dependency.to_string(),
                    });
                }
            }
            states.insert(name.to_string(), PluginState::Loading);
        }

        // Fresh instance on every load so reload picks up new construction.
        let instance = (descriptor.factory)();
        let handle = Arc::new(PluginHandle::new(
            name,
            Arc::clone(&self.commands),
            self.events.clone(),
            Arc::clone(&self.interactions),
            Arc::clone(&self.store),
            Arc::clone(&self.hooks),
        ));

        if let Err(source) = instance.on_load(&handle).await {
            handle.cleanup();
            self.states
                .write()
                .insert(name.to_string(), PluginState::Unloaded);
            return Err(PluginError::LoadFailed {
                plugin: name.to_string(),
                source,
            });
        }

        self.loaded.write().insert(
            name.to_string(),
            Arc::new(LoadedPlugin {
                descriptor,
                instance,
                handle,
            }),
        );
        self.load_order.write().push(name.to_string());
        self.states
            .write()
            .insert(name.to_string(), PluginState::Loaded);
        self.persist_state(name, true).await;
        info!(plugin = name, "Plugin loaded");
        Ok(())
    }

    /// Unloads a loaded plugin and removes every trace of it from the
    /// command, event, and interaction registries.
    ///
    /// Fails while any other loaded plugin declares this one as a
    /// dependency.
    pub async fn unload(&self, name: &str) -> Result<(), PluginError> {
        let entry = {
            let mut states = self.states.write();
            if states.get(name) != Some(&PluginState::Loaded) {
                return Err(PluginError::NotLoaded(name.to_string()));
            }

            let loaded = self.loaded.read();
            let dependents: Vec<String> = loaded
                .values()
                .filter(|p| p.descriptor.dependencies.contains(&name))
                .map(|p| p.descriptor.name.to_string())
                .collect();
            if !dependents.is_empty() {
                return Err(PluginError::DependentsExist {
                    plugin: name.to_string(),
                    dependents,
                });
            }

            states.insert(name.to_string(), PluginState::Unloading);
            Arc::clone(loaded.get(name).expect("loaded entry for Loaded state"))
        };

        entry.instance.on_unload(&entry.handle).await;
        entry.handle.cleanup();

        self.loaded.write().remove(name);
        self.load_order.write().retain(|n| n != name);
        self.states
            .write()
            .insert(name.to_string(), PluginState::Unloaded);
        self.persist_state(name, false).await;
        info!(plugin = name, "Plugin unloaded");
        Ok(())
    }

    /// Unload followed by load through a fresh factory call, so code wired
    /// into the new instance takes effect.
    pub async fn reload(&self, name: &str) -> Result<(), PluginError> {
        self.unload(name).await?;
        self.load(name).await
    }

    /// Loads every registered plugin whose persisted record is not
    /// explicitly disabled, in discovery order. One plugin's failure is
    /// logged and does not stop independent plugins from loading.
    pub async fn load_all(&self) {
        let descriptors: Vec<PluginDescriptor> = self.descriptors.read().clone();
        for descriptor in descriptors {
            if self.persisted_disabled(descriptor.name).await {
                info!(plugin = descriptor.name, "Skipping disabled plugin");
                continue;
            }
            if let Err(e) = self.load(descriptor.name).await {
                warn!(plugin = descriptor.name, error = %e, "Plugin failed to load, continuing");
            }
        }
    }

    /// Unloads every loaded plugin in reverse load order.
    pub async fn unload_all(&self) {
        let order: Vec<String> = {
            let order = self.load_order.read();
            order.iter().rev().cloned().collect()
        };
        for name in order {
            if let Err(e) = self.unload(&name).await {
                warn!(plugin = %name, error = %e, "Plugin failed to unload during shutdown");
            }
        }
    }

    // ─── Cross-plugin hooks ──────────────────────────────────────────────

    /// Invokes `hook` exposed by `plugin` with `args`.
    ///
    /// Lookup failures are expected, recoverable conditions; hook-internal
    /// failures come back wrapped, never panicking the caller.
    pub async fn call_hook(
        &self,
        plugin: &str,
        hook: &str,
        args: Value,
    ) -> Result<Value, HookError> {
        if self.plugin_state(plugin) != PluginState::Loaded {
            return Err(HookError::PluginNotLoaded(plugin.to_string()));
        }
        let hook_fn = self
            .hooks
            .read()
            .get(plugin)
            .and_then(|hooks| hooks.get(hook))
            .cloned()
            .ok_or_else(|| HookError::HookNotFound {
                plugin: plugin.to_string(),
                hook: hook.to_string(),
            })?;

        hook_fn
            .invoke(args)
            .await
            .map_err(|e| HookError::Failed(HandlerError(e)))
    }

    // ─── Persisted state ─────────────────────────────────────────────────

    async fn persisted_disabled(&self, name: &str) -> bool {
        match self.store.get(&state_key(name)).await {
            Ok(Some(record)) => record.get("enabled") == Some(&Value::Bool(false)),
            Ok(None) => false,
            Err(e) => {
                warn!(plugin = name, error = %e, "Failed to read persisted plugin state");
                false
            }
        }
    }

    async fn persist_state(&self, name: &str, enabled: bool) {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let record = if enabled {
            json!({ "enabled": true, "loaded_at": stamp })
        } else {
            json!({ "enabled": false, "unloaded_at": stamp })
        };
        if let Err(e) = self.store.set(&state_key(name), record).await {
            warn!(plugin = name, error = %e, "Failed to persist plugin state");
        }
    }
}

fn state_key(name: &str) -> String {
    format!("plugins.{name}.state")
}
