//! Command registry: typed command records, alias indexing, and
//! per-community enablement overrides.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use lattice_core::{BoxError, CommandContext, KvStore};

/// KV document holding every persisted enablement override.
const ENABLEMENT_KEY: &str = "commands.enablement";

/// Errors raised by registration-time validation.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The name or one of the aliases collides with an existing command
    /// name or alias. The registry is left unchanged.
    #[error("command name or alias '{name}' is already taken")]
    Conflict { name: String },

    /// No command is registered under the given name.
    #[error("no command named '{name}'")]
    NotFound { name: String },

    /// The spec failed structural validation (empty name/alias).
    #[error("invalid command spec: {reason}")]
    Invalid { reason: String },
}

/// Async command handler invoked with the invocation context and the
/// trailing arguments.
pub trait CommandHandler: Send + Sync {
    fn call(
        &self,
        ctx: Arc<CommandContext>,
        args: Vec<String>,
    ) -> BoxFuture<'static, Result<(), BoxError>>;
}

impl<F, Fut> CommandHandler for F
where
    F: Fn(Arc<CommandContext>, Vec<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn call(
        &self,
        ctx: Arc<CommandContext>,
        args: Vec<String>,
    ) -> BoxFuture<'static, Result<(), BoxError>> {
        Box::pin(self(ctx, args))
    }
}

// ─── Command record ──────────────────────────────────────────────────────────

/// A registered command. Immutable once registered; re-registration under
/// the same name replaces the whole record.
pub struct Command {
    name: String,
    aliases: Vec<String>,
    handler: Arc<dyn CommandHandler>,
    cooldown: Option<Duration>,
    required_permissions: BTreeSet<String>,
    category: Option<String>,
    enabled_by_default: bool,
}

impl Command {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub(crate) fn handler(&self) -> &Arc<dyn CommandHandler> {
        &self.handler
    }

    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    pub fn required_permissions(&self) -> &BTreeSet<String> {
        &self.required_permissions
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn enabled_by_default(&self) -> bool {
        self.enabled_by_default
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("cooldown", &self.cooldown)
            .field("category", &self.category)
            .finish()
    }
}

// ─── CommandSpec builder ─────────────────────────────────────────────────────

/// Builder validated at registration time.
///
/// ```rust,ignore
/// registry.register(
///     CommandSpec::new("daily", claim_daily)
///         .alias("d")
///         .cooldown(Duration::from_secs(86_400))
///         .permission("use_economy")
///         .category("economy"),
/// )?;
/// ```
pub struct CommandSpec {
    name: String,
    aliases: Vec<String>,
    handler: Arc<dyn CommandHandler>,
    cooldown: Option<Duration>,
    required_permissions: BTreeSet<String>,
    category: Option<String>,
    enabled_by_default: bool,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, handler: impl CommandHandler + 'static) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            handler: Arc::new(handler),
            cooldown: None,
            required_permissions: BTreeSet::new(),
            category: None,
            enabled_by_default: true,
        }
    }

    /// The canonical name this spec registers under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn cooldown(mut self, window: Duration) -> Self {
        self.cooldown = Some(window);
        self
    }

    pub fn permission(mut self, tag: impl Into<String>) -> Self {
        self.required_permissions.insert(tag.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Commands start disabled everywhere until a community opts in.
    pub fn disabled_by_default(mut self) -> Self {
        self.enabled_by_default = false;
        self
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::Invalid {
                reason: "command name must not be empty".into(),
            });
        }
        if self.aliases.iter().any(|a| a.trim().is_empty()) {
            return Err(RegistryError::Invalid {
                reason: format!("command '{}' has an empty alias", self.name),
            });
        }
        Ok(())
    }

    fn into_command(self) -> Command {
        Command {
            name: self.name,
            aliases: self.aliases,
            handler: self.handler,
            cooldown: self.cooldown,
            required_permissions: self.required_permissions,
            category: self.category,
            enabled_by_default: self.enabled_by_default,
        }
    }
}

// ─── CommandRegistry ─────────────────────────────────────────────────────────

/// Owns the set of invocable commands, their alias index, and the
/// per-community enablement overrides.
///
/// Registration is conflict-checked across both names and aliases; a failed
/// registration leaves the registry byte-for-byte unchanged. Enablement
/// overrides are created lazily on first toggle, persisted through the KV
/// store, and deliberately survive command re-registration.
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, Arc<Command>>>,
    /// alias → canonical name
    aliases: RwLock<HashMap<String, String>>,
    /// (community, command) → explicit override
    enablement: RwLock<HashMap<(String, String), bool>>,
    store: Arc<dyn KvStore>,
}

impl CommandRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            enablement: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Registers a command, or overwrites the command with the same name.
    ///
    /// Fails with [`RegistryError::Conflict`] when the name or any alias is
    /// taken by a *different* command; overwriting re-indexes the incoming
    /// aliases and drops the old ones.
    pub fn register(&self, spec: CommandSpec) -> Result<(), RegistryError> {
        spec.validate()?;

        let mut commands = self.commands.write();
        let mut aliases = self.aliases.write();

        let name = spec.name.clone();

        // Conflict pass over every incoming identifier before mutating.
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for candidate in std::iter::once(name.as_str()).chain(spec.aliases.iter().map(String::as_str)) {
            if !seen.insert(candidate) {
                return Err(RegistryError::Conflict {
                    name: candidate.to_string(),
                });
            }
            let taken_as_name = candidate != name && commands.contains_key(candidate);
            let taken_as_alias = aliases
                .get(candidate)
                .is_some_and(|canonical| *canonical != name);
            if taken_as_name || taken_as_alias {
                return Err(RegistryError::Conflict {
                    name: candidate.to_string(),
                });
            }
        }

        // Drop the alias index of the record being overwritten.
        if let Some(previous) = commands.get(&name) {
            for alias in previous.aliases() {
                aliases.remove(alias);
            }
            debug!(command = %name, "Overwriting existing command registration");
        }

        let command = Arc::new(spec.into_command());
        for alias in command.aliases() {
            aliases.insert(alias.clone(), name.clone());
        }
        commands.insert(name.clone(), command);
        debug!(command = %name, "Command registered");
        Ok(())
    }

    /// Removes a command and its alias index entries.
    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let mut commands = self.commands.write();
        let Some(command) = commands.remove(name) else {
            return Err(RegistryError::NotFound {
                name: name.to_string(),
            });
        };
        let mut aliases = self.aliases.write();
        for alias in command.aliases() {
            aliases.remove(alias);
        }
        debug!(command = %name, "Command unregistered");
        Ok(())
    }

    /// Resolves a name or alias to its canonical command.
    pub fn resolve(&self, name_or_alias: &str) -> Option<Arc<Command>> {
        let commands = self.commands.read();
        if let Some(command) = commands.get(name_or_alias) {
            return Some(Arc::clone(command));
        }
        let canonical = self.aliases.read().get(name_or_alias).cloned()?;
        commands.get(&canonical).map(Arc::clone)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }

    /// Canonical names of every registered command, unsorted.
    pub fn names(&self) -> Vec<String> {
        self.commands.read().keys().cloned().collect()
    }

    /// Distinct category labels in use.
    pub fn categories(&self) -> BTreeSet<String> {
        self.commands
            .read()
            .values()
            .filter_map(|c| c.category().map(str::to_string))
            .collect()
    }

    // ─── Enablement overrides ────────────────────────────────────────────

    /// The explicit override for (community, command), if one was ever set.
    pub fn enablement_override(&self, community: &str, command: &str) -> Option<bool> {
        self.enablement
            .read()
            .get(&(community.to_string(), command.to_string()))
            .copied()
    }

    /// Whether `command` is enabled in `community`: the explicit override
    /// when present, otherwise the command's default.
    pub fn is_enabled(&self, community: &str, command: &Command) -> bool {
        self.enablement_override(community, command.name())
            .unwrap_or_else(|| command.enabled_by_default())
    }

    /// Sets the per-community override and persists the full override map.
    pub async fn set_enabled(&self, community: &str, command: &str, enabled: bool) {
        self.enablement
            .write()
            .insert((community.to_string(), command.to_string()), enabled);
        self.persist_enablement().await;
    }

    /// Loads persisted overrides; called once at startup.
    pub async fn load_enablement(&self) {
        let document = match self.store.get(ENABLEMENT_KEY).await {
            Ok(Some(Value::Object(map))) => map,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, "Failed to load command enablement overrides");
                return;
            }
        };
        let mut enablement = self.enablement.write();
        for (key, value) in document {
            let (Some((community, command)), Some(enabled)) = (key.split_once('/'), value.as_bool())
            else {
                warn!(key = %key, "Skipping malformed enablement record");
                continue;
            };
            enablement.insert((community.to_string(), command.to_string()), enabled);
        }
    }

    async fn persist_enablement(&self) {
        let document: serde_json::Map<String, Value> = {
            let enablement = self.enablement.read();
            enablement
                .iter()
                .map(|((community, command), enabled)| {
                    (format!("{community}/{command}"), Value::Bool(*enabled))
                })
                .collect()
        };
        if let Err(e) = self.store.set(ENABLEMENT_KEY, Value::Object(document)).await {
            warn!(error = %e, "Failed to persist command enablement overrides");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::MemoryStore;

    fn noop() -> impl CommandHandler {
        |_ctx: Arc<CommandContext>, _args: Vec<String>| async { Ok(()) }
    }

    fn registry() -> CommandRegistry {
        CommandRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn register_and_resolve_by_alias() {
        let registry = registry();
        registry
            .register(CommandSpec::new("ping", noop()).alias("p"))
            .unwrap();

        assert_eq!(registry.resolve("ping").unwrap().name(), "ping");
        assert_eq!(registry.resolve("p").unwrap().name(), "ping");
        assert!(registry.resolve("pong").is_none());
    }

    #[test]
    fn alias_conflict_leaves_registry_unchanged() {
        let registry = registry();
        registry
            .register(CommandSpec::new("ping", noop()).alias("p"))
            .unwrap();

        // Name collides with an existing alias.
        let err = registry.register(CommandSpec::new("p", noop())).unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));

        // Alias collides with an existing name.
        let err = registry
            .register(CommandSpec::new("stats", noop()).alias("ping"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));

        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("stats").is_none());
    }

    #[test]
    fn reregistration_overwrites_and_reindexes_aliases() {
        let registry = registry();
        registry
            .register(CommandSpec::new("ping", noop()).alias("p"))
            .unwrap();
        registry
            .register(CommandSpec::new("ping", noop()).alias("pi"))
            .unwrap();

        assert!(registry.resolve("p").is_none());
        assert_eq!(registry.resolve("pi").unwrap().name(), "ping");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_clears_alias_index() {
        let registry = registry();
        registry
            .register(CommandSpec::new("ping", noop()).alias("p"))
            .unwrap();
        registry.unregister("ping").unwrap();

        assert!(registry.resolve("ping").is_none());
        assert!(registry.resolve("p").is_none());
        assert!(matches!(
            registry.unregister("ping"),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn enablement_survives_reregistration() {
        let registry = registry();
        registry.register(CommandSpec::new("ping", noop())).unwrap();
        registry.set_enabled("guild-1", "ping", false).await;

        registry.register(CommandSpec::new("ping", noop())).unwrap();
        assert_eq!(registry.enablement_override("guild-1", "ping"), Some(false));
    }

    #[tokio::test]
    async fn enablement_persists_through_store() {
        let store = Arc::new(MemoryStore::new());
        {
            let registry = CommandRegistry::new(Arc::clone(&store) as Arc<dyn KvStore>);
            registry.set_enabled("guild-1", "ping", false).await;
        }

        let registry = CommandRegistry::new(store);
        registry.load_enablement().await;
        assert_eq!(registry.enablement_override("guild-1", "ping"), Some(false));
    }
}
