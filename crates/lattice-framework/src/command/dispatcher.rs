//! Command dispatch: the sequential, short-circuiting policy chain.
//!
//! Every dispatch walks the same pipeline:
//!
//! ```text
//! resolve → enablement → inhibitors → cooldown → permissions
//!         → before hook → handler → after hook → run hook
//! ```
//!
//! Policy steps are strictly ordered and short-circuiting; the handler runs
//! under error isolation, so a failing handler surfaces as a
//! [`CommandOutcome::Failed`] and never propagates past [`dispatch`].
//!
//! [`dispatch`]: CommandDispatcher::dispatch

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{Level, debug, error, span};

use lattice_core::{Actor, CommandContext, CooldownStore, HandlerError};

use super::registry::{Command, CommandRegistry, RegistryError};

/// Decision returned by an [`Inhibitor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InhibitorDecision {
    /// Continue down the policy chain.
    Allow,
    /// Abort dispatch; an optional user-visible message.
    Deny(Option<String>),
}

/// Predicate consulted before command execution; may veto dispatch.
///
/// Inhibitors run in registration order and the first denial wins — later
/// inhibitors are never consulted for that dispatch.
pub trait Inhibitor: Send + Sync {
    fn check(
        &self,
        ctx: Arc<CommandContext>,
        command: Arc<Command>,
    ) -> BoxFuture<'static, InhibitorDecision>;
}

impl<F, Fut> Inhibitor for F
where
    F: Fn(Arc<CommandContext>, Arc<Command>) -> Fut + Send + Sync,
    Fut: Future<Output = InhibitorDecision> + Send + 'static,
{
    fn check(
        &self,
        ctx: Arc<CommandContext>,
        command: Arc<Command>,
    ) -> BoxFuture<'static, InhibitorDecision> {
        Box::pin(self(ctx, command))
    }
}

/// Hook invoked around the handler (`before`/`after`).
pub type LifecycleHook =
    Arc<dyn Fn(Arc<CommandContext>, Arc<Command>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Notification fired after every successful dispatch.
pub type RunHook = Arc<dyn Fn(&Command, &Actor) + Send + Sync>;

/// Hook that takes over the user-visible response for handler failures.
pub type ErrorHook = Arc<
    dyn Fn(Arc<CommandContext>, Arc<Command>, Arc<HandlerError>) -> BoxFuture<'static, ()>
        + Send
        + Sync,
>;

/// User-visible result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Handler ran to completion.
    Completed,
    /// No command resolves to the given name or alias.
    UnknownCommand,
    /// The invoking community has an explicit disable record.
    Disabled,
    /// An inhibitor vetoed dispatch, optionally with a message.
    Inhibited(Option<String>),
    /// The per-user cooldown window has not elapsed.
    OnCooldown { remaining: Duration },
    /// The actor is missing required permission tags.
    MissingPermissions { missing: BTreeSet<String> },
    /// The handler failed. `handled` is true when an error hook produced
    /// the user-visible response.
    Failed { handled: bool },
}

#[derive(Default)]
struct Hooks {
    before: Option<LifecycleHook>,
    after: Option<LifecycleHook>,
    on_run: Option<RunHook>,
    on_error: Option<ErrorHook>,
}

/// Executes commands against the registry under the cross-cutting policy
/// chain (enablement, inhibitors, cooldowns, permissions, hooks).
pub struct CommandDispatcher {
    registry: Arc<CommandRegistry>,
    cooldowns: CooldownStore,
    inhibitors: RwLock<Vec<Arc<dyn Inhibitor>>>,
    hooks: RwLock<Hooks>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self {
            registry,
            cooldowns: CooldownStore::new(),
            inhibitors: RwLock::new(Vec::new()),
            hooks: RwLock::new(Hooks::default()),
        }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn cooldowns(&self) -> &CooldownStore {
        &self.cooldowns
    }

    /// Appends an inhibitor to the chain.
    pub fn add_inhibitor(&self, inhibitor: impl Inhibitor + 'static) {
        self.inhibitors.write().push(Arc::new(inhibitor));
    }

    pub fn set_before_hook(&self, hook: LifecycleHook) {
        self.hooks.write().before = Some(hook);
    }

    pub fn set_after_hook(&self, hook: LifecycleHook) {
        self.hooks.write().after = Some(hook);
    }

    pub fn set_run_hook(&self, hook: RunHook) {
        self.hooks.write().on_run = Some(hook);
    }

    pub fn set_error_hook(&self, hook: ErrorHook) {
        self.hooks.write().on_error = Some(hook);
    }

    /// Unregisters a command and purges its cooldown entries.
    ///
    /// Plugin teardown goes through here rather than the raw registry so a
    /// removed command leaves no suppression windows behind.
    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        self.registry.unregister(name)?;
        self.cooldowns.clear_prefix(&format!("{name}:"));
        Ok(())
    }

    /// Dispatches `name_or_alias` with `args` on behalf of `ctx`.
    ///
    /// Never returns an error: policy aborts and handler failures are all
    /// encoded in the returned [`CommandOutcome`].
    pub async fn dispatch(
        &self,
        ctx: Arc<CommandContext>,
        name_or_alias: &str,
        args: Vec<String>,
    ) -> CommandOutcome {
        let Some(command) = self.registry.resolve(name_or_alias) else {
            debug!(command = name_or_alias, "Dispatch of unknown command");
            return CommandOutcome::UnknownCommand;
        };

        let span = span!(Level::DEBUG, "dispatch_command", command = %command.name());
        let _enter = span.enter();

        // 1. Per-community enablement.
        if let Some(community) = ctx.community()
            && !self.registry.is_enabled(community, &command)
        {
            debug!(community, "Command disabled in this community");
            return CommandOutcome::Disabled;
        }

        // 2. Inhibitor chain, registration order, first denial wins.
        let inhibitors: Vec<_> = self.inhibitors.read().clone();
        for inhibitor in inhibitors {
            if let InhibitorDecision::Deny(message) =
                inhibitor.check(Arc::clone(&ctx), Arc::clone(&command)).await
            {
                debug!("Dispatch vetoed by inhibitor");
                return CommandOutcome::Inhibited(message);
            }
        }

        // 3. Cooldown window.
        if let Some(window) = command.cooldown() {
            let key = cooldown_key(command.name(), &ctx.actor().id);
            if let Some(remaining) = self.cooldowns.check(&key) {
                return CommandOutcome::OnCooldown { remaining };
            }
            self.cooldowns.arm(key, window);
        }

        // 4. Permission tags.
        if !ctx.actor().satisfies(command.required_permissions()) {
            let missing: BTreeSet<String> = command
                .required_permissions()
                .difference(&ctx.actor().permissions)
                .cloned()
                .collect();
            debug!(?missing, "Actor lacks required permissions");
            return CommandOutcome::MissingPermissions { missing };
        }

        // 5. Before hook.
        let (before, after, on_run, on_error) = {
            let hooks = self.hooks.read();
            (
                hooks.before.clone(),
                hooks.after.clone(),
                hooks.on_run.clone(),
                hooks.on_error.clone(),
            )
        };
        if let Some(hook) = before {
            hook(Arc::clone(&ctx), Arc::clone(&command)).await;
        }

        // 6. Handler, isolated.
        match command.handler().call(Arc::clone(&ctx), args).await {
            Ok(()) => {
                if let Some(hook) = after {
                    hook(Arc::clone(&ctx), Arc::clone(&command)).await;
                }
                if let Some(hook) = on_run {
                    hook(&command, ctx.actor());
                }
                CommandOutcome::Completed
            }
            Err(e) => {
                let failure = Arc::new(HandlerError(e));
                error!(command = %command.name(), error = %failure, "Command handler failed");
                match on_error {
                    Some(hook) => {
                        hook(Arc::clone(&ctx), Arc::clone(&command), failure).await;
                        CommandOutcome::Failed { handled: true }
                    }
                    None => {
                        ctx.reply("Something went wrong while running that command.");
                        CommandOutcome::Failed { handled: false }
                    }
                }
            }
        }
    }
}

fn cooldown_key(command: &str, user: &str) -> String {
    format!("{command}:{user}")
}
