//! # Lattice Framework
//!
//! The orchestration core of the Lattice bot framework: everything between
//! the platform SDK seam and user-written handlers.
//!
//! - [`command`] — command registry and the policy-chain dispatcher
//!   (enablement, inhibitors, cooldowns, permissions, hooks)
//! - [`event`] — named event subscriptions with single-listener fan-out,
//!   once/wildcard handlers, and `wait_for`
//! - [`interaction`] — per-kind interaction routing tables and the
//!   declarative command-manifest publish path
//! - [`plugin`] — plugin lifecycle manager, per-plugin ownership tracking,
//!   and cross-plugin hooks
//!
//! The registries are plain services owned by whoever composes the process
//! (see `lattice-runtime`); plugins and handlers only ever reach them
//! through the manager-provided surfaces, never through globals.

pub mod command;
pub mod event;
pub mod interaction;
pub mod plugin;

pub use command::{
    Command, CommandDispatcher, CommandHandler, CommandOutcome, CommandRegistry, CommandSpec,
    Inhibitor, InhibitorDecision, RegistryError,
};
pub use event::{
    EventDispatcher, EventHandler, SubscribeOptions, SubscriptionId, WaitError,
};
pub use interaction::{
    AckError, BotCredentials, CommandManifestEntry, DeploySummary, EntryId, IdMatcher,
    Interaction, InteractionHandler, InteractionKind, InteractionReply, InteractionRouter,
    ManifestError, ManifestKind, ManifestScope, ManifestTransport,
};
pub use plugin::{
    Hook, HookError, IntervalTask, Plugin, PluginDescriptor, PluginError, PluginHandle,
    PluginManager, PluginState,
};
