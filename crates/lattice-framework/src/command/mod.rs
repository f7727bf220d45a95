//! Command registry and dispatcher.
//!
//! [`CommandRegistry`] owns the invocable command set (names, aliases,
//! per-community enablement); [`CommandDispatcher`] executes commands through
//! the cross-cutting policy chain (inhibitors, cooldowns, permissions,
//! before/after/error hooks). Plugins register commands through their
//! [`PluginHandle`](crate::plugin::PluginHandle) so teardown can find them
//! again.

pub mod dispatcher;
pub mod registry;

pub use dispatcher::{
    CommandDispatcher, CommandOutcome, ErrorHook, Inhibitor, InhibitorDecision, LifecycleHook,
    RunHook,
};
pub use registry::{Command, CommandHandler, CommandRegistry, CommandSpec, RegistryError};
