//! Plugin system.
//!
//! A plugin bundles commands, event subscriptions, interaction handlers,
//! scheduled intervals, and hooks behind one managed lifecycle. The
//! [`PluginManager`] is the only component that mutates the dispatchers in
//! bulk: `load` lets the plugin register through its [`PluginHandle`]
//! (tracked in per-plugin ownership sets), `unload` tears every one of
//! those registrations down again.
//!
//! # Defining a plugin
//!
//! ```rust,ignore
//! struct WelcomePlugin;
//!
//! #[async_trait]
//! impl Plugin for WelcomePlugin {
//!     async fn on_load(&self, handle: &PluginHandle) -> Result<(), BoxError> {
//!         handle.add_event(
//!             "member_join",
//!             |event: SharedEvent| async move {
//!                 tracing::info!(member = %event.payload()["user"], "Welcome!");
//!                 Ok(())
//!             },
//!             SubscribeOptions::default(),
//!         );
//!         Ok(())
//!     }
//! }
//!
//! pub static WELCOME: PluginDescriptor = PluginDescriptor {
//!     name: "welcome",
//!     version: env!("CARGO_PKG_VERSION"),
//!     description: "Greets new members.",
//!     dependencies: &[],
//!     factory: || Box::new(WelcomePlugin),
//! };
//! ```
//!
//! # Dependencies and hooks
//!
//! A plugin only loads once everything in `dependencies` is loaded, and
//! cannot unload while a loaded plugin depends on it. Cross-plugin calls go
//! through named hooks: the providing plugin exposes one with
//! [`PluginHandle::add_hook`], consumers invoke it by `(plugin, hook)` name
//! via [`PluginManager::call_hook`] and treat lookup failures as expected.

pub mod builtin;
pub mod descriptor;
pub mod handle;
pub mod manager;

pub use descriptor::{Plugin, PluginDescriptor, PluginState};
pub use handle::{Hook, IntervalTask, PluginHandle};
pub use manager::{HookError, PluginError, PluginManager};
