//! # Lattice
//!
//! A plugin-driven bot framework runtime for chat platforms.
//!
//! Lattice sits between a chat-platform SDK and your bot logic. The SDK
//! stays behind two seams (event subscription and the manifest publish
//! call); everything else — command policy, event fan-out, interaction
//! routing, plugin lifecycles — is the framework's job.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐    ┌──────────────────┐    ┌───────────────────────────┐
//! │ Platform │───▶│ EventDispatcher  │───▶│ plugin event handlers     │
//! │ Gateway  │───▶│ InteractionRouter│───▶│ slash/component/modal/…   │
//! └──────────┘    └──────────────────┘    └───────────────────────────┘
//!                 ┌──────────────────┐
//!                 │ CommandDispatcher│──▶ enablement → inhibitors →
//!                 └──────────────────┘    cooldown → permissions → handler
//!                 ┌──────────────────┐
//!                 │ PluginManager    │──▶ load / unload / reload / hooks
//!                 └──────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use lattice::prelude::*;
//!
//! struct WelcomePlugin;
//!
//! #[async_trait::async_trait]
//! impl Plugin for WelcomePlugin {
//!     async fn on_load(&self, handle: &PluginHandle) -> Result<(), BoxError> {
//!         handle.add_event(
//!             "member_join",
//!             |event: SharedEvent| async move {
//!                 tracing::info!(member = %event.payload()["user"], "welcome!");
//!                 Ok(())
//!             },
//!             SubscribeOptions::default(),
//!         );
//!         Ok(())
//!     }
//! }
//!
//! static WELCOME: PluginDescriptor = PluginDescriptor {
//!     name: "welcome",
//!     version: env!("CARGO_PKG_VERSION"),
//!     description: "Greets new members.",
//!     dependencies: &[],
//!     factory: || Box::new(WelcomePlugin),
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lattice = Lattice::builder().build().await?;
//!     lattice.register_plugin(WELCOME);
//!     lattice.run().await?;
//!     Ok(())
//! }
//! ```

pub use lattice_core as core;
pub use lattice_framework as framework;
pub use lattice_runtime as runtime;

/// The commonly needed surface, importable in one line.
pub mod prelude {
    pub use lattice_core::{
        Actor, BoxError, CommandContext, CooldownStore, Event, Gateway, HandlerError,
        JsonFileStore, KvStore, LocalGateway, MemoryStore, SharedEvent,
    };
    pub use lattice_framework::{
        BotCredentials, CommandManifestEntry, CommandOutcome, CommandSpec, EventDispatcher,
        IdMatcher, Inhibitor, InhibitorDecision, Interaction, InteractionKind, InteractionRouter,
        ManifestKind, Plugin, PluginDescriptor, PluginHandle, PluginManager, PluginState,
        SubscribeOptions,
    };
    pub use lattice_runtime::{ConfigLoader, Lattice, LatticeConfig};
}
