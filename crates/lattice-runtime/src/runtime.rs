//! Runtime orchestration: the process composition root.
//!
//! [`Lattice`] constructs the registries, the plugin manager, and the
//! gateway bridge, then drives startup (config, logging, persisted plugin
//! state) and signal-based shutdown. The registries themselves are plain
//! services; this is the one place that wires them together.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use lattice_runtime::Lattice;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let lattice = Lattice::builder()
//!         .gateway(my_platform_adapter)
//!         .build()
//!         .await?;
//!
//!     lattice.register_plugin(CORE_COMMANDS);
//!     lattice.register_plugin(WELCOME);
//!     lattice.run().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::signal;
use tracing::{debug, info, warn};

use lattice_core::{
    Gateway, JsonFileStore, KvStore, LocalGateway, MemoryStore, SharedEvent,
};
use lattice_framework::{
    BotCredentials, CommandDispatcher, CommandRegistry, DeploySummary, EventDispatcher,
    Interaction, InteractionRouter, PluginDescriptor, PluginManager,
};

use crate::config::{ConfigLoader, LatticeConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::rest::HttpManifestTransport;

/// The assembled bot runtime.
pub struct Lattice {
    config: LatticeConfig,
    gateway: Arc<dyn Gateway>,
    store: Arc<dyn KvStore>,
    commands: Arc<CommandDispatcher>,
    events: EventDispatcher,
    interactions: Arc<InteractionRouter>,
    plugins: Arc<PluginManager>,
}

impl Lattice {
    /// Creates a builder; see [`LatticeBuilder`].
    pub fn builder() -> LatticeBuilder {
        LatticeBuilder::new()
    }

    /// Assembles the runtime from an already-loaded configuration.
    pub async fn from_config(
        config: LatticeConfig,
        gateway: Arc<dyn Gateway>,
    ) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);

        let store: Arc<dyn KvStore> = match &config.storage.path {
            Some(path) => Arc::new(JsonFileStore::open(path).await?),
            None => Arc::new(MemoryStore::new()),
        };

        let registry = Arc::new(CommandRegistry::new(Arc::clone(&store)));
        registry.load_enablement().await;
        let commands = Arc::new(CommandDispatcher::new(registry));
        let events = EventDispatcher::new(Arc::clone(&gateway));
        let interactions = Arc::new(InteractionRouter::new());
        let plugins = Arc::new(PluginManager::new(
            Arc::clone(&commands),
            events.clone(),
            Arc::clone(&interactions),
            Arc::clone(&store),
        ));

        let lattice = Self {
            config,
            gateway,
            store,
            commands,
            events,
            interactions,
            plugins,
        };
        lattice.attach_interaction_bridge();

        info!("Runtime assembled");
        Ok(lattice)
    }

    /// Bridges the platform's single "interaction received" event into the
    /// interaction router.
    fn attach_interaction_bridge(&self) {
        let interactions = Arc::clone(&self.interactions);
        self.gateway.attach(
            "interaction",
            Arc::new(move |event: SharedEvent| {
                let Some(interaction) = Interaction::from_event(&event) else {
                    debug!("Dropping malformed interaction event");
                    return;
                };
                let interactions = Arc::clone(&interactions);
                tokio::spawn(async move {
                    interactions.route(Arc::new(interaction)).await;
                });
            }),
        );
    }

    pub fn config(&self) -> &LatticeConfig {
        &self.config
    }

    pub fn commands(&self) -> &Arc<CommandDispatcher> {
        &self.commands
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn interactions(&self) -> &Arc<InteractionRouter> {
        &self.interactions
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Registers a plugin descriptor, unless the config disables it.
    pub fn register_plugin(&self, descriptor: PluginDescriptor) {
        if self
            .config
            .plugins
            .disabled
            .iter()
            .any(|name| name == descriptor.name)
        {
            info!(plugin = descriptor.name, "Plugin disabled by configuration");
            return;
        }
        self.plugins.register(descriptor);
    }

    /// Loads every registered plugin honoring persisted enabled state.
    pub async fn start(&self) {
        info!("Starting Lattice runtime");
        self.plugins.load_all().await;
        info!("Runtime started");
    }

    /// Unloads all plugins in reverse load order.
    pub async fn shutdown(&self) {
        info!("Stopping Lattice runtime");
        self.plugins.unload_all().await;
        info!("Runtime stopped");
    }

    /// Runs until Ctrl+C / SIGTERM, then shuts down.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await;
        info!("Lattice is now running. Press Ctrl+C to stop.");
        Self::wait_for_shutdown().await;
        self.shutdown().await;
        Ok(())
    }

    /// Runs until the given future resolves, then shuts down.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await;
        shutdown.await;
        self.shutdown().await;
        Ok(())
    }

    /// Publishes the command manifest from the configured platform
    /// credentials. Scoped to `community` when given, global otherwise.
    pub async fn deploy_manifest(
        &self,
        community: Option<&str>,
    ) -> RuntimeResult<DeploySummary> {
        if !self.config.can_deploy_manifest() {
            return Err(RuntimeError::Platform(
                "platform.application_id, platform.token, and platform.api_base must be set"
                    .into(),
            ));
        }
        let transport = HttpManifestTransport::new(&self.config.platform.api_base);
        let credentials = BotCredentials::new(&self.config.platform.token);
        let summary = self
            .interactions
            .deploy_manifest(
                &transport,
                &credentials,
                &self.config.platform.application_id,
                community,
            )
            .await?;
        Ok(summary)
    }

    async fn wait_for_shutdown() {
        #[cfg(unix)]
        {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!(error = %e, "Failed to register SIGTERM handler, waiting on Ctrl+C only");
                    if let Err(e) = signal::ctrl_c().await {
                        warn!(error = %e, "Failed to listen for Ctrl+C");
                    }
                    return;
                }
            };

            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Received Ctrl+C, shutting down");
        }
    }
}

// =============================================================================
// LatticeBuilder
// =============================================================================

/// Builder for assembling a [`Lattice`] runtime.
pub struct LatticeBuilder {
    config_loader: ConfigLoader,
    config: Option<LatticeConfig>,
    gateway: Option<Arc<dyn Gateway>>,
}

impl Default for LatticeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LatticeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            gateway: None,
        }
    }

    /// Loads configuration from a specific file instead of `lattice.toml`.
    pub fn config_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Uses a pre-built configuration, skipping file/env loading.
    pub fn config(mut self, config: LatticeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Supplies the platform SDK's event surface. Defaults to an
    /// in-process [`LocalGateway`] (useful for tests and demos).
    pub fn gateway(mut self, gateway: Arc<dyn Gateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub async fn build(self) -> RuntimeResult<Lattice> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        let gateway = self
            .gateway
            .unwrap_or_else(|| Arc::new(LocalGateway::new()));
        Lattice::from_config(config, gateway).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lattice_core::{Actor, BoxError, CommandContext, Event};
    use lattice_framework::{
        CommandManifestEntry, CommandOutcome, CommandSpec, Plugin, PluginHandle, PluginState,
    };
    use serde_json::json;

    struct PingPlugin;

    #[async_trait]
    impl Plugin for PingPlugin {
        async fn on_load(&self, handle: &PluginHandle) -> Result<(), BoxError> {
            handle.add_command(CommandSpec::new(
                "ping",
                |ctx: Arc<CommandContext>, _args: Vec<String>| async move {
                    ctx.reply("pong");
                    Ok(())
                },
            ))?;
            handle.add_slash(
                CommandManifestEntry::slash("ping", "healthcheck"),
                |interaction: Arc<lattice_framework::Interaction>| async move {
                    interaction.reply("pong").ok();
                    Ok(())
                },
            );
            Ok(())
        }
    }

    static PING: PluginDescriptor = PluginDescriptor {
        name: "ping",
        version: "0.1.0",
        description: "ping command",
        dependencies: &[],
        factory: || Box::new(PingPlugin),
    };

    async fn lattice_with_gateway() -> (Arc<LocalGateway>, Lattice) {
        let gateway = Arc::new(LocalGateway::new());
        let lattice = Lattice::builder()
            .config(LatticeConfig::default())
            .gateway(Arc::clone(&gateway) as Arc<dyn Gateway>)
            .build()
            .await
            .unwrap();
        (gateway, lattice)
    }

    #[tokio::test]
    async fn startup_loads_plugins_and_shutdown_unloads() {
        let (_gateway, lattice) = lattice_with_gateway().await;
        lattice.register_plugin(PING);
        lattice.start().await;
        assert_eq!(lattice.plugins().plugin_state("ping"), PluginState::Loaded);

        let ctx = Arc::new(CommandContext::new(None, Actor::new("u1")));
        assert_eq!(
            lattice.commands().dispatch(Arc::clone(&ctx), "ping", vec![]).await,
            CommandOutcome::Completed
        );

        lattice.shutdown().await;
        assert_eq!(
            lattice.plugins().plugin_state("ping"),
            PluginState::Unloaded
        );
        assert_eq!(
            lattice.commands().dispatch(ctx, "ping", vec![]).await,
            CommandOutcome::UnknownCommand
        );
    }

    #[tokio::test]
    async fn interaction_bridge_routes_gateway_events() {
        let (gateway, lattice) = lattice_with_gateway().await;
        lattice.register_plugin(PING);
        lattice.start().await;

        gateway.emit(
            Event::new(
                "interaction",
                json!({"kind": "slash", "id": "ping", "user": "u1"}),
            )
            .into_shared(),
        );
        // Bridge spawns the routing task.
        tokio::task::yield_now().await;

        // Nothing observable leaks from an unmatched id either.
        gateway.emit(
            Event::new(
                "interaction",
                json!({"kind": "slash", "id": "unknown", "user": "u1"}),
            )
            .into_shared(),
        );
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn config_disabled_plugin_is_never_registered() {
        let config = LatticeConfig {
            plugins: crate::config::PluginsConfig {
                disabled: vec!["ping".to_string()],
            },
            ..Default::default()
        };
        let lattice = Lattice::builder()
            .config(config)
            .build()
            .await
            .unwrap();

        lattice.register_plugin(PING);
        lattice.start().await;
        assert_eq!(
            lattice.plugins().plugin_state("ping"),
            PluginState::Unloaded
        );
    }

    #[tokio::test]
    async fn deploy_manifest_requires_platform_config() {
        let (_gateway, lattice) = lattice_with_gateway().await;
        assert!(matches!(
            lattice.deploy_manifest(None).await,
            Err(RuntimeError::Platform(_))
        ));
    }
}
