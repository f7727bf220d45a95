//! Built-in plugins.
//!
//! Ships with the framework but goes through the exact same lifecycle as
//! user plugins — register [`CORE_COMMANDS`] with the manager and load it
//! like any other descriptor.

use std::sync::Arc;

use async_trait::async_trait;

use lattice_core::{BoxError, CommandContext};

use crate::command::CommandSpec;

use super::descriptor::{Plugin, PluginDescriptor};
use super::handle::PluginHandle;

/// Baseline commands every deployment tends to want: a `ping` healthcheck
/// and a `commands` listing.
pub struct CoreCommandsPlugin;

#[async_trait]
impl Plugin for CoreCommandsPlugin {
    async fn on_load(&self, handle: &PluginHandle) -> Result<(), BoxError> {
        handle.add_command(
            CommandSpec::new(
                "ping",
                |ctx: Arc<CommandContext>, _args: Vec<String>| async move {
                    ctx.reply("pong");
                    Ok(())
                },
            )
            .category("core"),
        )?;

        let registry = Arc::clone(handle.commands().registry());
        handle.add_command(
            CommandSpec::new(
                "commands",
                move |ctx: Arc<CommandContext>, _args: Vec<String>| {
                    let registry = Arc::clone(&registry);
                    async move {
                        let mut names = registry.names();
                        names.sort();
                        ctx.reply(format!("Available commands: {}", names.join(", ")));
                        Ok(())
                    }
                },
            )
            .alias("cmds")
            .category("core"),
        )?;

        Ok(())
    }
}

/// Descriptor for the built-in core commands plugin.
pub static CORE_COMMANDS: PluginDescriptor = PluginDescriptor {
    name: "core_commands",
    version: env!("CARGO_PKG_VERSION"),
    description: "Baseline ping and command-listing commands.",
    dependencies: &[],
    factory: || Box::new(CoreCommandsPlugin),
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandDispatcher, CommandOutcome, CommandRegistry};
    use crate::event::EventDispatcher;
    use crate::interaction::InteractionRouter;
    use crate::plugin::PluginManager;
    use lattice_core::{Actor, Gateway, KvStore, LocalGateway, MemoryStore};

    #[tokio::test]
    async fn core_commands_register_and_respond() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let commands = Arc::new(CommandDispatcher::new(Arc::new(CommandRegistry::new(
            Arc::clone(&store),
        ))));
        let gateway = Arc::new(LocalGateway::new());
        let manager = PluginManager::new(
            Arc::clone(&commands),
            EventDispatcher::new(gateway as Arc<dyn Gateway>),
            Arc::new(InteractionRouter::new()),
            store,
        );

        manager.register(CORE_COMMANDS);
        manager.load("core_commands").await.unwrap();

        let ctx = Arc::new(CommandContext::new(None, Actor::new("u1")));
        assert_eq!(
            commands.dispatch(Arc::clone(&ctx), "ping", vec![]).await,
            CommandOutcome::Completed
        );
        assert_eq!(ctx.take_replies(), vec!["pong"]);

        assert_eq!(
            commands.dispatch(Arc::clone(&ctx), "cmds", vec![]).await,
            CommandOutcome::Completed
        );
        let listing = ctx.take_replies().pop().unwrap();
        assert!(listing.contains("ping"));
        assert!(listing.contains("commands"));

        manager.unload("core_commands").await.unwrap();
        assert_eq!(
            commands.dispatch(ctx, "ping", vec![]).await,
            CommandOutcome::UnknownCommand
        );
    }
}
