//! Plugin trait and the static descriptor that instantiates it.

use async_trait::async_trait;

use lattice_core::BoxError;

use super::handle::PluginHandle;

/// A unit of bot functionality with a managed lifecycle.
///
/// `on_load` registers everything the plugin contributes — commands, event
/// subscriptions, interaction handlers, intervals, hooks — through the
/// [`PluginHandle`], which tracks ownership so the manager can tear it all
/// down again. `on_unload` is for plugin-internal resources (open files,
/// external connections); registrations made through the handle are swept by
/// the manager whether or not `on_unload` touches them.
#[async_trait]
pub trait Plugin: Send + Sync {
    async fn on_load(&self, handle: &PluginHandle) -> Result<(), BoxError>;

    async fn on_unload(&self, _handle: &PluginHandle) {}
}

/// A static, `Copy` handle that identifies and instantiates a plugin.
///
/// The factory is invoked on **every** load, so `reload` always constructs a
/// fresh instance rather than reusing a cached one.
#[derive(Clone, Copy)]
pub struct PluginDescriptor {
    /// Unique plugin name; also the key for persisted state and hooks.
    pub name: &'static str,
    /// Semver version string.
    pub version: &'static str,
    /// One-line description shown in diagnostics.
    pub description: &'static str,
    /// Names of plugins that must already be loaded before this one.
    pub dependencies: &'static [&'static str],
    /// Factory that creates the live plugin instance.
    pub factory: fn() -> Box<dyn Plugin>,
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Lifecycle state of a plugin known to the manager.
///
/// ```text
/// Unloaded ──load──► Loading ──► Loaded ──unload──► Unloading ──► Unloaded
/// ```
///
/// The persisted enabled/disabled flag is a separate policy record:
/// disabling does not by itself tear registrations down, unloading does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Unloaded,
    Loading,
    Loaded,
    Unloading,
}
