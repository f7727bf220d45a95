//! # Lattice Core
//!
//! Foundation layer of the Lattice bot framework.
//!
//! This crate carries the pieces the orchestration core is built on, with no
//! framework policy of its own:
//!
//! - **Events**: named platform events with JSON payloads ([`Event`],
//!   [`SharedEvent`])
//! - **Gateway seam**: the `on`/`off` subscription surface of the platform
//!   SDK ([`Gateway`], [`LocalGateway`])
//! - **Invocation context**: actor identity and reply capture
//!   ([`Actor`], [`CommandContext`])
//! - **Persistence seam**: pluggable key-value store ([`KvStore`],
//!   [`MemoryStore`], [`JsonFileStore`])
//! - **Cooldown store**: keyed, self-expiring suppression windows
//!   ([`CooldownStore`])
//!
//! The framework layer (`lattice-framework`) composes these into the command
//! and event dispatchers, the interaction router, and the plugin lifecycle
//! manager.

pub mod context;
pub mod cooldown;
pub mod error;
pub mod event;
pub mod gateway;
pub mod store;

pub use context::{Actor, CommandContext};
pub use cooldown::CooldownStore;
pub use error::{BoxError, HandlerError, StoreError, StoreResult};
pub use event::{Event, SharedEvent};
pub use gateway::{EventSink, Gateway, ListenerId, LocalGateway};
pub use store::{JsonFileStore, KvStore, MemoryStore};
