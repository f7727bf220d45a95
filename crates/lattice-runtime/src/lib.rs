//! # Lattice Runtime
//!
//! Runtime orchestration layer for the Lattice bot framework: configuration
//! loading ([`config`]), logging setup ([`logging`]), the HTTP manifest
//! transport ([`rest`]), and the composition root that wires the
//! orchestration core together ([`Lattice`]).

pub mod config;
pub mod error;
pub mod logging;
pub mod rest;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, LatticeConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use rest::HttpManifestTransport;
pub use runtime::{Lattice, LatticeBuilder};
