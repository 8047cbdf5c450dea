//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig)
//! - [`listen`]: Listener configuration (ListenConfig, PlaintextConfig, Protocol)
//! - [`broadcast`]: Fan-out policy (BroadcastConfig, Attribution)
//! - [`validation`]: Startup validation of a loaded config

mod broadcast;
mod defaults;
mod listen;
mod types;
pub mod validation;

pub use broadcast::{Attribution, BroadcastConfig};
pub use listen::{ListenConfig, Protocol};
pub use types::{Config, LogFormat};
