//! State management module.
//!
//! Contains the Registry (shared connection set) and the per-connection
//! state it tracks.

mod connection;
mod registry;
mod uid;

pub use connection::{Connection, Outbound};
pub use registry::Registry;
pub use uid::{ConnectionId, IdGenerator};

#[cfg(test)]
pub(crate) use connection::Lifecycle;
#[cfg(test)]
pub(crate) use connection::tests::{open_connection, test_addr};
