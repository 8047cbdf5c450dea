//! Network module.
//!
//! Contains the Gateway (TCP listeners), the request router in front of
//! the WebSocket path, the per-connection Dispatcher and the transports it
//! drives.

mod connection;
mod frontend;
mod gateway;
pub mod transport;

pub use connection::Dispatcher;
pub use gateway::Gateway;
