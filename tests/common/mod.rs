//! Integration test common infrastructure.
//!
//! Provides utilities for spawning test servers and driving WebSocket and
//! line-based clients against them.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::{LineClient, WsClient};
#[allow(unused_imports)]
pub use server::{Options, TestServer};
