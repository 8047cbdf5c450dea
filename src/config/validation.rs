//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::net::SocketAddr;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("listen.path must start with '/', got '{0}'")]
    InvalidPath(String),
    #[error("listen.handshake_timeout_ms must be greater than zero")]
    ZeroHandshakeTimeout,
    #[error("listen.max_message_bytes must be greater than zero")]
    ZeroMessageLimit,
    #[error("listen.allow_origins contains an empty entry")]
    EmptyOrigin,
    #[error("listen.fallback must not point at the listener itself ({0})")]
    FallbackLoop(SocketAddr),
    #[error("plaintext.address collides with listen.address ({0})")]
    AddressCollision(SocketAddr),
    #[error("broadcast.send_queue must be greater than zero")]
    ZeroSendQueue,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let listen = &config.listen;

    if !listen.path.starts_with('/') {
        errors.push(ValidationError::InvalidPath(listen.path.clone()));
    }
    if listen.handshake_timeout_ms == 0 {
        errors.push(ValidationError::ZeroHandshakeTimeout);
    }
    if listen.max_message_bytes == 0 {
        errors.push(ValidationError::ZeroMessageLimit);
    }
    if listen.allow_origins.iter().any(|o| o.trim().is_empty()) {
        errors.push(ValidationError::EmptyOrigin);
    }
    if listen.fallback == Some(listen.address) {
        errors.push(ValidationError::FallbackLoop(listen.address));
    }

    if let Some(ref plaintext) = config.plaintext
        && plaintext.address == listen.address
    {
        errors.push(ValidationError::AddressCollision(plaintext.address));
    }

    if config.broadcast.send_queue == 0 {
        errors.push(ValidationError::ZeroSendQueue);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
