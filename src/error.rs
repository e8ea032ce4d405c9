//! Error types for Convogate
//!
//! This module defines the error taxonomy used throughout the gateway,
//! using `thiserror` for ergonomic error handling. The HTTP layer that
//! embeds this crate matches on these variants to choose status codes, so
//! the crate-wide `Result` carries `GatewayError` directly.

use thiserror::Error;

/// Main error type for gateway operations
///
/// `NotFound` and `Forbidden` are distinct internally, but the
/// caller-facing operations on [`crate::gateway::ChatGateway`] report both
/// as `NotFound` so that the existence of a foreign-owned conversation is
/// never leaked.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Unknown conversation id
    #[error("conversation not found")]
    NotFound,

    /// Conversation exists but is owned by a different user
    #[error("access to conversation denied")]
    Forbidden,

    /// Missing required field or out-of-range parameter
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Remote provider call failed or returned a non-success status.
    /// Carries the HTTP status when one was received and the raw response
    /// body, never a partially parsed payload.
    #[error("provider error{}: {body}", fmt_status(.status))]
    Provider {
        /// HTTP status code, when the provider responded at all
        status: Option<u16>,
        /// Raw response body or transport error description
        body: String,
    },

    /// Durable read/write/delete failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation errors
    #[error("configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {})", code),
        None => String::new(),
    }
}

impl GatewayError {
    /// Build a provider error from an optional status and a raw body.
    pub fn provider(status: Option<u16>, body: impl Into<String>) -> Self {
        Self::Provider {
            status,
            body: body.into(),
        }
    }

    /// Build a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Build an invalid-argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
