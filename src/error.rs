//! Error types for DifyChat
//!
//! This module defines all error types used throughout the client core,
//! using `thiserror` for ergonomic error handling. Variants follow the
//! failure classes the session layer distinguishes: network failures are
//! recoverable, validation failures are rejected before any mutation,
//! expired logins are a state rather than a crash, and missing optional
//! configuration is substituted with defaults.

use thiserror::Error;

/// Main error type for DifyChat operations
#[derive(Error, Debug)]
pub enum DifyChatError {
    /// Any rejected remote call (catalog, parameters, conversations, upload)
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed input rejected before any mutation or network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Login timestamp is older than the configured session lifetime
    #[error("Session expired: {0}")]
    AuthExpired(String),

    /// Credentials did not match any configured user group
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local key-value storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Requested app id is not part of the resolved catalog
    #[error("App not found: {0}")]
    AppNotFound(String),

    /// Requested conversation id is not part of the current list
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Embedded database errors
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
}

impl DifyChatError {
    /// Returns `true` when the failure only degrades a feature.
    ///
    /// Only configuration errors stop the process; everything else is
    /// surfaced to the user and the session carries on.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DifyChatError::Config(_))
    }
}

/// Result type alias for DifyChat operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

/// Returns the typed error carried by an `anyhow::Error`, if any.
pub fn classify(err: &anyhow::Error) -> Option<&DifyChatError> {
    err.downcast_ref::<DifyChatError>()
}
