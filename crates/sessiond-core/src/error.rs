//! Error types for sessiond.

use thiserror::Error;

use crate::SessionVariant;

/// Main error type for session registry operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller demanded an existing session but none is registered
    #[error("Session has expired: {0}")]
    SessionExpired(String),

    /// Session id maps to a session of the other variant
    #[error("Unexpected session type for '{id}': expected {expected}, found {found}")]
    SessionTypeConflict {
        /// Session identifier
        id: String,
        /// Variant the caller asked for
        expected: SessionVariant,
        /// Variant actually registered
        found: SessionVariant,
    },

    /// Bearer token rejected by the auth controller
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Auth controller failure other than a bad token
    #[error("Auth error: {0}")]
    Auth(String),

    /// User unknown to the auth controller
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// A session handler failed while a session was opened or closed
    #[error("Session handler '{handler}' failed: {message}")]
    Handler {
        /// Handler name
        handler: String,
        /// Failure description
        message: String,
    },

    /// Event could not be handed to the event sink
    #[error("Event dispatch failed: {0}")]
    EventDispatch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SessionExpired(_) => "session_expired",
            Error::SessionTypeConflict { .. } => "session_type_conflict",
            Error::InvalidToken(_) => "invalid_token",
            Error::Auth(_) => "auth",
            Error::UserNotFound(_) => "user_not_found",
            Error::Handler { .. } => "handler",
            Error::EventDispatch(_) => "event_dispatch",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Other(_) => "other",
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
