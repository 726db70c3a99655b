//! Decoding engine error types.

use thiserror::Error;

/// Errors raised while decoding captured traffic.
///
/// None of these abort a decoding session: callers convert them into
/// per-record diagnostics and keep going with the next message or the
/// next connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A field read would run past the end of the message.
    #[error("truncated message: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the message.
        available: usize,
    },

    /// A declared message length exceeds the configured maximum.
    #[error("declared length {declared} exceeds maximum {max}")]
    OversizedLength {
        /// Length the header claimed.
        declared: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// A protocol module identifier was registered twice.
    #[error("protocol module already registered: {0}")]
    DuplicateRegistration(String),

    /// No module is registered under the given identifier.
    #[error("unknown protocol identifier: {0}")]
    UnknownProtocol(String),

    /// Structurally invalid message content.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

/// Result type alias for decoding operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

impl From<toml::de::Error> for DecodeError {
    fn from(err: toml::de::Error) -> Self {
        DecodeError::Config(err.to_string())
    }
}
