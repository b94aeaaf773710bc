//! Error types for session provider operations.

use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Errors raised by a [`super::SessionProvider`].
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The remote system rejected the credentials.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The remote system could not be reached.
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    /// A remote object (principal, role, group, assignment) does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// The session is already closed or expired.
    #[error("session not found or already closed")]
    SessionNotFound,

    /// The provider cannot perform this operation.
    #[error("operation '{operation}' is not supported by this provider")]
    Unsupported { operation: &'static str },

    /// The remote system answered with something unexpected.
    #[error("Backend error: {message}")]
    Backend { message: String },
}

impl ProviderError {
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: message.into() }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: message.into() }
    }

    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound { kind: kind.into(), name: name.into() }
    }

    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::SessionNotFound)
    }
}
