//! # Error Handling
//!
//! Error taxonomy for the vSphere secrets backend. Every variant belongs to one
//! [`ErrorKind`], which drives how the transport reports it and whether a caller
//! should retry the whole request.

use std::fmt;

use crate::provider::ProviderError;
use crate::storage::StorageError;

/// Custom result type for backend operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the backend
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// No endpoint URL could be resolved from the environment or stored config
    #[error("Configuration error: url is required")]
    MissingUrl,

    /// An endpoint URL that is not an absolute URI
    #[error("Configuration error: invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Request validation failed at a write boundary
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// The host could not provide its environment metadata
    #[error("error loading plugin environment: {0}")]
    EnvironmentUnavailable(String),

    /// A record the caller referenced does not exist
    #[error("{resource_type} '{id}' does not exist")]
    NotFound { resource_type: String, id: String },

    /// An update targeted a record that was never created
    #[error("{resource_type} not found during update operation")]
    MissingForUpdate { resource_type: String },

    /// Stored connection configuration could not be loaded
    #[error("error loading configuration: {0}")]
    ConfigLoad(#[source] StorageError),

    /// Building a session provider failed (usually the mount login was rejected)
    #[error("error creating vSphere client: {0}")]
    ProviderConstruction(#[source] ProviderError),

    /// Logging in with a role's static credentials failed
    #[error("login failed for '{username}': {source}")]
    LoginFailed {
        username: String,
        #[source]
        source: ProviderError,
    },

    /// Dynamic issuance failed; already-created remote objects were rolled back
    #[error("error issuing session for role '{role}': {source}")]
    Issuance {
        role: String,
        #[source]
        source: ProviderError,
    },

    /// A required revocation step failed
    #[error("error during revoke: {0}")]
    Revocation(#[source] ProviderError),

    /// Any other provider failure surfaced unchanged
    #[error("vSphere provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Key-value storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network transport errors for the HTTP surface
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error categories reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing/invalid URL, invalid role definitions
    Configuration,
    /// The remote system rejected a login
    Authentication,
    /// Network or transport failure to the remote system
    RemoteUnavailable,
    /// Role or config absent
    NotFound,
    /// Everything else
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration_error"),
            ErrorKind::Authentication => write!(f, "authentication_error"),
            ErrorKind::RemoteUnavailable => write!(f, "remote_unavailable"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Internal => write!(f, "internal_error"),
        }
    }
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create an error for an update of a record that does not exist
    pub fn missing_for_update<R: Into<String>>(resource_type: R) -> Self {
        Self::MissingForUpdate { resource_type: resource_type.into() }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_)
            | Error::MissingUrl
            | Error::InvalidUrl { .. }
            | Error::Validation { .. } => ErrorKind::Configuration,
            Error::NotFound { .. } | Error::MissingForUpdate { .. } => ErrorKind::NotFound,
            Error::ProviderConstruction(source)
            | Error::LoginFailed { source, .. }
            | Error::Issuance { source, .. }
            | Error::Revocation(source)
            | Error::Provider(source) => provider_kind(source),
            Error::EnvironmentUnavailable(_)
            | Error::ConfigLoad(_)
            | Error::Storage(_)
            | Error::Serialization(_)
            | Error::Transport(_)
            | Error::Io(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Configuration => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Authentication => 502,
            ErrorKind::RemoteUnavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    /// Whether the caller may retry the whole request. No retry happens internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::RemoteUnavailable)
            || matches!(self, Error::Storage(_) | Error::ConfigLoad(_) | Error::Io(_))
    }
}

fn provider_kind(error: &ProviderError) -> ErrorKind {
    match error {
        ProviderError::AuthenticationFailed { .. } => ErrorKind::Authentication,
        ProviderError::ConnectionFailed { .. } => ErrorKind::RemoteUnavailable,
        _ => ErrorKind::Internal,
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}
