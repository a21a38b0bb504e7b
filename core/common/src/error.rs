//! Common error types for filedeck.

use thiserror::Error;

/// Top-level error type for filedeck operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Server configuration could not be fetched. Fatal for the session.
    #[error("Failed to fetch server configuration: {0}")]
    ConfigFetch(String),

    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The server rejected a create or rename request.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A single file transfer failed.
    #[error("Upload of {file} failed: {reason}")]
    Upload { file: String, reason: String },

    /// The server answered 401 on an endpoint other than the token check.
    #[error("Login required: {0}")]
    Unauthorized(String),

    /// Transport-level failure or unexpected server status.
    #[error("Network error: {0}")]
    Network(String),

    /// Access denied by the server.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not permitted in the current session state.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether the server answered 401, including rejected credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized(_) | Error::Authentication(_))
    }

    /// Message suitable for inline display next to the form that failed.
    ///
    /// Server-supplied messages are returned verbatim.
    pub fn user_message(&self) -> String {
        match self {
            Error::Authentication(msg)
            | Error::Validation(msg)
            | Error::Unauthorized(msg)
            | Error::NotPermitted(msg) => msg.clone(),
            Error::Upload { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
