//! Bootstrap error types.
//!
//! Every failure is classified into an [`ErrorKind`] so the reconciler and
//! the orchestrator can branch on what happened instead of on message text.

use thiserror::Error;

/// Bootstrap error type.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Bad credentials, or the token endpoint could not be used.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Network failure or an overloaded server; retryable.
    #[error("transient network error: {0}")]
    Transient(String),

    /// The entity already exists (or is already associated).
    #[error("{resource_type} already exists: {id}")]
    Conflict {
        /// Type of resource.
        resource_type: String,
        /// Resource identifier.
        id: String,
    },

    /// The server rejected the payload as malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{resource_type} not found: {id}")]
    NotFound {
        /// Type of resource.
        resource_type: String,
        /// Resource identifier.
        id: String,
    },

    /// Unclassified API error.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The desired topology is inconsistent.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Coarse classification of a [`BootstrapError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Aborts the current step; retrying will not help.
    Fatal,
    /// May succeed if attempted again.
    Retryable,
    /// Entity or association already present.
    Conflict,
    /// The desired payload is malformed.
    Validation,
    /// A referenced entity does not exist.
    NotFound,
}

impl BootstrapError {
    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(resource_type: &str, id: impl Into<String>) -> Self {
        Self::Conflict {
            resource_type: resource_type.to_string(),
            id: id.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(resource_type: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.to_string(),
            id: id.into(),
        }
    }

    /// Maps an HTTP error status from the admin API to an error.
    #[must_use]
    pub fn from_status(status: u16, resource_type: &str, message: String) -> Self {
        match status {
            401 | 403 => Self::Authentication(message),
            409 => Self::Conflict {
                resource_type: resource_type.to_string(),
                id: message,
            },
            400 | 422 => Self::Validation(message),
            404 => Self::NotFound {
                resource_type: resource_type.to_string(),
                id: message,
            },
            408 | 429 | 500..=599 => Self::Transient(format!("{status} - {message}")),
            _ => Self::Api { status, message },
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) => ErrorKind::Retryable,
            Self::Http(err) if err.is_timeout() || err.is_connect() => ErrorKind::Retryable,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Authentication(_)
            | Self::Api { .. }
            | Self::Config(_)
            | Self::InvalidTopology(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Http(_) => ErrorKind::Fatal,
        }
    }

    /// Returns true if the error means "already exists".
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

/// Bootstrap result type.
pub type BootstrapResult<T> = Result<T, BootstrapError>;
