//! Error types for Workdesk.

use thiserror::Error;

use crate::auth::AuthError;
use crate::tools::RegistryError;

/// Primary error type for Workdesk operations.
///
/// Display strings are user-facing: short, free of credentials and request
/// bodies.
#[derive(Error, Debug)]
pub enum WorkdeskError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authorization was denied; run login again to retry")]
    AuthorizationDenied,

    #[error("Authorization request expired; run login again to get a new code")]
    AuthorizationExpired,

    #[error("Too many failed attempts; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Unknown tool: \"{0}\"")]
    UnknownTool(String),

    #[error("Unknown action: \"{0}\"")]
    UnknownAction(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Not authenticated; run the auth tool's login action first")]
    CredentialMissing,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Protocol,
    Authorization,
    RateLimit,
    Caller,
    Credential,
    Configuration,
    Internal,
}

impl WorkdeskError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) => ErrorCategory::Network,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::AuthorizationDenied | Self::AuthorizationExpired => ErrorCategory::Authorization,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::UnknownTool(_) | Self::UnknownAction(_) | Self::MissingField(_) => {
                ErrorCategory::Caller
            }
            Self::CredentialMissing => ErrorCategory::Credential,
            Self::Configuration(_) | Self::Registry(_) => ErrorCategory::Configuration,
            Self::Io(_) | Self::Serialization(_) | Self::InvalidState(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a caller may retry the same request unchanged.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Network)
    }
}

impl From<AuthError> for WorkdeskError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Network(msg) => Self::Network(msg),
            AuthError::Protocol(msg) => Self::Protocol(msg),
            AuthError::AuthorizationDenied => Self::AuthorizationDenied,
            AuthError::AuthorizationExpired => Self::AuthorizationExpired,
            AuthError::RateLimited { retry_after_secs } => Self::RateLimited { retry_after_secs },
            AuthError::CredentialMissing => Self::CredentialMissing,
            AuthError::Unsupported(msg) => Self::InvalidState(msg),
            AuthError::Io(msg) => Self::InvalidState(format!("credential storage: {msg}")),
            AuthError::Serialization(msg) => {
                Self::InvalidState(format!("credential storage: {msg}"))
            }
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, WorkdeskError>;
