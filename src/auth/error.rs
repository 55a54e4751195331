use thiserror::Error;

/// Errors raised by the device flow, credential store, and rate guard.
///
/// Messages are short and never carry a credential value or a request body.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unexpected response from authorization server: {0}")]
    Protocol(String),
    #[error("Authorization was denied; run login again to retry")]
    AuthorizationDenied,
    #[error("Authorization request expired; run login again to get a new code")]
    AuthorizationExpired,
    #[error("Too many failed attempts; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Not authenticated; run login first")]
    CredentialMissing,
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.without_url().to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
