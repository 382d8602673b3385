//! Cloud client error types.

use strongbox_vault::VaultError;
use thiserror::Error;

/// Result type for cloud operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur talking to the Strongbox API.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("signed in as {signed_in}, not {requested}")]
    IdentityMismatch { signed_in: String, requested: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<CloudError> for VaultError {
    fn from(e: CloudError) -> Self {
        VaultError::Remote(e.to_string())
    }
}
