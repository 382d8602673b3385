//! Vault error types.
//!
//! Messages are user-facing: the unlock gate shows them verbatim. "No vault
//! yet" and "vault exists but could not be loaded" are kept distinct because
//! one calls for creating a vault and the other for retrying.

use strongbox_crypto::CryptoError;
use thiserror::Error;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors surfaced by the vault store.
///
/// `Clone` so a single in-flight initialization can hand the same result to
/// every concurrent caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    #[error("sign in to access your vault")]
    NoIdentity,

    #[error("could not confirm whether a vault exists for this account; check your connection and try again")]
    StatusUnknown,

    #[error("a vault already exists for this account; unlock it instead")]
    AlreadyExists,

    #[error("no vault yet; create one to get started")]
    NoVault,

    #[error("your vault exists but could not be loaded; try again")]
    VaultUnavailable,

    #[error("passphrase does not match")]
    PassphraseMismatch,

    #[error("your saved passphrase no longer unlocks this vault; re-enter your passphrase")]
    CachedPassphraseRejected,

    #[error("passphrase must not be empty")]
    EmptyPassphrase,

    #[error("the signed-in account changed before the operation finished")]
    IdentityChanged,

    #[error("remote vault request failed: {0}")]
    Remote(String),

    #[error("local cache error: {0}")]
    Storage(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("background task failed: {0}")]
    Task(String),
}

impl VaultError {
    /// Whether retrying the same operation later can succeed without any
    /// change in user input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::StatusUnknown
                | VaultError::VaultUnavailable
                | VaultError::Remote(_)
                | VaultError::Storage(_)
                | VaultError::IdentityChanged
        )
    }
}

impl From<duckdb::Error> for VaultError {
    fn from(e: duckdb::Error) -> Self {
        VaultError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Storage(e.to_string())
    }
}
