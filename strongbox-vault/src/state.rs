//! Per-identity vault state and its observable snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;
use strongbox_crypto::{DataKey, WrappedBundle};
use zeroize::Zeroizing;

/// Opaque, stable identifier of the signed-in account.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for IdentityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What the remote store says about a vault's existence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    /// Existence could not be determined.
    #[default]
    Unknown,
    Absent,
    Present,
}

/// Mutable state held by the store for one identity.
///
/// Replaced wholesale whenever the observed identity changes, so nothing
/// leaks from one account to the next.
pub(crate) struct VaultState {
    pub identity: Option<IdentityId>,
    pub data_key: Option<DataKey>,
    pub bundle: Option<WrappedBundle>,
    pub cached_passphrase: Option<Zeroizing<String>>,
    pub remote_status: RemoteStatus,
    pub last_error: Option<String>,
    pub initialized: bool,
    pub loading: bool,
    pub pending_upload: bool,
    /// The bundle was read from the remote store and is not cached on this
    /// device yet; it gets cached once a passphrase has unwrapped it.
    pub remote_only: bool,
    /// Bumped by every explicit lock. A silent unlock started under an older
    /// epoch must not install its key.
    pub lock_epoch: u64,
}

impl VaultState {
    pub fn for_identity(identity: Option<IdentityId>) -> Self {
        Self {
            identity,
            data_key: None,
            bundle: None,
            cached_passphrase: None,
            remote_status: RemoteStatus::Unknown,
            last_error: None,
            initialized: false,
            loading: false,
            pending_upload: false,
            remote_only: false,
            lock_epoch: 0,
        }
    }

    /// Installs a bundle. Holding a bundle implies a vault exists.
    ///
    /// An unlocked key is dropped if the bundle it came from is replaced.
    pub fn install_bundle(&mut self, bundle: WrappedBundle) {
        let replaced = self
            .bundle
            .as_ref()
            .is_some_and(|current| current.fingerprint() != bundle.fingerprint());
        if replaced {
            self.data_key = None;
        }
        self.bundle = Some(bundle);
        self.remote_only = false;
        self.remote_status = RemoteStatus::Present;
    }

    /// Forgets the vault entirely (remote reported no vault).
    pub fn clear_vault(&mut self) {
        self.bundle = None;
        self.remote_only = false;
        self.data_key = None;
        self.cached_passphrase = None;
        self.remote_status = RemoteStatus::Absent;
    }

    /// Whether a vault is believed or known to exist.
    ///
    /// When the remote status is unknown this errs towards `true` so the
    /// gate never offers to create over a vault that may exist.
    pub fn has_bundle(&self) -> bool {
        self.bundle.is_some() || self.remote_status != RemoteStatus::Absent
    }

    pub fn snapshot(&self) -> VaultSnapshot {
        VaultSnapshot {
            identity: self.identity.clone(),
            unlocked: self.data_key.is_some(),
            has_bundle: self.has_bundle(),
            loading: self.loading,
            initialized: self.initialized,
            remote_status: self.remote_status,
            vault_error: self.last_error.clone(),
            pending_upload: self.pending_upload,
        }
    }
}

/// Point-in-time view of the store, delivered to subscribers.
///
/// Never carries key material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VaultSnapshot {
    pub identity: Option<IdentityId>,
    pub unlocked: bool,
    pub has_bundle: bool,
    pub loading: bool,
    pub initialized: bool,
    pub remote_status: RemoteStatus,
    pub vault_error: Option<String>,
    pub pending_upload: bool,
}

impl Default for VaultSnapshot {
    fn default() -> Self {
        VaultState::for_identity(None).snapshot()
    }
}
