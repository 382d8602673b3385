//! Unlock gate: decides which vault screen to show and drives the forms.

use crate::error::VaultError;
use crate::state::VaultSnapshot;
use crate::store::VaultStore;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use strongbox_crypto::DataKey;
use thiserror::Error;
use tracing::debug;

/// The screen the gate presents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// No signed-in identity.
    SignIn,
    /// Reconciliation has not finished.
    Loading,
    /// No vault exists yet; show passphrase + confirmation.
    Create,
    /// A vault exists but is locked.
    Unlock,
    /// Protected content may be shown.
    Unlocked,
}

impl GateMode {
    /// Picks exactly one mode for a snapshot.
    ///
    /// An unlocked key outranks `loading`: a key can only be present after a
    /// successful create or unlock for this identity.
    pub fn for_snapshot(snapshot: &VaultSnapshot) -> Self {
        if snapshot.identity.is_none() {
            GateMode::SignIn
        } else if snapshot.unlocked {
            GateMode::Unlocked
        } else if !snapshot.initialized || snapshot.loading {
            GateMode::Loading
        } else if !snapshot.has_bundle {
            GateMode::Create
        } else {
            GateMode::Unlock
        }
    }
}

/// Errors shown on the gate's forms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("enter a passphrase")]
    EmptyPassphrase,

    #[error("passphrase and confirmation do not match")]
    ConfirmationMismatch,

    #[error(transparent)]
    Vault(#[from] VaultError),
}

pub type GateResult<T> = Result<T, GateError>;

/// Front door to the vault for a UI.
///
/// Errors from a submission are kept for display until the next submission;
/// the form stays open so the user can retry.
pub struct VaultGate {
    store: VaultStore,
    form_error: Mutex<Option<GateError>>,
}

impl VaultGate {
    pub fn new(store: VaultStore) -> Self {
        Self {
            store,
            form_error: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &VaultStore {
        &self.store
    }

    /// Asks the store to initialize and returns the resulting mode.
    pub async fn mount(&self) -> GateMode {
        if let Err(e) = self.store.ensure_initialized(false).await {
            debug!(error = %e, "vault gate mounted with initialization error");
        }
        self.mode()
    }

    /// Forces a fresh reconciliation, e.g. after "could not confirm".
    pub async fn retry(&self) -> GateMode {
        self.set_error(None);
        if let Err(e) = self.store.ensure_initialized(true).await {
            debug!(error = %e, "vault gate retry failed");
        }
        self.mode()
    }

    pub fn mode(&self) -> GateMode {
        GateMode::for_snapshot(&self.store.snapshot())
    }

    /// Message to display: the last form error, else the store's error.
    pub fn error(&self) -> Option<String> {
        let form_error = self
            .form_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(ToString::to_string);
        form_error.or_else(|| self.store.vault_error())
    }

    /// Submits the create form. The confirmation is checked before the
    /// store is called.
    pub async fn submit_create(
        &self,
        passphrase: &str,
        confirmation: &str,
        remember_device: bool,
    ) -> GateResult<GateMode> {
        self.set_error(None);
        if passphrase.is_empty() {
            return Err(self.reject(GateError::EmptyPassphrase));
        }
        if passphrase != confirmation {
            return Err(self.reject(GateError::ConfirmationMismatch));
        }
        self.store
            .create_with_passphrase(passphrase, remember_device)
            .await
            .map_err(|e| self.reject(e.into()))?;
        Ok(self.mode())
    }

    pub async fn submit_unlock(
        &self,
        passphrase: &str,
        remember_passphrase: bool,
    ) -> GateResult<GateMode> {
        self.set_error(None);
        if passphrase.is_empty() {
            return Err(self.reject(GateError::EmptyPassphrase));
        }
        self.store
            .unlock_with_passphrase(passphrase, remember_passphrase)
            .await
            .map_err(|e| self.reject(e.into()))?;
        Ok(self.mode())
    }

    pub async fn lock(&self, wipe_local_copy: bool) -> GateResult<GateMode> {
        self.set_error(None);
        self.store
            .lock(wipe_local_copy)
            .await
            .map_err(|e| self.reject(e.into()))?;
        Ok(self.mode())
    }

    /// Runs `f` with the data key only while the gate is unlocked.
    pub fn with_unlocked<T>(&self, f: impl FnOnce(&DataKey) -> T) -> Option<T> {
        if self.mode() != GateMode::Unlocked {
            return None;
        }
        self.store.data_key().map(|key| f(&key))
    }

    fn reject(&self, err: GateError) -> GateError {
        self.set_error(Some(err.clone()));
        err
    }

    fn set_error(&self, err: Option<GateError>) {
        *self.form_error.lock().unwrap_or_else(PoisonError::into_inner) = err;
    }
}
