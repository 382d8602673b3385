//! The vault state store.
//!
//! [`VaultStore`] owns the in-memory data key, the wrapped bundle, and the
//! remembered passphrase for the signed-in identity. It reconciles three
//! sources of truth (local cache, remote store, user input) and broadcasts a
//! [`VaultSnapshot`] after every mutation.
//!
//! # Concurrency
//!
//! - Concurrent [`ensure_initialized`](VaultStore::ensure_initialized) calls
//!   for the same identity share one in-flight reconciliation.
//! - User operations (create, unlock, lock, flush) are serialized by an
//!   async operation lock, so crypto and cache work never overlaps.
//! - Every async step re-checks the identity before applying its result; a
//!   result computed for a superseded identity is dropped.
//! - Initialization does not take the operation lock. An explicit lock bumps
//!   a lock epoch, and a silent unlock started under an older epoch drops
//!   its key instead of installing it.
//! - The state mutex is never held across an `.await`.

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::identity::IdentityProvider;
use crate::listeners::{ListenerId, Listeners};
use crate::local_cache::LocalCache;
use crate::remote::{RemoteBundle, RemoteVault};
use crate::state::{IdentityId, RemoteStatus, VaultSnapshot, VaultState};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strongbox_crypto::{DataKey, WrappedBundle, generate_data_key, unwrap_data_key, wrap_data_key};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

type SharedInit = Shared<BoxFuture<'static, VaultResult<()>>>;

struct InFlight {
    identity: Option<IdentityId>,
    ticket: u64,
    future: SharedInit,
}

/// Where initialization found the bundle, and what it learned about the
/// remote vault.
struct Resolved {
    bundle: Option<WrappedBundle>,
    status: RemoteStatus,
    from_remote: bool,
    error: Option<VaultError>,
}

impl Resolved {
    fn cached(bundle: WrappedBundle) -> Self {
        Self {
            bundle: Some(bundle),
            status: RemoteStatus::Present,
            from_remote: false,
            error: None,
        }
    }

    fn status_only(status: RemoteStatus) -> Self {
        Self {
            bundle: None,
            status,
            from_remote: false,
            error: None,
        }
    }

    fn unknown() -> Self {
        Self {
            error: Some(VaultError::StatusUnknown),
            ..Self::status_only(RemoteStatus::Unknown)
        }
    }
}

/// Shared handle to the vault state store. Clones refer to the same store.
#[derive(Clone)]
pub struct VaultStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: VaultConfig,
    identity: Arc<dyn IdentityProvider>,
    remote: Arc<dyn RemoteVault>,
    cache: Arc<dyn LocalCache>,
    state: Mutex<VaultState>,
    inflight: Mutex<Option<InFlight>>,
    op_lock: tokio::sync::Mutex<()>,
    listeners: Listeners,
    snapshot_tx: watch::Sender<VaultSnapshot>,
    next_ticket: AtomicU64,
}

impl VaultStore {
    pub fn new(
        config: VaultConfig,
        identity: Arc<dyn IdentityProvider>,
        remote: Arc<dyn RemoteVault>,
        cache: Arc<dyn LocalCache>,
    ) -> Self {
        let (snapshot_tx, _rx) = watch::channel(VaultSnapshot::default());
        Self {
            inner: Arc::new(StoreInner {
                config,
                identity,
                remote,
                cache,
                state: Mutex::new(VaultState::for_identity(None)),
                inflight: Mutex::new(None),
                op_lock: tokio::sync::Mutex::new(()),
                listeners: Listeners::default(),
                snapshot_tx,
                next_ticket: AtomicU64::new(0),
            }),
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Reconciles local cache, remote store, and remembered passphrase for
    /// the current identity.
    ///
    /// Concurrent callers for the same identity await one shared run. Once
    /// initialized, further calls return immediately unless `force` is set.
    /// Returns [`VaultError::StatusUnknown`] when the remote could not say
    /// whether a vault exists; the store is still marked initialized.
    pub async fn ensure_initialized(&self, force: bool) -> VaultResult<()> {
        let identity = self.inner.sync_identity();

        let future = {
            let mut slot = self.inner.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            let running = slot
                .as_ref()
                .filter(|running| running.identity == identity)
                .map(|running| running.future.clone());
            match running {
                Some(future) => future,
                None => {
                    let initialized = self.inner.state().initialized;
                    if initialized && !force {
                        return Ok(());
                    }

                    let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
                    let weak = Arc::downgrade(&self.inner);
                    let target = identity.clone();
                    let future = async move {
                        match weak.upgrade() {
                            Some(inner) => inner.initialize(target, ticket).await,
                            None => Ok(()),
                        }
                    }
                    .boxed()
                    .shared();

                    *slot = Some(InFlight {
                        identity,
                        ticket,
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        future.await
    }

    /// Creates a vault protected by `passphrase` and unlocks it.
    ///
    /// Refused unless the remote store has confirmed that no vault exists.
    /// If the upload fails after retries, the vault stays usable and a local
    /// copy is kept until [`flush_pending_upload`](Self::flush_pending_upload)
    /// succeeds.
    pub async fn create_with_passphrase(
        &self,
        passphrase: &str,
        remember_device: bool,
    ) -> VaultResult<()> {
        let _op = self.inner.op_lock.lock().await;
        let identity = self.require_identity()?;
        if passphrase.is_empty() {
            return Err(self.inner.record_error(&identity, VaultError::EmptyPassphrase));
        }

        let initialized = self.inner.state().initialized;
        if !initialized {
            if let Err(e) = self.ensure_initialized(false).await {
                debug!(%identity, error = %e, "initialization before create failed");
            }
        }

        let status = self
            .inner
            .read_state(&identity, |s| s.remote_status)
            .ok_or(VaultError::IdentityChanged)?;
        match status {
            RemoteStatus::Absent => {}
            RemoteStatus::Present => {
                return Err(self.inner.record_error(&identity, VaultError::AlreadyExists));
            }
            RemoteStatus::Unknown => {
                return Err(self.inner.record_error(&identity, VaultError::StatusUnknown));
            }
        }

        let data_key = generate_data_key();
        let bundle = wrap_off_thread(data_key.clone(), passphrase).await?;

        self.inner
            .apply(&identity, |s| {
                if s.remote_status != RemoteStatus::Absent {
                    return Err(VaultError::AlreadyExists);
                }
                s.install_bundle(bundle.clone());
                s.data_key = Some(data_key);
                s.initialized = true;
                s.last_error = None;
                Ok(())
            })
            .ok_or(VaultError::IdentityChanged)?
            .map_err(|e| self.inner.record_error(&identity, e))?;

        match self.inner.push_remote(&identity, &bundle).await {
            Ok(()) => {
                info!(%identity, fingerprint = %bundle.fingerprint(), "vault created");
                if remember_device {
                    self.inner.cache_bundle(&identity, &bundle);
                } else {
                    self.inner.forget_cached_bundle(&identity);
                }
            }
            Err(e) => {
                error!(
                    %identity,
                    error = %e,
                    "vault created but not uploaded; keeping a local copy until upload succeeds"
                );
                self.inner.cache_bundle(&identity, &bundle);
                self.inner.apply(&identity, |s| s.pending_upload = true);
            }
        }

        Ok(())
    }

    /// Unlocks the vault with `passphrase`.
    ///
    /// The bundle is taken from memory, then the local cache, then the remote
    /// store. Any unwrap failure is reported as
    /// [`VaultError::PassphraseMismatch`].
    pub async fn unlock_with_passphrase(
        &self,
        passphrase: &str,
        remember_passphrase: bool,
    ) -> VaultResult<()> {
        let _op = self.inner.op_lock.lock().await;
        let identity = self.require_identity()?;
        if passphrase.is_empty() {
            return Err(self.inner.record_error(&identity, VaultError::EmptyPassphrase));
        }

        let in_memory = self
            .inner
            .read_state(&identity, |s| s.bundle.clone().map(|b| (b, s.remote_only)))
            .ok_or(VaultError::IdentityChanged)?;
        let (bundle, from_remote) = match in_memory {
            Some((bundle, remote_only)) => (Some(bundle), remote_only),
            None => self.inner.locate_bundle(&identity).await,
        };

        let Some(bundle) = bundle else {
            let status = self
                .inner
                .read_state(&identity, |s| s.remote_status)
                .ok_or(VaultError::IdentityChanged)?;
            let err = if status == RemoteStatus::Absent {
                VaultError::NoVault
            } else {
                VaultError::VaultUnavailable
            };
            return Err(self.inner.record_error(&identity, err));
        };

        let passphrase = Zeroizing::new(passphrase.to_string());
        let key = match unwrap_off_thread(bundle.clone(), passphrase.clone()).await {
            Ok(key) => key,
            Err(_) => {
                debug!(%identity, "unlock rejected");
                self.inner.apply(&identity, |s| {
                    s.install_bundle(bundle);
                    s.remote_only = from_remote;
                    s.data_key = None;
                    s.last_error = Some(VaultError::PassphraseMismatch.to_string());
                });
                return Err(VaultError::PassphraseMismatch);
            }
        };

        self.inner
            .apply(&identity, |s| {
                s.install_bundle(bundle.clone());
                s.data_key = Some(key);
                s.cached_passphrase = remember_passphrase.then(|| passphrase.clone());
                s.initialized = true;
                s.last_error = None;
            })
            .ok_or(VaultError::IdentityChanged)?;

        if remember_passphrase {
            self.inner.remember_passphrase(&identity, &passphrase);
        } else {
            self.inner.forget_cached_passphrase(&identity);
        }
        if from_remote {
            self.inner.cache_bundle(&identity, &bundle);
        }

        info!(%identity, "vault unlocked");
        Ok(())
    }

    /// Drops the in-memory data key of the identity currently signed in.
    ///
    /// With `wipe_local_copy`, also deletes that identity's cached bundle and
    /// remembered passphrase. The remote bundle is never touched. Signed out,
    /// this is a no-op.
    pub async fn lock(&self, wipe_local_copy: bool) -> VaultResult<()> {
        let _op = self.inner.op_lock.lock().await;
        let Some(identity) = self.inner.sync_identity() else {
            debug!("lock requested while signed out");
            return Ok(());
        };

        let pending_upload = self
            .inner
            .apply(&identity, |s| {
                s.data_key = None;
                s.lock_epoch += 1;
                if wipe_local_copy {
                    s.cached_passphrase = None;
                }
                s.pending_upload
            })
            .ok_or(VaultError::IdentityChanged)?;

        if !wipe_local_copy {
            debug!(%identity, "vault locked");
            return Ok(());
        }

        if pending_upload {
            warn!(%identity, "wiping the only persisted copy of a vault that was never uploaded");
        }
        let bundle_removed = self.inner.cache.remove_bundle(&identity);
        let passphrase_removed = self.inner.cache.remove_passphrase(&identity);
        bundle_removed.and(passphrase_removed)?;
        info!(%identity, "vault locked and local copy wiped");
        Ok(())
    }

    /// Retries the upload of a vault whose creation could not reach the
    /// remote store. Returns whether an upload happened.
    pub async fn flush_pending_upload(&self) -> VaultResult<bool> {
        let _op = self.inner.op_lock.lock().await;

        let pending = {
            let state = self.inner.state();
            match (&state.identity, &state.bundle) {
                (Some(identity), Some(bundle)) if state.pending_upload => {
                    Some((identity.clone(), bundle.clone()))
                }
                _ => None,
            }
        };
        let Some((identity, bundle)) = pending else {
            return Ok(false);
        };

        self.inner.push_remote(&identity, &bundle).await?;
        self.inner.apply(&identity, |s| s.pending_upload = false);
        info!(%identity, fingerprint = %bundle.fingerprint(), "pending vault upload completed");
        Ok(true)
    }

    // ========================================================================
    // Observables
    // ========================================================================

    /// The unlocked data key, if any.
    pub fn data_key(&self) -> Option<DataKey> {
        self.inner.sync_identity();
        self.inner.state().data_key.clone()
    }

    pub fn is_unlocked(&self) -> bool {
        self.snapshot().unlocked
    }

    pub fn has_bundle(&self) -> bool {
        self.snapshot().has_bundle
    }

    pub fn loading(&self) -> bool {
        self.snapshot().loading
    }

    pub fn initialized(&self) -> bool {
        self.snapshot().initialized
    }

    pub fn vault_error(&self) -> Option<String> {
        self.snapshot().vault_error
    }

    pub fn remote_status(&self) -> RemoteStatus {
        self.snapshot().remote_status
    }

    pub fn identity(&self) -> Option<IdentityId> {
        self.inner.sync_identity()
    }

    pub fn snapshot(&self) -> VaultSnapshot {
        self.inner.sync_identity();
        self.inner.state().snapshot()
    }

    /// Registers a callback invoked after every state change.
    ///
    /// Callbacks run synchronously on the mutating task and must not block.
    pub fn subscribe(
        &self,
        listener: impl Fn(&VaultSnapshot) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.listeners.add(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// A channel that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<VaultSnapshot> {
        self.inner.sync_identity();
        self.inner.snapshot_tx.subscribe()
    }

    /// Re-runs initialization whenever the identity provider reports a
    /// change. The task ends when the provider's channel closes.
    pub fn spawn_identity_listener(&self) -> JoinHandle<()> {
        let store = self.clone();
        let mut changes = self.inner.identity.changes();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let identity = changes.borrow_and_update().clone();
                debug!(identity = ?identity, "identity changed, reconciling vault");
                if let Err(e) = store.ensure_initialized(false).await {
                    warn!(error = %e, "vault reconciliation after identity change failed");
                }
            }
        })
    }

    fn require_identity(&self) -> VaultResult<IdentityId> {
        self.inner.sync_identity().ok_or(VaultError::NoIdentity)
    }
}

impl StoreInner {
    fn state(&self) -> MutexGuard<'_, VaultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Broadcasts the current snapshot to the watch channel and listeners.
    fn publish(&self) {
        let snapshot = {
            let state = self.state();
            let snapshot = state.snapshot();
            self.snapshot_tx.send_replace(snapshot.clone());
            snapshot
        };
        self.listeners.notify(&snapshot);
    }

    /// Resets state if the provider's identity differs from the one held.
    fn sync_identity(&self) -> Option<IdentityId> {
        let current = self.identity.current();
        let switched = {
            let mut state = self.state();
            if state.identity != current {
                *state = VaultState::for_identity(current.clone());
                true
            } else {
                false
            }
        };
        if switched {
            debug!(identity = ?current, "identity changed, vault state reset");
            self.publish();
        }
        current
    }

    /// Reads state if it still belongs to `identity`.
    fn read_state<R>(&self, identity: &IdentityId, f: impl FnOnce(&VaultState) -> R) -> Option<R> {
        let state = self.state();
        (state.identity.as_ref() == Some(identity)).then(|| f(&state))
    }

    /// Mutates state and publishes, unless `identity` has been superseded.
    fn apply<R>(
        &self,
        identity: &IdentityId,
        f: impl FnOnce(&mut VaultState) -> R,
    ) -> Option<R> {
        let result = {
            let mut state = self.state();
            let current = self.identity.current();
            if state.identity.as_ref() != Some(identity) || current.as_ref() != Some(identity) {
                return None;
            }
            f(&mut state)
        };
        self.publish();
        Some(result)
    }

    fn record_error(&self, identity: &IdentityId, err: VaultError) -> VaultError {
        self.apply(identity, |s| s.last_error = Some(err.to_string()));
        err
    }

    // ------------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------------

    async fn initialize(&self, identity: Option<IdentityId>, ticket: u64) -> VaultResult<()> {
        let result = self.reconcile(identity).await;

        let mut slot = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|running| running.ticket == ticket) {
            *slot = None;
        }
        result
    }

    async fn reconcile(&self, identity: Option<IdentityId>) -> VaultResult<()> {
        let Some(identity) = identity else {
            let changed = {
                let mut state = self.state();
                let changed = state.identity.is_none() && !state.initialized;
                if changed {
                    state.initialized = true;
                }
                changed
            };
            if changed {
                self.publish();
            }
            return Ok(());
        };

        let Some(epoch) = self.apply(&identity, |s| {
            s.loading = true;
            s.lock_epoch
        }) else {
            return Ok(());
        };

        let resolved = self.resolve(&identity).await;
        let status_error = resolved.error.clone();
        let applied = self.apply(&identity, |s| {
            match resolved.bundle.clone() {
                Some(bundle) => {
                    s.install_bundle(bundle);
                    s.remote_only = resolved.from_remote;
                }
                None => match resolved.status {
                    // A vault awaiting upload is not absent.
                    RemoteStatus::Absent if s.pending_upload => {}
                    RemoteStatus::Absent => s.clear_vault(),
                    status if s.bundle.is_none() => s.remote_status = status,
                    _ => {}
                },
            }
            s.last_error = status_error.as_ref().map(ToString::to_string);
        });
        if applied.is_none() {
            debug!(%identity, "identity changed during vault initialization, discarding result");
            return Ok(());
        }

        let unlock_error = self.try_auto_unlock(&identity, epoch).await;

        self.apply(&identity, |s| {
            s.initialized = true;
            s.loading = false;
        });

        match status_error.or(unlock_error) {
            Some(e) => {
                warn!(%identity, error = %e, "vault initialized with errors");
                Err(e)
            }
            None => {
                debug!(%identity, "vault initialized");
                Ok(())
            }
        }
    }

    async fn resolve(&self, identity: &IdentityId) -> Resolved {
        match self.cache.load_bundle(identity) {
            Ok(Some(cached)) if self.config.revalidate_cache_hits => {
                self.revalidate(identity, cached).await
            }
            Ok(Some(cached)) => {
                debug!(%identity, "vault bundle served from local cache");
                Resolved::cached(cached)
            }
            Ok(None) => self.fetch_remote(identity).await,
            Err(e) => {
                warn!(%identity, error = %e, "unreadable cached bundle, discarding");
                self.forget_cached_bundle(identity);
                self.fetch_remote(identity).await
            }
        }
    }

    async fn fetch_remote(&self, identity: &IdentityId) -> Resolved {
        match self.remote.fetch_bundle(identity).await {
            Ok(remote) => Resolved {
                status: remote.status(),
                from_remote: remote.bundle.is_some(),
                bundle: remote.bundle,
                error: None,
            },
            Err(e) => {
                warn!(%identity, error = %e, "bundle fetch failed, checking vault status");
                match self.remote.fetch_status(identity).await {
                    Ok(RemoteStatus::Unknown) => Resolved::unknown(),
                    Ok(status) => Resolved::status_only(status),
                    Err(e) => {
                        warn!(%identity, error = %e, "vault status check failed");
                        Resolved::unknown()
                    }
                }
            }
        }
    }

    /// Compares a cached bundle with the remote copy by fingerprint.
    async fn revalidate(&self, identity: &IdentityId, cached: WrappedBundle) -> Resolved {
        match self.remote.fetch_bundle(identity).await {
            Ok(RemoteBundle {
                bundle: Some(remote),
                ..
            }) => {
                if remote.fingerprint() == cached.fingerprint() {
                    Resolved::cached(cached)
                } else {
                    info!(%identity, "cached vault bundle is stale, using remote copy");
                    self.forget_cached_bundle(identity);
                    Resolved {
                        bundle: Some(remote),
                        status: RemoteStatus::Present,
                        from_remote: true,
                        error: None,
                    }
                }
            }
            Ok(RemoteBundle {
                bundle: None,
                has_vault: false,
            }) => {
                let pending_upload = self.state().pending_upload;
                if pending_upload {
                    Resolved::cached(cached)
                } else {
                    warn!(%identity, "cached vault bundle has no remote counterpart, discarding");
                    self.forget_cached_bundle(identity);
                    self.forget_cached_passphrase(identity);
                    Resolved::status_only(RemoteStatus::Absent)
                }
            }
            Ok(_) => Resolved::cached(cached),
            Err(e) => {
                debug!(%identity, error = %e, "could not revalidate cached bundle, trusting it");
                Resolved::cached(cached)
            }
        }
    }

    /// Tries the remembered passphrase against the installed bundle.
    ///
    /// The key is not installed if the vault was explicitly locked after
    /// `epoch` was read.
    async fn try_auto_unlock(&self, identity: &IdentityId, epoch: u64) -> Option<VaultError> {
        let (bundle, remembered, from_remote) = self
            .read_state(identity, |s| match (&s.bundle, &s.data_key) {
                (Some(bundle), None) => Some((
                    bundle.clone(),
                    s.cached_passphrase.clone(),
                    s.remote_only,
                )),
                _ => None,
            })
            .flatten()?;

        let passphrase = match remembered {
            Some(passphrase) => passphrase,
            None => match self.cache.load_passphrase(identity) {
                Ok(passphrase) => passphrase?,
                Err(e) => {
                    warn!(%identity, error = %e, "could not read remembered passphrase");
                    return None;
                }
            },
        };

        match unwrap_off_thread(bundle.clone(), passphrase.clone()).await {
            Ok(key) => {
                let applied = self.apply(identity, |s| {
                    if s.bundle.as_ref() != Some(&bundle) || s.lock_epoch != epoch {
                        return false;
                    }
                    s.data_key = Some(key);
                    s.cached_passphrase = Some(passphrase);
                    s.remote_only = false;
                    s.last_error = None;
                    true
                });
                if applied == Some(true) {
                    info!(%identity, "vault unlocked with remembered passphrase");
                    if from_remote {
                        self.cache_bundle(identity, &bundle);
                    }
                } else {
                    debug!(%identity, "vault changed during silent unlock, key discarded");
                }
                None
            }
            Err(_) => {
                warn!(%identity, "remembered passphrase rejected, forgetting it");
                self.forget_cached_passphrase(identity);
                let err = VaultError::CachedPassphraseRejected;
                self.apply(identity, |s| {
                    s.cached_passphrase = None;
                    s.last_error = Some(err.to_string());
                });
                Some(err)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Persistence helpers
    // ------------------------------------------------------------------------

    /// Finds a bundle for unlock when none is in memory.
    async fn locate_bundle(&self, identity: &IdentityId) -> (Option<WrappedBundle>, bool) {
        match self.cache.load_bundle(identity) {
            Ok(Some(bundle)) => return (Some(bundle), false),
            Ok(None) => {}
            Err(e) => {
                warn!(%identity, error = %e, "unreadable cached bundle, discarding");
                self.forget_cached_bundle(identity);
            }
        }

        match self.remote.fetch_bundle(identity).await {
            Ok(remote) => {
                let status = remote.status();
                self.apply(identity, |s| {
                    if s.bundle.is_none() && !s.pending_upload {
                        s.remote_status = status;
                    }
                });
                let from_remote = remote.bundle.is_some();
                (remote.bundle, from_remote)
            }
            Err(e) => {
                warn!(%identity, error = %e, "bundle fetch during unlock failed");
                (None, false)
            }
        }
    }

    /// Uploads `bundle`, retrying with exponential backoff.
    async fn push_remote(&self, identity: &IdentityId, bundle: &WrappedBundle) -> VaultResult<()> {
        let attempts = self.config.remote_write_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.remote.store_bundle(identity, Some(bundle)).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    let delay = self.config.backoff_for(attempt);
                    warn!(%identity, attempt, error = %e, ?delay, "bundle upload failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn cache_bundle(&self, identity: &IdentityId, bundle: &WrappedBundle) {
        if let Err(e) = self.cache.store_bundle(identity, bundle) {
            warn!(%identity, error = %e, "failed to cache vault bundle");
        }
    }

    fn forget_cached_bundle(&self, identity: &IdentityId) {
        if let Err(e) = self.cache.remove_bundle(identity) {
            warn!(%identity, error = %e, "failed to remove cached vault bundle");
        }
    }

    fn remember_passphrase(&self, identity: &IdentityId, passphrase: &str) {
        if let Err(e) = self.cache.store_passphrase(identity, passphrase) {
            warn!(%identity, error = %e, "failed to remember passphrase");
        }
    }

    fn forget_cached_passphrase(&self, identity: &IdentityId) {
        if let Err(e) = self.cache.remove_passphrase(identity) {
            warn!(%identity, error = %e, "failed to forget remembered passphrase");
        }
    }
}

// PBKDF2 runs for tens of milliseconds; keep it off the async workers.

async fn wrap_off_thread(key: DataKey, passphrase: &str) -> VaultResult<WrappedBundle> {
    let passphrase = Zeroizing::new(passphrase.to_string());
    tokio::task::spawn_blocking(move || wrap_data_key(&key, &passphrase))
        .await
        .map_err(|e| VaultError::Task(e.to_string()))?
        .map_err(VaultError::from)
}

async fn unwrap_off_thread(
    bundle: WrappedBundle,
    passphrase: Zeroizing<String>,
) -> VaultResult<DataKey> {
    tokio::task::spawn_blocking(move || unwrap_data_key(&bundle, &passphrase))
        .await
        .map_err(|e| VaultError::Task(e.to_string()))?
        .map_err(VaultError::from)
}
