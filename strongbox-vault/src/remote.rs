//! Remote vault store port, plus an in-memory implementation.

use crate::error::{VaultError, VaultResult};
use crate::state::{IdentityId, RemoteStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use strongbox_crypto::WrappedBundle;

/// Result of a bundle read.
///
/// `has_vault` may be true with no bundle when the server knows a vault
/// exists but did not return its contents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBundle {
    pub bundle: Option<WrappedBundle>,
    pub has_vault: bool,
}

impl RemoteBundle {
    pub fn present(bundle: WrappedBundle) -> Self {
        Self {
            bundle: Some(bundle),
            has_vault: true,
        }
    }

    pub fn absent() -> Self {
        Self::default()
    }

    pub fn status(&self) -> RemoteStatus {
        if self.bundle.is_some() || self.has_vault {
            RemoteStatus::Present
        } else {
            RemoteStatus::Absent
        }
    }
}

/// Authoritative per-identity bundle storage.
#[async_trait]
pub trait RemoteVault: Send + Sync {
    async fn fetch_bundle(&self, identity: &IdentityId) -> VaultResult<RemoteBundle>;

    /// Lightweight existence check, used when a bundle read fails.
    async fn fetch_status(&self, identity: &IdentityId) -> VaultResult<RemoteStatus>;

    /// Stores the bundle, or deletes it when `bundle` is `None`.
    async fn store_bundle(
        &self,
        identity: &IdentityId,
        bundle: Option<&WrappedBundle>,
    ) -> VaultResult<()>;
}

/// In-memory [`RemoteVault`] with failure injection and call counters.
///
/// Useful for hosts running without a backend and for exercising the
/// store's fallback paths.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    bundles: Mutex<HashMap<IdentityId, WrappedBundle>>,
    fail_bundle_fetch: AtomicBool,
    fail_status_fetch: AtomicBool,
    failing_writes: AtomicU32,
    latency_ms: AtomicU64,
    bundle_fetches: AtomicUsize,
    status_fetches: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bundle(self, identity: impl Into<IdentityId>, bundle: WrappedBundle) -> Self {
        self.put(identity, bundle);
        self
    }

    pub fn put(&self, identity: impl Into<IdentityId>, bundle: WrappedBundle) {
        self.bundles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.into(), bundle);
    }

    pub fn bundle_for(&self, identity: &IdentityId) -> Option<WrappedBundle> {
        self.bundles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }

    /// Makes both reads fail, as if the backend were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.fail_bundle_fetch.store(offline, Ordering::SeqCst);
        self.fail_status_fetch.store(offline, Ordering::SeqCst);
    }

    pub fn fail_bundle_fetch(&self, fail: bool) {
        self.fail_bundle_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status_fetch(&self, fail: bool) {
        self.fail_status_fetch.store(fail, Ordering::SeqCst);
    }

    /// Fails the next `count` writes. `u32::MAX` fails every write.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    pub fn bundle_fetches(&self) -> usize {
        self.bundle_fetches.load(Ordering::SeqCst)
    }

    pub fn status_fetches(&self) -> usize {
        self.status_fetches.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn take_write_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[async_trait]
impl RemoteVault for MemoryRemote {
    async fn fetch_bundle(&self, identity: &IdentityId) -> VaultResult<RemoteBundle> {
        self.bundle_fetches.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_bundle_fetch.load(Ordering::SeqCst) {
            return Err(VaultError::Remote("bundle fetch unavailable".into()));
        }
        Ok(match self.bundle_for(identity) {
            Some(bundle) => RemoteBundle::present(bundle),
            None => RemoteBundle::absent(),
        })
    }

    async fn fetch_status(&self, identity: &IdentityId) -> VaultResult<RemoteStatus> {
        self.status_fetches.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_status_fetch.load(Ordering::SeqCst) {
            return Err(VaultError::Remote("status fetch unavailable".into()));
        }
        Ok(if self.bundle_for(identity).is_some() {
            RemoteStatus::Present
        } else {
            RemoteStatus::Absent
        })
    }

    async fn store_bundle(
        &self,
        identity: &IdentityId,
        bundle: Option<&WrappedBundle>,
    ) -> VaultResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.take_write_failure() {
            return Err(VaultError::Remote("bundle write rejected".into()));
        }
        let mut bundles = self.bundles.lock().unwrap_or_else(PoisonError::into_inner);
        match bundle {
            Some(bundle) => {
                bundles.insert(identity.clone(), bundle.clone());
            }
            None => {
                bundles.remove(identity);
            }
        }
        Ok(())
    }
}
