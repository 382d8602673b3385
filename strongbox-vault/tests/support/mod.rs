//! Shared fixtures for vault store integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use strongbox_crypto::{DataKey, WrappedBundle, generate_data_key, wrap_data_key};
use strongbox_vault::{
    IdentityId, LocalCache, MemoryCache, MemoryRemote, SessionIdentity, VaultConfig, VaultStore,
};

/// Fast retries so failure-path tests finish quickly.
pub fn test_config() -> VaultConfig {
    VaultConfig {
        remote_write_attempts: 3,
        remote_retry_backoff_ms: 1,
        revalidate_cache_hits: false,
    }
}

/// A store wired to in-memory collaborators that tests can poke at.
pub struct Harness {
    pub identity: Arc<SessionIdentity>,
    pub remote: Arc<MemoryRemote>,
    pub cache: Arc<MemoryCache>,
    pub store: VaultStore,
}

impl Harness {
    pub fn signed_in(user: &str) -> Self {
        Self::build(
            test_config(),
            Arc::new(SessionIdentity::signed_in(user)),
            Arc::new(MemoryRemote::new()),
            Arc::new(MemoryCache::new()),
        )
    }

    pub fn signed_out() -> Self {
        Self::build(
            test_config(),
            Arc::new(SessionIdentity::new()),
            Arc::new(MemoryRemote::new()),
            Arc::new(MemoryCache::new()),
        )
    }

    pub fn build(
        config: VaultConfig,
        identity: Arc<SessionIdentity>,
        remote: Arc<MemoryRemote>,
        cache: Arc<MemoryCache>,
    ) -> Self {
        let store = VaultStore::new(config, identity.clone(), remote.clone(), cache.clone());
        Self {
            identity,
            remote,
            cache,
            store,
        }
    }

    /// A second store (e.g. another app launch) sharing this harness's
    /// collaborators.
    pub fn relaunch(&self) -> Self {
        Self::build(
            test_config(),
            self.identity.clone(),
            self.remote.clone(),
            self.cache.clone(),
        )
    }

    /// Like [`relaunch`](Self::relaunch) but with an empty device cache.
    pub fn new_device(&self) -> Self {
        Self::build(
            test_config(),
            self.identity.clone(),
            self.remote.clone(),
            Arc::new(MemoryCache::new()),
        )
    }

    pub fn cached_bundle(&self, user: &str) -> Option<WrappedBundle> {
        self.cache.load_bundle(&IdentityId::from(user)).unwrap()
    }

    pub fn cached_passphrase(&self, user: &str) -> Option<String> {
        self.cache
            .load_passphrase(&IdentityId::from(user))
            .unwrap()
            .map(|p| p.to_string())
    }
}

pub fn wrapped(passphrase: &str) -> (DataKey, WrappedBundle) {
    let key = generate_data_key();
    let bundle = wrap_data_key(&key, passphrase).unwrap();
    (key, bundle)
}
