mod support;

use futures::future::join_all;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use strongbox_crypto::{WrappedBundle, decrypt_text, encrypt_text};
use strongbox_vault::{
    IdentityId, LocalCache, MemoryCache, MemoryRemote, RemoteStatus, SessionIdentity, VaultConfig,
    VaultError, VaultResult, VaultStore,
};
use support::{Harness, test_config, wrapped};
use zeroize::Zeroizing;

// --- Initialization ---

#[tokio::test]
async fn signed_out_initializes_without_remote_calls() {
    let h = Harness::signed_out();
    h.store.ensure_initialized(false).await.unwrap();

    let snap = h.store.snapshot();
    assert_eq!(snap.identity, None);
    assert!(snap.initialized);
    assert_eq!(h.remote.bundle_fetches(), 0);
}

#[tokio::test]
async fn new_account_resolves_to_absent() {
    let h = Harness::signed_in("u1");
    h.store.ensure_initialized(false).await.unwrap();

    assert!(h.store.initialized());
    assert!(!h.store.loading());
    assert!(!h.store.has_bundle());
    assert_eq!(h.store.remote_status(), RemoteStatus::Absent);
    assert_eq!(h.store.vault_error(), None);
}

#[tokio::test]
async fn remote_bundle_resolves_to_present_and_locked() {
    let h = Harness::signed_in("u1");
    h.remote.put("u1", wrapped("p1").1);

    h.store.ensure_initialized(false).await.unwrap();

    assert!(h.store.has_bundle());
    assert!(!h.store.is_unlocked());
    assert_eq!(h.store.remote_status(), RemoteStatus::Present);
}

#[tokio::test]
async fn cache_hit_skips_remote() {
    let h = Harness::signed_in("u1");
    h.cache
        .store_bundle(&IdentityId::from("u1"), &wrapped("p1").1)
        .unwrap();

    h.store.ensure_initialized(false).await.unwrap();

    assert!(h.store.has_bundle());
    assert_eq!(h.remote.bundle_fetches(), 0);
}

#[tokio::test]
async fn initialized_store_does_not_refetch_unless_forced() {
    let h = Harness::signed_in("u1");
    h.store.ensure_initialized(false).await.unwrap();
    h.store.ensure_initialized(false).await.unwrap();
    assert_eq!(h.remote.bundle_fetches(), 1);

    h.store.ensure_initialized(true).await.unwrap();
    assert_eq!(h.remote.bundle_fetches(), 2);
}

#[tokio::test]
async fn concurrent_initialization_fetches_once() {
    let h = Harness::signed_in("u1");
    h.remote.set_latency(Duration::from_millis(50));

    let results = join_all((0..5).map(|_| h.store.ensure_initialized(false))).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(h.remote.bundle_fetches(), 1);
    assert_eq!(h.remote.status_fetches(), 0);
}

#[tokio::test]
async fn forced_call_joins_running_initialization() {
    let h = Harness::signed_in("u1");
    h.remote.set_latency(Duration::from_millis(50));

    let (a, b) = tokio::join!(
        h.store.ensure_initialized(false),
        h.store.ensure_initialized(true)
    );

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(h.remote.bundle_fetches(), 1);
}

// --- Remote Failure Fallbacks ---

#[tokio::test]
async fn bundle_fetch_failure_falls_back_to_status() {
    let h = Harness::signed_in("u1");
    h.remote.put("u1", wrapped("p1").1);
    h.remote.fail_bundle_fetch(true);

    h.store.ensure_initialized(false).await.unwrap();

    assert_eq!(h.remote.status_fetches(), 1);
    assert_eq!(h.store.remote_status(), RemoteStatus::Present);
    assert!(h.store.has_bundle());
}

#[tokio::test]
async fn status_fallback_can_confirm_absence() {
    let h = Harness::signed_in("u1");
    h.remote.fail_bundle_fetch(true);

    h.store.ensure_initialized(false).await.unwrap();

    assert_eq!(h.store.remote_status(), RemoteStatus::Absent);
    assert!(!h.store.has_bundle());
}

#[tokio::test]
async fn total_remote_failure_leaves_status_unknown() {
    let h = Harness::signed_in("u1");
    h.remote.set_offline(true);

    let err = h.store.ensure_initialized(false).await.unwrap_err();

    assert_eq!(err, VaultError::StatusUnknown);
    assert!(err.is_retryable());
    assert!(h.store.initialized());
    assert_eq!(h.store.remote_status(), RemoteStatus::Unknown);
    // Unknown must never look like "no vault".
    assert!(h.store.has_bundle());
    assert_eq!(
        h.store.vault_error(),
        Some(VaultError::StatusUnknown.to_string())
    );
}

#[tokio::test]
async fn forced_retry_recovers_from_unknown() {
    let h = Harness::signed_in("u1");
    h.remote.set_offline(true);
    assert!(h.store.ensure_initialized(false).await.is_err());

    h.remote.set_offline(false);
    h.store.ensure_initialized(true).await.unwrap();

    assert_eq!(h.store.remote_status(), RemoteStatus::Absent);
    assert_eq!(h.store.vault_error(), None);
}

// --- Create ---

#[tokio::test]
async fn create_unlocks_and_uploads() {
    let h = Harness::signed_in("u1");
    h.store.ensure_initialized(false).await.unwrap();

    h.store.create_with_passphrase("p1", true).await.unwrap();

    assert!(h.store.is_unlocked());
    assert!(h.store.has_bundle());
    assert_eq!(h.store.remote_status(), RemoteStatus::Present);
    let remote = h.remote.bundle_for(&IdentityId::from("u1")).unwrap();
    assert_eq!(h.cached_bundle("u1"), Some(remote));
}

#[tokio::test]
async fn create_without_remember_device_skips_cache() {
    let h = Harness::signed_in("u1");
    h.store.create_with_passphrase("p1", false).await.unwrap();

    assert!(h.store.is_unlocked());
    assert_eq!(h.cached_bundle("u1"), None);
    assert!(h.remote.bundle_for(&IdentityId::from("u1")).is_some());
}

#[tokio::test]
async fn create_refused_when_vault_exists() {
    let h = Harness::signed_in("u1");
    let (_, existing) = wrapped("p1");
    h.remote.put("u1", existing.clone());

    let err = h.store.create_with_passphrase("p2", true).await.unwrap_err();

    assert_eq!(err, VaultError::AlreadyExists);
    assert_eq!(h.remote.writes(), 0);
    assert_eq!(h.remote.bundle_for(&IdentityId::from("u1")), Some(existing));
    assert!(!h.store.is_unlocked());
}

#[tokio::test]
async fn create_refused_while_status_unknown() {
    let h = Harness::signed_in("u1");
    h.remote.set_offline(true);
    let _ = h.store.ensure_initialized(false).await;

    let err = h.store.create_with_passphrase("p1", true).await.unwrap_err();

    assert_eq!(err, VaultError::StatusUnknown);
    assert_eq!(h.remote.writes(), 0);
    assert!(!h.store.is_unlocked());
}

#[tokio::test]
async fn create_beaten_by_another_device_records_error() {
    let h = Harness::signed_in("u1");
    h.store.ensure_initialized(false).await.unwrap();
    let (_, existing) = wrapped("other");
    h.remote.put("u1", existing.clone());

    let store = h.store.clone();
    let create = tokio::spawn(async move { store.create_with_passphrase("p1", false).await });
    // Let the create reach its key wrapping before the refresh lands.
    tokio::task::yield_now().await;
    h.store.ensure_initialized(true).await.unwrap();

    let err = create.await.unwrap().unwrap_err();

    assert_eq!(err, VaultError::AlreadyExists);
    assert_eq!(h.store.vault_error(), Some(VaultError::AlreadyExists.to_string()));
    assert_eq!(h.remote.writes(), 0);
    assert_eq!(h.remote.bundle_for(&IdentityId::from("u1")), Some(existing));
    assert!(!h.store.is_unlocked());
}

#[tokio::test]
async fn create_rejects_empty_passphrase() {
    let h = Harness::signed_in("u1");
    let err = h.store.create_with_passphrase("", true).await.unwrap_err();
    assert_eq!(err, VaultError::EmptyPassphrase);
    assert_eq!(h.remote.writes(), 0);
}

#[tokio::test]
async fn create_requires_identity() {
    let h = Harness::signed_out();
    let err = h.store.create_with_passphrase("p1", true).await.unwrap_err();
    assert_eq!(err, VaultError::NoIdentity);
}

#[tokio::test]
async fn transient_upload_failure_is_retried() {
    let h = Harness::signed_in("u1");
    h.remote.fail_next_writes(2);

    h.store.create_with_passphrase("p1", false).await.unwrap();

    assert_eq!(h.remote.writes(), 3);
    assert!(h.remote.bundle_for(&IdentityId::from("u1")).is_some());
    assert!(!h.store.snapshot().pending_upload);
}

#[tokio::test]
async fn failed_upload_keeps_vault_usable_and_local() {
    let h = Harness::signed_in("u1");
    h.remote.fail_next_writes(u32::MAX);

    h.store.create_with_passphrase("p1", false).await.unwrap();

    assert!(h.store.is_unlocked());
    assert_eq!(h.remote.writes(), 3);
    assert!(h.remote.bundle_for(&IdentityId::from("u1")).is_none());
    assert!(h.store.snapshot().pending_upload);
    // Kept locally even without remember-device: it is the only copy.
    assert!(h.cached_bundle("u1").is_some());

    h.remote.fail_next_writes(0);
    assert!(h.store.flush_pending_upload().await.unwrap());

    assert!(!h.store.snapshot().pending_upload);
    assert_eq!(
        h.remote.bundle_for(&IdentityId::from("u1")),
        h.cached_bundle("u1")
    );
    assert!(!h.store.flush_pending_upload().await.unwrap());
}

#[tokio::test]
async fn pending_upload_survives_forced_reinitialization() {
    let h = Harness::signed_in("u1");
    h.remote.fail_next_writes(u32::MAX);
    h.store.create_with_passphrase("p1", true).await.unwrap();

    h.store.ensure_initialized(true).await.unwrap();

    assert!(h.store.has_bundle());
    assert!(h.store.is_unlocked());
    assert!(h.store.snapshot().pending_upload);
}

// --- Unlock ---

#[tokio::test]
async fn key_survives_a_new_session() {
    let h = Harness::signed_in("u1");
    h.store.create_with_passphrase("p1", false).await.unwrap();
    let sealed = encrypt_text(&h.store.data_key().unwrap(), "journal entry").unwrap();

    let later = h.new_device();
    later.store.ensure_initialized(false).await.unwrap();
    assert!(later.store.has_bundle());
    assert!(!later.store.is_unlocked());

    later.store.unlock_with_passphrase("p1", false).await.unwrap();

    let key = later.store.data_key().unwrap();
    assert_eq!(decrypt_text(&key, &sealed).unwrap(), "journal entry");
}

#[tokio::test]
async fn wrong_passphrase_reports_uniform_mismatch() {
    let h = Harness::signed_in("u1");
    h.remote.put("u1", wrapped("p1").1);
    h.store.ensure_initialized(false).await.unwrap();

    let err = h.store.unlock_with_passphrase("p2", true).await.unwrap_err();

    assert_eq!(err, VaultError::PassphraseMismatch);
    assert_eq!(h.store.vault_error().as_deref(), Some("passphrase does not match"));
    assert!(h.store.data_key().is_none());
    assert!(h.store.has_bundle());
    assert_eq!(h.cached_passphrase("u1"), None);
}

#[tokio::test]
async fn corrupted_bundle_reports_same_mismatch() {
    let h = Harness::signed_in("u1");
    let (_, mut bundle) = wrapped("p1");
    bundle.version = 7;
    h.remote.put("u1", bundle);

    let err = h.store.unlock_with_passphrase("p1", false).await.unwrap_err();

    assert_eq!(err, VaultError::PassphraseMismatch);
}

#[tokio::test]
async fn successful_unlock_clears_previous_error() {
    let h = Harness::signed_in("u1");
    h.remote.put("u1", wrapped("p1").1);

    assert!(h.store.unlock_with_passphrase("nope", false).await.is_err());
    h.store.unlock_with_passphrase("p1", false).await.unwrap();

    assert!(h.store.is_unlocked());
    assert_eq!(h.store.vault_error(), None);
}

#[tokio::test]
async fn unlock_without_any_vault_reports_no_vault() {
    let h = Harness::signed_in("u1");
    h.store.ensure_initialized(false).await.unwrap();

    let err = h.store.unlock_with_passphrase("p1", false).await.unwrap_err();

    assert_eq!(err, VaultError::NoVault);
}

#[tokio::test]
async fn unlock_with_unreachable_bundle_reports_unavailable() {
    let h = Harness::signed_in("u1");
    h.remote.put("u1", wrapped("p1").1);
    h.remote.fail_bundle_fetch(true);
    h.store.ensure_initialized(false).await.unwrap();

    let err = h.store.unlock_with_passphrase("p1", false).await.unwrap_err();

    assert_eq!(err, VaultError::VaultUnavailable);
    assert_ne!(err.to_string(), VaultError::NoVault.to_string());

    h.remote.fail_bundle_fetch(false);
    h.store.unlock_with_passphrase("p1", false).await.unwrap();
    assert!(h.store.is_unlocked());
}

#[tokio::test]
async fn remote_bundle_cached_only_after_verified_unlock() {
    let h = Harness::signed_in("u1");
    let (_, bundle) = wrapped("p1");
    h.remote.put("u1", bundle.clone());

    assert!(h.store.unlock_with_passphrase("bad", false).await.is_err());
    assert_eq!(h.cached_bundle("u1"), None);

    h.store.unlock_with_passphrase("p1", false).await.unwrap();
    assert_eq!(h.cached_bundle("u1"), Some(bundle));
}

// --- Remembered Passphrase ---

#[tokio::test]
async fn remembered_passphrase_auto_unlocks_next_launch() {
    let h = Harness::signed_in("u1");
    h.store.create_with_passphrase("p1", true).await.unwrap();
    h.store.lock(false).await.unwrap();
    h.store.unlock_with_passphrase("p1", true).await.unwrap();
    assert_eq!(h.cached_passphrase("u1").as_deref(), Some("p1"));
    let fetches = h.remote.bundle_fetches();

    let next = h.relaunch();
    next.store.ensure_initialized(false).await.unwrap();

    assert!(next.store.is_unlocked());
    assert_eq!(next.remote.bundle_fetches(), fetches);
}

#[tokio::test]
async fn unlock_without_remember_forgets_passphrase() {
    let h = Harness::signed_in("u1");
    h.store.create_with_passphrase("p1", true).await.unwrap();
    h.store.unlock_with_passphrase("p1", true).await.unwrap();
    h.store.unlock_with_passphrase("p1", false).await.unwrap();

    assert_eq!(h.cached_passphrase("u1"), None);
}

#[tokio::test]
async fn rejected_remembered_passphrase_is_cleared() {
    let h = Harness::signed_in("u1");
    h.remote.put("u1", wrapped("p1").1);
    h.cache
        .store_passphrase(&IdentityId::from("u1"), "stale")
        .unwrap();

    let err = h.store.ensure_initialized(false).await.unwrap_err();

    assert_eq!(err, VaultError::CachedPassphraseRejected);
    assert!(!h.store.is_unlocked());
    assert!(h.store.initialized());
    assert_eq!(h.cached_passphrase("u1"), None);
    assert_eq!(
        h.store.vault_error(),
        Some(VaultError::CachedPassphraseRejected.to_string())
    );

    // Not retried automatically: the next pass has nothing to try.
    h.store.ensure_initialized(true).await.unwrap();
    assert_eq!(h.store.vault_error(), None);
}

#[tokio::test]
async fn auto_unlock_from_remote_caches_verified_bundle() {
    let h = Harness::signed_in("u1");
    let (_, bundle) = wrapped("p1");
    h.remote.put("u1", bundle.clone());
    h.cache
        .store_passphrase(&IdentityId::from("u1"), "p1")
        .unwrap();

    h.store.ensure_initialized(false).await.unwrap();

    assert!(h.store.is_unlocked());
    assert_eq!(h.cached_bundle("u1"), Some(bundle));
}

// --- Lock ---

#[tokio::test]
async fn lock_keeps_bundle_and_cache() {
    let h = Harness::signed_in("u1");
    h.store.create_with_passphrase("p1", true).await.unwrap();

    h.store.lock(false).await.unwrap();

    assert!(!h.store.is_unlocked());
    assert!(h.store.has_bundle());
    assert!(h.cached_bundle("u1").is_some());
}

#[tokio::test]
async fn wipe_only_touches_current_identity_locally() {
    let h = Harness::signed_in("u1");
    let other = IdentityId::from("u2");
    let (_, other_bundle) = wrapped("q");
    h.cache.store_bundle(&other, &other_bundle).unwrap();
    h.cache.store_passphrase(&other, "q").unwrap();

    h.store.create_with_passphrase("p1", true).await.unwrap();
    h.store.unlock_with_passphrase("p1", true).await.unwrap();

    h.store.lock(true).await.unwrap();

    assert!(!h.store.is_unlocked());
    assert_eq!(h.cached_bundle("u1"), None);
    assert_eq!(h.cached_passphrase("u1"), None);
    assert_eq!(h.cached_bundle("u2"), Some(other_bundle));
    assert_eq!(h.cached_passphrase("u2").as_deref(), Some("q"));
    assert!(h.remote.bundle_for(&IdentityId::from("u1")).is_some());

    h.store.unlock_with_passphrase("p1", false).await.unwrap();
    assert!(h.store.is_unlocked());
}

#[tokio::test]
async fn lock_during_silent_unlock_stays_locked() {
    let h = Harness::signed_in("u1");
    h.store.create_with_passphrase("p1", true).await.unwrap();
    h.store.unlock_with_passphrase("p1", true).await.unwrap();
    let later = h.relaunch();

    let mut rx = later.store.watch();
    let store = later.store.clone();
    let init = tokio::spawn(async move { store.ensure_initialized(false).await });

    // The cached bundle is installed and the remembered passphrase is being
    // tried.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let unlocking = {
                let snap = rx.borrow_and_update();
                snap.loading && snap.remote_status == RemoteStatus::Present
            };
            if unlocking {
                break;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    later.store.lock(true).await.unwrap();
    init.await.unwrap().unwrap();

    assert!(!later.store.is_unlocked());
    assert!(later.store.has_bundle());
    assert!(later.store.initialized());
    assert_eq!(later.cached_bundle("u1"), None);
    assert_eq!(later.cached_passphrase("u1"), None);
}

/// Device cache that cannot delete bundles.
struct StuckBundleCache(MemoryCache);

impl LocalCache for StuckBundleCache {
    fn load_bundle(&self, identity: &IdentityId) -> VaultResult<Option<WrappedBundle>> {
        self.0.load_bundle(identity)
    }

    fn store_bundle(&self, identity: &IdentityId, bundle: &WrappedBundle) -> VaultResult<()> {
        self.0.store_bundle(identity, bundle)
    }

    fn remove_bundle(&self, _identity: &IdentityId) -> VaultResult<()> {
        Err(VaultError::Storage("bundle row is locked".into()))
    }

    fn load_passphrase(&self, identity: &IdentityId) -> VaultResult<Option<Zeroizing<String>>> {
        self.0.load_passphrase(identity)
    }

    fn store_passphrase(&self, identity: &IdentityId, passphrase: &str) -> VaultResult<()> {
        self.0.store_passphrase(identity, passphrase)
    }

    fn remove_passphrase(&self, identity: &IdentityId) -> VaultResult<()> {
        self.0.remove_passphrase(identity)
    }
}

#[tokio::test]
async fn wipe_forgets_passphrase_even_if_bundle_delete_fails() {
    let cache = Arc::new(StuckBundleCache(MemoryCache::new()));
    let store = VaultStore::new(
        test_config(),
        Arc::new(SessionIdentity::signed_in("u1")),
        Arc::new(MemoryRemote::new()),
        cache.clone(),
    );
    store.create_with_passphrase("p1", true).await.unwrap();
    store.unlock_with_passphrase("p1", true).await.unwrap();

    let err = store.lock(true).await.unwrap_err();

    assert_eq!(err, VaultError::Storage("bundle row is locked".into()));
    assert!(!store.is_unlocked());
    assert!(cache.load_passphrase(&IdentityId::from("u1")).unwrap().is_none());
}

#[tokio::test]
async fn lock_while_signed_out_is_a_no_op() {
    let h = Harness::signed_out();
    h.store.lock(true).await.unwrap();
    assert!(!h.store.is_unlocked());
}

// --- Identity Changes ---

#[tokio::test]
async fn switching_identity_drops_previous_state() {
    let h = Harness::signed_in("u1");
    h.store.create_with_passphrase("p1", false).await.unwrap();
    assert!(h.store.is_unlocked());

    h.identity.sign_in("u2");

    assert_eq!(h.store.identity(), Some(IdentityId::from("u2")));
    assert!(h.store.data_key().is_none());
    assert!(!h.store.initialized());

    h.store.ensure_initialized(false).await.unwrap();
    assert!(!h.store.has_bundle());
}

#[tokio::test]
async fn stale_initialization_result_is_discarded() {
    let identity = Arc::new(SessionIdentity::signed_in("a"));
    let remote = Arc::new(MemoryRemote::new().with_bundle("a", wrapped("p1").1));
    remote.set_latency(Duration::from_millis(100));
    let h = Harness::build(test_config(), identity, remote, Arc::new(MemoryCache::new()));

    let store = h.store.clone();
    let first = tokio::spawn(async move { store.ensure_initialized(false).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    h.identity.sign_in("b");
    h.store.ensure_initialized(false).await.unwrap();
    first.await.unwrap().unwrap();

    let snap = h.store.snapshot();
    assert_eq!(snap.identity, Some(IdentityId::from("b")));
    assert!(!snap.has_bundle);
    assert_eq!(snap.remote_status, RemoteStatus::Absent);
    assert!(snap.initialized);
}

#[tokio::test]
async fn identity_listener_reconciles_on_sign_in() {
    let h = Harness::signed_out();
    h.remote.put("u1", wrapped("p1").1);
    let mut rx = h.store.watch();
    let listener = h.store.spawn_identity_listener();

    h.identity.sign_in("u1");

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let ready = {
                let snap = rx.borrow_and_update();
                snap.initialized && snap.identity == Some(IdentityId::from("u1"))
            };
            if ready {
                break;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    assert!(h.store.has_bundle());
    listener.abort();
}

#[tokio::test]
async fn wipe_after_unobserved_switch_targets_signed_in_identity() {
    let h = Harness::signed_in("a");
    h.store.create_with_passphrase("pa", true).await.unwrap();
    h.store.unlock_with_passphrase("pa", true).await.unwrap();

    h.identity.sign_in("b");
    h.store.create_with_passphrase("pb", true).await.unwrap();
    h.store.unlock_with_passphrase("pb", true).await.unwrap();

    // No store call between the switch and the wipe.
    h.identity.sign_in("a");
    h.store.lock(true).await.unwrap();

    assert_eq!(h.store.identity(), Some(IdentityId::from("a")));
    assert_eq!(h.cached_bundle("a"), None);
    assert_eq!(h.cached_passphrase("a"), None);
    assert!(h.cached_bundle("b").is_some());
    assert_eq!(h.cached_passphrase("b").as_deref(), Some("pb"));
}

// --- Revalidation ---

fn revalidating() -> VaultConfig {
    VaultConfig {
        revalidate_cache_hits: true,
        ..test_config()
    }
}

#[tokio::test]
async fn revalidation_discards_cache_without_remote_vault() {
    let h = Harness::build(
        revalidating(),
        Arc::new(SessionIdentity::signed_in("u1")),
        Arc::new(MemoryRemote::new()),
        Arc::new(MemoryCache::new()),
    );
    let id = IdentityId::from("u1");
    h.cache.store_bundle(&id, &wrapped("p1").1).unwrap();
    h.cache.store_passphrase(&id, "p1").unwrap();

    h.store.ensure_initialized(false).await.unwrap();

    assert!(!h.store.has_bundle());
    assert_eq!(h.store.remote_status(), RemoteStatus::Absent);
    assert_eq!(h.cached_bundle("u1"), None);
    assert_eq!(h.cached_passphrase("u1"), None);
}

#[tokio::test]
async fn revalidation_prefers_newer_remote_bundle() {
    let h = Harness::build(
        revalidating(),
        Arc::new(SessionIdentity::signed_in("u1")),
        Arc::new(MemoryRemote::new()),
        Arc::new(MemoryCache::new()),
    );
    let (_, stale) = wrapped("old");
    let (_, current) = wrapped("new");
    h.cache.store_bundle(&IdentityId::from("u1"), &stale).unwrap();
    h.remote.put("u1", current.clone());

    h.store.ensure_initialized(false).await.unwrap();
    h.store.unlock_with_passphrase("new", false).await.unwrap();

    assert!(h.store.is_unlocked());
    assert_eq!(h.cached_bundle("u1"), Some(current));
}

#[tokio::test]
async fn revalidation_trusts_cache_when_offline() {
    let h = Harness::build(
        revalidating(),
        Arc::new(SessionIdentity::signed_in("u1")),
        Arc::new(MemoryRemote::new()),
        Arc::new(MemoryCache::new()),
    );
    h.cache
        .store_bundle(&IdentityId::from("u1"), &wrapped("p1").1)
        .unwrap();
    h.remote.set_offline(true);

    h.store.ensure_initialized(false).await.unwrap();

    assert!(h.store.has_bundle());
    assert_eq!(h.store.remote_status(), RemoteStatus::Present);
}

// --- Notifications ---

#[tokio::test]
async fn listeners_see_every_change_despite_panicking_peer() {
    let h = Harness::signed_in("u1");
    let seen = Arc::new(AtomicUsize::new(0));
    let unlocked_seen = Arc::new(AtomicUsize::new(0));

    h.store.subscribe(|_| panic!("listener bug"));
    let (count, unlocked) = (seen.clone(), unlocked_seen.clone());
    h.store.subscribe(move |snap| {
        count.fetch_add(1, Ordering::SeqCst);
        if snap.unlocked {
            unlocked.fetch_add(1, Ordering::SeqCst);
        }
    });

    h.store.create_with_passphrase("p1", false).await.unwrap();

    assert!(seen.load(Ordering::SeqCst) >= 2);
    assert!(unlocked_seen.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn unsubscribed_listener_stops_receiving() {
    let h = Harness::signed_in("u1");
    let seen = Arc::new(AtomicUsize::new(0));
    let count = seen.clone();
    let id = h.store.subscribe(move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    });

    assert!(h.store.unsubscribe(id));
    h.store.ensure_initialized(false).await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn watch_channel_tracks_latest_snapshot() {
    let h = Harness::signed_in("u1");
    let rx = h.store.watch();

    h.store.create_with_passphrase("p1", false).await.unwrap();

    let snap = rx.borrow().clone();
    assert!(snap.unlocked);
    assert!(snap.has_bundle);
    assert_eq!(snap, h.store.snapshot());
}
