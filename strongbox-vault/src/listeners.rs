//! Subscriber registry for store snapshots.

use crate::state::VaultSnapshot;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;

/// Handle returned by [`VaultStore::subscribe`](crate::VaultStore::subscribe).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&VaultSnapshot) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Listener)>>,
}

impl Listeners {
    pub fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Calls every listener with `snapshot`.
    ///
    /// Runs outside the registry lock so listeners may (un)subscribe. A
    /// panicking listener is logged and skipped.
    pub fn notify(&self, snapshot: &VaultSnapshot) {
        let entries: Vec<(ListenerId, Listener)> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, listener) in entries {
            if catch_unwind(AssertUnwindSafe(|| listener(snapshot))).is_err() {
                error!(listener = id.0, "vault listener panicked");
            }
        }
    }
}
