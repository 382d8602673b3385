//! Passphrase-protected vault state for Strongbox.
//!
//! [`VaultStore`] keeps one identity's data key in memory and reconciles it
//! against a [`LocalCache`] and a [`RemoteVault`]. [`VaultGate`] turns store
//! state into a single UI mode and drives the create/unlock forms.
//!
//! The backing services are ports:
//! - [`IdentityProvider`]: who is signed in ([`SessionIdentity`] in-process)
//! - [`RemoteVault`]: authoritative bundle storage ([`MemoryRemote`] in-process)
//! - [`LocalCache`]: device storage ([`DuckDbCache`], [`MemoryCache`])

mod config;
mod error;
mod gate;
mod identity;
mod listeners;
mod local_cache;
mod remote;
mod state;
mod store;

pub use config::VaultConfig;
pub use error::{VaultError, VaultResult};
pub use gate::{GateError, GateMode, GateResult, VaultGate};
pub use identity::{IdentityProvider, SessionIdentity};
pub use listeners::ListenerId;
pub use local_cache::{DuckDbCache, LocalCache, MemoryCache};
pub use remote::{MemoryRemote, RemoteBundle, RemoteVault};
pub use state::{IdentityId, RemoteStatus, VaultSnapshot};
pub use store::VaultStore;

/// Installs a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
