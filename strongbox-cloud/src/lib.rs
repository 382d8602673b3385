//! Strongbox API client.
//!
//! [`CloudApiClient`] signs the user in against the control plane and stores
//! the wrapped vault bundle server-side. It plugs into the vault store as
//! both the [`IdentityProvider`](strongbox_vault::IdentityProvider) (the
//! signed-in user) and the [`RemoteVault`](strongbox_vault::RemoteVault).

pub mod api_client;
pub mod config;
pub mod error;
pub mod types;

pub use api_client::CloudApiClient;
pub use config::CloudConfig;
pub use error::{CloudError, CloudResult};
pub use types::*;
