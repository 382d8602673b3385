//! Wire types for the Strongbox API.

use serde::{Deserialize, Serialize};
use strongbox_crypto::WrappedBundle;
use strongbox_vault::{IdentityId, RemoteBundle, RemoteStatus};

/// Session tokens returned by login, suitable for persisting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: i64,
    pub email: String,
}

impl AuthTokens {
    pub fn identity(&self) -> IdentityId {
        user_identity(self.user_id)
    }
}

pub(crate) fn user_identity(user_id: i64) -> IdentityId {
    IdentityId::new(user_id.to_string())
}

/// `GET /api/vault/bundle` response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleResponse {
    #[serde(default)]
    pub bundle: Option<WrappedBundle>,
    #[serde(default)]
    pub has_vault: bool,
}

impl From<BundleResponse> for RemoteBundle {
    fn from(resp: BundleResponse) -> Self {
        RemoteBundle {
            bundle: resp.bundle,
            has_vault: resp.has_vault,
        }
    }
}

/// `PUT /api/vault/bundle` request body.
#[derive(Debug, Serialize)]
pub struct StoreBundleRequest<'a> {
    pub bundle: &'a WrappedBundle,
}

/// `GET /api/vault/status` response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: RemoteStatus,
}
