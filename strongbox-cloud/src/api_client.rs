//! HTTP client for the Strongbox control plane API.
//!
//! Handles JWT authentication, token refresh on 401, and the vault bundle
//! endpoints. Uses reqwest with JSON serialization.

use crate::config::CloudConfig;
use crate::error::{CloudError, CloudResult};
use crate::types::*;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strongbox_crypto::WrappedBundle;
use strongbox_vault::{
    IdentityId, IdentityProvider, RemoteBundle, RemoteStatus, RemoteVault, VaultResult,
};
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

/// State shared across API client clones.
struct AuthState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user_id: Option<i64>,
    email: Option<String>,
    /// Monotonically increasing counter bumped on every successful refresh.
    /// Used to detect when a concurrent refresh has already updated tokens.
    refresh_generation: u64,
}

/// HTTP client for the Strongbox cloud control plane.
pub struct CloudApiClient {
    client: Client,
    config: CloudConfig,
    auth: Arc<RwLock<AuthState>>,
    /// Serializes refresh operations so concurrent 401s send one refresh;
    /// the server rotates the refresh token on use.
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
    identity_tx: watch::Sender<Option<IdentityId>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: i64,
    email: String,
}

impl CloudApiClient {
    pub fn new(config: CloudConfig) -> CloudResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CloudError::Config(format!("failed to build HTTP client: {e}")))?;

        let (identity_tx, _rx) = watch::channel(None);
        Ok(Self {
            client,
            config,
            auth: Arc::new(RwLock::new(AuthState {
                access_token: None,
                refresh_token: None,
                user_id: None,
                email: None,
                refresh_generation: 0,
            })),
            refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
            identity_tx,
        })
    }

    /// Sets auth tokens directly (for restoring a saved session).
    pub async fn set_tokens(&self, access_token: String, refresh_token: String, user_id: i64) {
        let mut auth = self.auth.write().await;
        auth.access_token = Some(access_token);
        auth.refresh_token = Some(refresh_token);
        auth.user_id = Some(user_id);
        self.publish_identity(Some(user_id));
    }

    pub async fn is_authenticated(&self) -> bool {
        self.auth.read().await.access_token.is_some()
    }

    pub async fn user_id(&self) -> Option<i64> {
        self.auth.read().await.user_id
    }

    pub async fn logout(&self) {
        let mut auth = self.auth.write().await;
        auth.access_token = None;
        auth.refresh_token = None;
        auth.user_id = None;
        auth.email = None;
        self.publish_identity(None);
    }

    /// Returns current auth tokens for persistence.
    pub async fn get_current_tokens(&self) -> Option<AuthTokens> {
        let auth = self.auth.read().await;
        Some(AuthTokens {
            access_token: auth.access_token.clone()?,
            refresh_token: auth.refresh_token.clone()?,
            user_id: auth.user_id?,
            email: auth.email.clone().unwrap_or_default(),
        })
    }

    /// Emits an identity change only when the user actually changes.
    fn publish_identity(&self, user_id: Option<i64>) {
        let next = user_id.map(user_identity);
        self.identity_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    // ── Auth ──

    pub async fn authenticate(&self, email: &str, password: &str) -> CloudResult<AuthTokens> {
        let resp: TokenResponse = self
            .client
            .post(self.config.url("/api/auth/login"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| CloudError::AuthFailed(e.to_string()))?
            .json()
            .await?;

        let tokens = AuthTokens {
            access_token: resp.access_token.clone(),
            refresh_token: resp.refresh_token.clone(),
            user_id: resp.user.id,
            email: resp.user.email.clone(),
        };

        self.set_tokens(resp.access_token, resp.refresh_token, resp.user.id)
            .await;
        self.auth.write().await.email = Some(resp.user.email);
        info!(user_id = tokens.user_id, "signed in");
        Ok(tokens)
    }

    pub async fn refresh_access_token(&self) -> CloudResult<String> {
        let seen = self.auth.read().await.refresh_generation;
        self.refresh_since(seen).await
    }

    /// Refreshes tokens unless a refresh newer than `seen_generation` has
    /// already completed, in which case its token is returned.
    async fn refresh_since(&self, seen_generation: u64) -> CloudResult<String> {
        let _guard = self.refresh_lock.lock().await;

        {
            let auth = self.auth.read().await;
            if auth.refresh_generation > seen_generation {
                return auth.access_token.clone().ok_or(CloudError::AuthRequired);
            }
        }

        let refresh_token = {
            let auth = self.auth.read().await;
            auth.refresh_token.clone().ok_or(CloudError::AuthRequired)?
        };

        let resp = self
            .client
            .post(self.config.url("/api/auth/refresh"))
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED || resp.status() == StatusCode::FORBIDDEN {
            // Refresh token is expired/revoked; clear stale session
            warn!("refresh token rejected, signing out");
            self.logout().await;
            return Err(CloudError::AuthFailed(
                "token refresh failed: session expired, re-authentication required".to_string(),
            ));
        }

        let resp: TokenResponse = resp
            .error_for_status()
            .map_err(|e| CloudError::AuthFailed(format!("token refresh failed: {e}")))?
            .json()
            .await?;

        let mut auth = self.auth.write().await;
        auth.access_token = Some(resp.access_token.clone());
        auth.refresh_token = Some(resp.refresh_token);
        auth.user_id = Some(resp.user.id);
        auth.email = Some(resp.user.email);
        auth.refresh_generation += 1;
        self.publish_identity(Some(resp.user.id));

        Ok(resp.access_token)
    }

    /// Sends an authenticated request, retrying once on 401 after a token
    /// refresh.
    async fn send_authed<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> CloudResult<reqwest::Response> {
        let url = self.config.url(path);
        let build = |token: &str| {
            let req = self.client.request(method.clone(), &url).bearer_auth(token);
            match body {
                Some(body) => req.json(body),
                None => req,
            }
        };

        // The generation is read with the token so a 401 on a token that
        // another task already refreshed reuses that refresh.
        let (token, generation) = self.get_token().await?;
        let resp = build(&token).send().await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            debug!("401 on {method} {path}, refreshing token");
            let new_token = self.refresh_since(generation).await?;
            return Ok(build(&new_token).send().await?);
        }

        Ok(resp)
    }

    async fn auth_get(&self, path: &str) -> CloudResult<reqwest::Response> {
        self.send_authed::<()>(Method::GET, path, None).await
    }

    async fn auth_put(&self, path: &str, body: &impl Serialize) -> CloudResult<reqwest::Response> {
        self.send_authed(Method::PUT, path, Some(body)).await
    }

    async fn auth_delete(&self, path: &str) -> CloudResult<reqwest::Response> {
        self.send_authed::<()>(Method::DELETE, path, None).await
    }

    async fn get_token(&self) -> CloudResult<(String, u64)> {
        let auth = self.auth.read().await;
        let token = auth.access_token.clone().ok_or(CloudError::AuthRequired)?;
        Ok((token, auth.refresh_generation))
    }

    // ── Vault Bundle ──

    pub async fn get_vault_bundle(&self) -> CloudResult<BundleResponse> {
        let resp = self
            .auth_get("/api/vault/bundle")
            .await?
            .error_for_status()
            .map_err(|e| CloudError::Api(e.to_string()))?;

        Ok(resp.json().await?)
    }

    pub async fn put_vault_bundle(&self, bundle: &WrappedBundle) -> CloudResult<()> {
        self.auth_put("/api/vault/bundle", &StoreBundleRequest { bundle })
            .await?
            .error_for_status()
            .map_err(|e| CloudError::Api(e.to_string()))?;
        Ok(())
    }

    pub async fn delete_vault_bundle(&self) -> CloudResult<()> {
        self.auth_delete("/api/vault/bundle")
            .await?
            .error_for_status()
            .map_err(|e| CloudError::Api(e.to_string()))?;
        Ok(())
    }

    pub async fn get_vault_status(&self) -> CloudResult<RemoteStatus> {
        let resp = self
            .auth_get("/api/vault/status")
            .await?
            .error_for_status()
            .map_err(|e| CloudError::Api(e.to_string()))?;

        let data: StatusResponse = resp.json().await?;
        Ok(data.status)
    }

    /// Fails unless `identity` is the signed-in user.
    async fn ensure_signed_in_as(&self, identity: &IdentityId) -> CloudResult<()> {
        match self.user_id().await {
            Some(user_id) if user_identity(user_id) == *identity => Ok(()),
            Some(user_id) => Err(CloudError::IdentityMismatch {
                signed_in: user_id.to_string(),
                requested: identity.to_string(),
            }),
            None => Err(CloudError::AuthRequired),
        }
    }
}

#[async_trait]
impl RemoteVault for CloudApiClient {
    async fn fetch_bundle(&self, identity: &IdentityId) -> VaultResult<RemoteBundle> {
        self.ensure_signed_in_as(identity).await?;
        Ok(self.get_vault_bundle().await?.into())
    }

    async fn fetch_status(&self, identity: &IdentityId) -> VaultResult<RemoteStatus> {
        self.ensure_signed_in_as(identity).await?;
        Ok(self.get_vault_status().await?)
    }

    async fn store_bundle(
        &self,
        identity: &IdentityId,
        bundle: Option<&WrappedBundle>,
    ) -> VaultResult<()> {
        self.ensure_signed_in_as(identity).await?;
        match bundle {
            Some(bundle) => self.put_vault_bundle(bundle).await?,
            None => self.delete_vault_bundle().await?,
        }
        Ok(())
    }
}

impl IdentityProvider for CloudApiClient {
    fn current(&self) -> Option<IdentityId> {
        self.identity_tx.borrow().clone()
    }

    fn changes(&self) -> watch::Receiver<Option<IdentityId>> {
        self.identity_tx.subscribe()
    }
}
