//! Token lifecycle: expiry evaluation and refresh-token exchange.
//!
//! [`TokenLifecycle`] is the only component that decides whether a stored
//! token is usable. Every load→check→refresh→save sequence for one identity
//! runs under that identity's lock, so concurrent callers observing the same
//! expired token share a single refresh. The refresh itself runs on a spawned
//! task, so a caller that gives up cannot abandon it between the token
//! endpoint call and the save.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::error::{OAuthError, Result};
use crate::pkce::{TokenExchangeResult, post_token_form};
use crate::store::SharedTokenStore;
use crate::types::{OAuthDescriptor, TokenRecord, now_millis};

/// Buffer time before expiry to trigger refresh (5 minutes in milliseconds).
pub const REFRESH_BUFFER_MS: u64 = 5 * 60 * 1000;

/// Request timeout for token endpoint calls.
pub const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Check if a token is expired or about to expire.
///
/// A record without `expires_at` never expires: some providers omit
/// lifetime information entirely.
pub fn is_expired(record: &TokenRecord) -> bool {
    is_expired_at(record, now_millis())
}

/// [`is_expired`] against an explicit clock reading.
pub fn is_expired_at(record: &TokenRecord, now_ms: u64) -> bool {
    match record.expires_at {
        None => false,
        Some(expires_at) => expires_at.saturating_sub(now_ms) < REFRESH_BUFFER_MS,
    }
}

/// Build the HTTP client used for token endpoint calls.
pub fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(TOKEN_REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

// ============================================================================
// TokenLifecycle
// ============================================================================

/// Owns expiry checks and refresh for every identity in a store.
#[derive(Debug, Clone)]
pub struct TokenLifecycle {
    store: SharedTokenStore,
    http: reqwest::Client,
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl TokenLifecycle {
    pub fn new(store: SharedTokenStore) -> Self {
        Self::with_http_client(store, default_http_client())
    }

    pub fn with_http_client(store: SharedTokenStore, http: reqwest::Client) -> Self {
        Self {
            store,
            http,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &SharedTokenStore {
        &self.store
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn identity_lock(&self, identity: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(identity.to_string())
            .or_default()
            .clone()
    }

    /// Return a usable token for `identity`, refreshing it first if expired.
    ///
    /// This is the entry point used before every authorized call.
    pub async fn get_valid_token(
        &self,
        identity: &str,
        descriptor: &OAuthDescriptor,
    ) -> Result<TokenRecord> {
        let guard = self.identity_lock(identity).lock_owned().await;

        let record = self
            .store
            .load(identity)
            .await?
            .ok_or_else(|| OAuthError::NoToken {
                identity: identity.to_string(),
            })?;

        if !is_expired(&record) {
            return Ok(record);
        }

        tracing::info!(identity, "Token expired, refreshing...");
        self.spawn_refresh(identity, descriptor, guard).await
    }

    /// Exchange the stored refresh token for a new access token.
    pub async fn refresh(
        &self,
        identity: &str,
        descriptor: &OAuthDescriptor,
    ) -> Result<TokenRecord> {
        let guard = self.identity_lock(identity).lock_owned().await;
        self.spawn_refresh(identity, descriptor, guard).await
    }

    /// Run the refresh on its own task, which keeps the identity lock until
    /// the outcome is saved.
    ///
    /// Dropping the caller's future only detaches it: a refresh token the
    /// provider has already rotated is still persisted, and the next caller
    /// for the identity waits on the lock and then sees the saved record.
    async fn spawn_refresh(
        &self,
        identity: &str,
        descriptor: &OAuthDescriptor,
        guard: OwnedMutexGuard<()>,
    ) -> Result<TokenRecord> {
        let store = self.store.clone();
        let http = self.http.clone();
        let identity = identity.to_string();
        let descriptor = descriptor.clone();

        let task = tokio::spawn(async move {
            let result = refresh_record(&store, &http, &identity, &descriptor).await;
            drop(guard);
            result
        });

        task.await
            .map_err(|e| OAuthError::TaskFailed(e.to_string()))?
    }

    /// Save a freshly issued record, serialized with any in-flight refresh.
    pub async fn install(&self, identity: &str, record: &TokenRecord) -> Result<TokenRecord> {
        let lock = self.identity_lock(identity);
        let _guard = lock.lock().await;
        self.store.save(identity, record).await
    }

    /// Delete the stored record. Returns whether one existed.
    pub async fn forget(&self, identity: &str) -> Result<bool> {
        let lock = self.identity_lock(identity);
        let _guard = lock.lock().await;
        self.store.delete(identity).await
    }

    /// Get token expiry information for display.
    pub async fn token_status(&self, identity: &str) -> Result<Option<TokenStatus>> {
        let record = self.store.load(identity).await?;
        Ok(record.map(|r| TokenStatus::from_record(&r, now_millis())))
    }
}

async fn refresh_record(
    store: &SharedTokenStore,
    http: &reqwest::Client,
    identity: &str,
    descriptor: &OAuthDescriptor,
) -> Result<TokenRecord> {
    let no_refresh = || OAuthError::NoRefreshToken {
        identity: identity.to_string(),
    };

    let current = store.load(identity).await?.ok_or_else(no_refresh)?;
    let refresh_token = current
        .refresh_token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or_else(no_refresh)?;

    let (endpoint, client_id) = descriptor.token_params()?;

    let mut form = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token.as_str()),
        ("client_id", client_id),
    ];
    if let Some(secret) = descriptor.secret() {
        form.push(("client_secret", secret));
    }

    match post_token_form(http, endpoint, &form).await? {
        TokenExchangeResult::Success(mut fresh) => {
            // Many providers do not rotate; keep the old refresh token unless replaced.
            if fresh.refresh_token.is_none() {
                fresh.refresh_token = Some(refresh_token);
            }
            if fresh.scope.is_none() {
                fresh.scope = current.scope;
            }
            fresh.expires_at = None;

            let stored = store.save(identity, &fresh).await?;
            tracing::info!(identity, "Token refreshed successfully");
            Ok(stored)
        }
        TokenExchangeResult::ProviderError { code, description } => {
            tracing::warn!(identity, error = %code, "Token refresh rejected by provider");
            let body = match description {
                Some(description) => format!("{}: {}", code, description),
                None => code,
            };
            Err(OAuthError::RefreshFailed { status: 200, body })
        }
        TokenExchangeResult::HttpError { status, body } => {
            tracing::warn!(identity, status, "Token refresh failed");
            Err(OAuthError::RefreshFailed { status, body })
        }
    }
}

// ============================================================================
// TokenStatus
// ============================================================================

/// Information about a stored token for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    pub created_at: Option<String>,
    pub expires_at: Option<u64>,
    /// Seconds until expiry; `None` for non-expiring tokens.
    pub expires_in_secs: Option<u64>,
    pub is_expired: bool,
    pub has_refresh_token: bool,
    pub scope: Option<String>,
}

impl TokenStatus {
    pub fn from_record(record: &TokenRecord, now_ms: u64) -> Self {
        Self {
            created_at: record.created_at.clone(),
            expires_at: record.expires_at,
            expires_in_secs: record
                .expires_at
                .map(|at| at.saturating_sub(now_ms) / 1000),
            is_expired: is_expired_at(record, now_ms),
            has_refresh_token: record.can_refresh(),
            scope: record.scope.clone(),
        }
    }

    pub fn expires_in_display(&self) -> String {
        match self.expires_in_secs {
            None => "No expiry reported".to_string(),
            Some(_) if self.is_expired && self.has_refresh_token => {
                "Expired (will refresh on next use)".to_string()
            }
            Some(_) if self.is_expired => "Expired (re-authorization required)".to_string(),
            Some(secs) => {
                let hours = secs / 3600;
                let minutes = (secs % 3600) / 60;
                format!("{}h {}m", hours, minutes)
            }
        }
    }
}
