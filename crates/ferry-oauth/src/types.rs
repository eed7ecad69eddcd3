//! Token records and OAuth server descriptors.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Credential kind attached to upstream calls.
pub const BEARER: &str = "Bearer";

fn default_token_type() -> String {
    BEARER.to_string()
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// A stored OAuth token for one identity.
///
/// `expires_at` is the single source of truth for expiry checks. It is
/// stamped once from `expires_in` at save time and never recomputed on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds as reported at issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Absolute expiry instant in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// RFC 3339 timestamp of when the record was first saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl TokenRecord {
    /// Create a Bearer record with no lifetime information.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_in: None,
            expires_at: None,
            scope: None,
            created_at: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_in(mut self, secs: u64) -> Self {
        self.expires_in = Some(secs);
        self
    }

    pub fn with_expires_at(mut self, epoch_ms: u64) -> Self {
        self.expires_at = Some(epoch_ms);
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Fill in save-time fields that are not already set.
    ///
    /// An existing `expires_at` is left untouched even when `expires_in` is
    /// also present.
    pub fn stamp(&mut self, now_ms: u64) {
        if self.expires_at.is_none()
            && let Some(secs) = self.expires_in
        {
            self.expires_at = Some(now_ms.saturating_add(secs.saturating_mul(1000)));
        }
        if self.created_at.is_none() {
            self.created_at = Some(chrono::Utc::now().to_rfc3339());
        }
    }

    /// Whether a refresh credential is available.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", BEARER, self.access_token)
    }
}

/// OAuth parameters for one upstream server.
///
/// Owned by the configuration layer; read-only here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthDescriptor {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// Where this identity's token record is persisted, if not the default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,
}

impl OAuthDescriptor {
    pub fn new(
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Client secret, treating an empty string as absent.
    pub fn secret(&self) -> Option<&str> {
        self.client_secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Token endpoint and client id, or the matching configuration error.
    pub(crate) fn token_params(&self) -> crate::Result<(&str, &str)> {
        if self.token_endpoint.trim().is_empty() {
            return Err(crate::OAuthError::MissingEndpoint { endpoint: "token" });
        }
        if self.client_id.trim().is_empty() {
            return Err(crate::OAuthError::MissingClientId);
        }
        Ok((self.token_endpoint.as_str(), self.client_id.as_str()))
    }
}
