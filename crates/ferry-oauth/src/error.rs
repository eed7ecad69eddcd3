//! Error types for the token lifecycle engine.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, OAuthError>;

/// Errors that can occur while acquiring, refreshing, or using tokens.
///
/// Every variant that originates from an HTTP exchange carries the status
/// and raw body so failures can be diagnosed without re-running the call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OAuthError {
    /// The callback port is already bound by another process.
    #[error("Callback port {port} is already in use; choose a different port")]
    PortInUse { port: u16 },

    /// No redirect reached the callback listener in time.
    #[error("Timed out after {timeout_ms}ms waiting for the OAuth redirect")]
    CallbackTimeout { timeout_ms: u64 },

    /// The redirect did not carry both `code` and `state`.
    #[error("Malformed callback: {0}")]
    MalformedCallback(String),

    /// The authorization server reported an error on redirect or in a token response.
    #[error("Authorization server error: {code}{}", parenthesized(.description))]
    OAuthProvider {
        code: String,
        description: Option<String>,
    },

    /// The returned `state` does not match the one generated for this attempt.
    #[error("State mismatch in OAuth callback; the authorization attempt was rejected")]
    StateMismatch,

    /// The token endpoint rejected the authorization code exchange.
    #[error("Token exchange failed ({status}): {body}")]
    TokenExchange { status: u16, body: String },

    /// No token record is stored for the identity.
    #[error("No token stored for '{identity}'. Run 'ferry auth login {identity}' first.")]
    NoToken { identity: String },

    /// The stored record has no refresh credential.
    #[error("No refresh token stored for '{identity}'")]
    NoRefreshToken { identity: String },

    /// The descriptor lacks a required endpoint.
    #[error("Config error: missing {endpoint} endpoint")]
    MissingEndpoint { endpoint: &'static str },

    /// The descriptor lacks a client id.
    #[error("Config error: missing client_id")]
    MissingClientId,

    /// The token endpoint rejected the refresh request.
    #[error("Token refresh failed ({status}): {body}")]
    RefreshFailed { status: u16, body: String },

    /// The upstream rejected the Bearer token (401/403).
    #[error("Upstream rejected credentials ({status}): {body}")]
    AuthRejected { status: u16, body: String },

    /// The upstream returned a server error (5xx).
    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// The upstream could not be reached at all.
    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    /// The upstream URL or a request header cannot be used to build a request.
    #[error("Config error: invalid upstream request: {0}")]
    InvalidUpstream(String),

    /// The upstream returned some other non-success status.
    #[error("Unexpected upstream response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    /// Network/HTTP error talking to a token endpoint.
    #[error("Network error: {0}")]
    Network(String),

    /// Token file could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The identity name cannot be used as a storage key.
    #[error("Invalid identity name: {0:?}")]
    InvalidIdentity(String),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Local listener I/O error other than the port being taken.
    #[error("I/O error: {0}")]
    Io(String),

    /// A background refresh task panicked or was cancelled by runtime shutdown.
    #[error("Refresh task failed: {0}")]
    TaskFailed(String),
}

fn parenthesized(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

impl OAuthError {
    /// True when recovery requires a fresh interactive authorization.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            OAuthError::NoToken { .. }
                | OAuthError::NoRefreshToken { .. }
                | OAuthError::RefreshFailed { .. }
                | OAuthError::AuthRejected { .. }
                | OAuthError::StateMismatch
        )
    }

    /// True for transient failures a higher layer may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OAuthError::Upstream { .. }
                | OAuthError::Unreachable(_)
                | OAuthError::Network(_)
                | OAuthError::CallbackTimeout { .. }
        )
    }

    /// True for descriptor/configuration problems, which are never retried.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            OAuthError::MissingEndpoint { .. }
                | OAuthError::MissingClientId
                | OAuthError::InvalidIdentity(_)
                | OAuthError::InvalidUpstream(_)
        )
    }
}

impl From<reqwest::Error> for OAuthError {
    fn from(e: reqwest::Error) -> Self {
        OAuthError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for OAuthError {
    fn from(e: serde_json::Error) -> Self {
        OAuthError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = OAuthError::OAuthProvider {
            code: "access_denied".to_string(),
            description: Some("user said no".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Authorization server error: access_denied (user said no)"
        );

        let bare = OAuthError::OAuthProvider {
            code: "access_denied".to_string(),
            description: None,
        };
        assert_eq!(bare.to_string(), "Authorization server error: access_denied");
    }

    #[test]
    fn test_error_classification() {
        assert!(OAuthError::NoToken {
            identity: "svc".to_string()
        }
        .requires_reauthorization());
        assert!(OAuthError::StateMismatch.requires_reauthorization());
        assert!(!OAuthError::StateMismatch.is_retryable());

        let upstream = OAuthError::Upstream {
            status: 503,
            body: String::new(),
        };
        assert!(upstream.is_retryable());
        assert!(!upstream.requires_reauthorization());

        assert!(OAuthError::MissingClientId.is_config_error());
        assert!(!OAuthError::MissingClientId.is_retryable());

        let bad_url = OAuthError::InvalidUpstream("relative URL without a base".to_string());
        assert!(bad_url.is_config_error());
        assert!(!bad_url.is_retryable());
    }

    #[test]
    fn test_port_in_use_names_port() {
        let err = OAuthError::PortInUse { port: 8976 };
        assert!(err.to_string().contains("8976"));
    }
}
