//! OAuth 2.0 Authorization Code flow with PKCE.
//!
//! Parameter generation, authorization URL construction, and the
//! authorization-code-for-token exchange.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use reqwest::header;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{OAuthError, Result};
use crate::types::{OAuthDescriptor, TokenRecord, BEARER};

/// The only challenge method this client issues.
pub const CHALLENGE_METHOD: &str = "S256";

/// PKCE code verifier and challenge pair for a single authorization attempt.
///
/// Moved into [`exchange_code`], so one pair can never be redeemed twice.
#[derive(Debug, Clone)]
pub struct PkceParams {
    pub verifier: String,
    pub challenge: String,
    pub method: &'static str,
}

impl PkceParams {
    /// Generate a new PKCE pair from 32 bytes of OS-seeded randomness.
    pub fn generate() -> Self {
        let mut verifier_bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);
        let challenge = challenge_for(&verifier);

        Self {
            verifier,
            challenge,
            method: CHALLENGE_METHOD,
        }
    }
}

/// base64url(SHA-256(verifier)) without padding.
pub fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a random state string for CSRF protection.
pub fn generate_state() -> String {
    let mut state_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut state_bytes);
    URL_SAFE_NO_PAD.encode(state_bytes)
}

/// Redirect URI served by the local callback listener.
pub fn redirect_uri(callback_port: u16) -> String {
    format!("http://localhost:{}/callback", callback_port)
}

/// Build the authorization URL the user opens in a browser.
pub fn build_authorization_url(
    descriptor: &OAuthDescriptor,
    pkce: &PkceParams,
    state: &str,
    callback_port: u16,
) -> String {
    let redirect = redirect_uri(callback_port);
    let scope = descriptor.scopes.join(" ");

    let mut params = vec![
        ("response_type", "code"),
        ("client_id", descriptor.client_id.as_str()),
        ("redirect_uri", redirect.as_str()),
        ("state", state),
        ("code_challenge", pkce.challenge.as_str()),
        ("code_challenge_method", pkce.method),
    ];
    if !descriptor.scopes.is_empty() {
        params.push(("scope", scope.as_str()));
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let separator = if descriptor.authorization_endpoint.contains('?') {
        '&'
    } else {
        '?'
    };
    format!("{}{}{}", descriptor.authorization_endpoint, separator, query)
}

/// Raw JSON payload returned by a token endpoint.
#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Outcome of a call to a token endpoint, decoded once at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenExchangeResult {
    Success(TokenRecord),
    ProviderError {
        code: String,
        description: Option<String>,
    },
    HttpError {
        status: u16,
        body: String,
    },
}

impl TokenExchangeResult {
    /// Decode a token endpoint response from its status and body.
    pub fn decode(status: u16, body: &str) -> Self {
        if !(200..300).contains(&status) {
            return Self::HttpError {
                status,
                body: body.to_string(),
            };
        }

        let payload: TokenPayload = match serde_json::from_str(body) {
            Ok(payload) => payload,
            Err(_) => {
                return Self::HttpError {
                    status,
                    body: body.to_string(),
                };
            }
        };

        if let Some(code) = payload.error {
            return Self::ProviderError {
                code,
                description: payload.error_description,
            };
        }

        match payload.access_token {
            Some(access_token) if !access_token.is_empty() => Self::Success(TokenRecord {
                access_token,
                refresh_token: payload.refresh_token.filter(|t| !t.is_empty()),
                token_type: payload.token_type.unwrap_or_else(|| BEARER.to_string()),
                expires_in: payload.expires_in,
                expires_at: None,
                scope: payload.scope,
                created_at: None,
            }),
            _ => Self::HttpError {
                status,
                body: body.to_string(),
            },
        }
    }
}

/// POST a form to a token endpoint and decode the response.
pub(crate) async fn post_token_form(
    http: &reqwest::Client,
    endpoint: &str,
    form: &[(&str, &str)],
) -> Result<TokenExchangeResult> {
    let response = http
        .post(endpoint)
        .header(header::ACCEPT, "application/json")
        .form(form)
        .send()
        .await
        .map_err(|e| OAuthError::Network(format!("Token request to {} failed: {}", endpoint, e)))?;

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| OAuthError::Network(format!("Failed to read token response: {}", e)))?;

    tracing::debug!(endpoint, status, "Token endpoint responded");
    Ok(TokenExchangeResult::decode(status, &body))
}

/// Exchange an authorization code for a token record.
///
/// `callback_port` must be the port used to build the authorization URL so
/// the `redirect_uri` matches exactly.
pub async fn exchange_code(
    http: &reqwest::Client,
    descriptor: &OAuthDescriptor,
    code: &str,
    pkce: PkceParams,
    callback_port: u16,
) -> Result<TokenRecord> {
    let (endpoint, client_id) = descriptor.token_params()?;
    let redirect = redirect_uri(callback_port);

    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect.as_str()),
        ("client_id", client_id),
        ("code_verifier", pkce.verifier.as_str()),
    ];
    if let Some(secret) = descriptor.secret() {
        form.push(("client_secret", secret));
    }

    match post_token_form(http, endpoint, &form).await? {
        TokenExchangeResult::Success(record) => {
            if record.refresh_token.is_none() {
                tracing::info!("Token endpoint issued no refresh token; re-authorization will be needed on expiry");
            }
            Ok(record)
        }
        TokenExchangeResult::ProviderError { code, description } => {
            Err(OAuthError::OAuthProvider { code, description })
        }
        TokenExchangeResult::HttpError { status, body } => {
            tracing::warn!(status, "Authorization code exchange rejected");
            Err(OAuthError::TokenExchange { status, body })
        }
    }
}
