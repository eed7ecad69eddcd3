//! Interactive authorization: PKCE + callback + code exchange + save.
//!
//! [`AuthorizationFlow::begin`] validates configuration, generates the PKCE
//! secret and state, and (unless in manual mode) binds the callback listener
//! so the authorization URL carries the port actually bound. The returned
//! [`PendingAuthorization`] owns the verifier until the code is exchanged.

use std::time::Duration;

use crate::callback::{
    CallbackListener, CallbackParams, DEFAULT_CALLBACK_TIMEOUT, ListeningCallback,
    parse_redirect_input,
};
use crate::error::{OAuthError, Result};
use crate::lifecycle::TokenLifecycle;
use crate::pkce::{PkceParams, build_authorization_url, exchange_code, generate_state};
use crate::store::validate_identity;
use crate::types::{OAuthDescriptor, TokenRecord};

/// Default local port for the OAuth redirect.
pub const DEFAULT_CALLBACK_PORT: u16 = 8976;

/// How the authorization code gets back to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackMode {
    /// Bind a local listener and wait for the browser redirect.
    Listener,
    /// The user pastes the redirect URL.
    Manual,
}

/// Configuration for one interactive authorization.
#[derive(Debug, Clone)]
pub struct AuthorizationFlow {
    lifecycle: TokenLifecycle,
    identity: String,
    descriptor: OAuthDescriptor,
    port: u16,
    timeout: Duration,
}

impl AuthorizationFlow {
    pub fn new(
        lifecycle: TokenLifecycle,
        identity: impl Into<String>,
        descriptor: OAuthDescriptor,
    ) -> Self {
        Self {
            lifecycle,
            identity: identity.into(),
            descriptor,
            port: DEFAULT_CALLBACK_PORT,
            timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start the flow and produce the URL to open.
    pub async fn begin(self, mode: CallbackMode) -> Result<PendingAuthorization> {
        validate_identity(&self.identity)?;
        if self.descriptor.authorization_endpoint.trim().is_empty() {
            return Err(OAuthError::MissingEndpoint {
                endpoint: "authorization",
            });
        }
        self.descriptor.token_params()?;

        let (listener, port) = match mode {
            CallbackMode::Listener => {
                let listener = CallbackListener::new(self.port)
                    .with_timeout(self.timeout)
                    .bind()
                    .await?;
                let port = listener.port();
                (Some(listener), port)
            }
            CallbackMode::Manual => (None, self.port),
        };

        let pkce = PkceParams::generate();
        let state = generate_state();
        let url = build_authorization_url(&self.descriptor, &pkce, &state, port);

        tracing::info!(identity = %self.identity, port, ?mode, "Starting OAuth authorization");

        Ok(PendingAuthorization {
            lifecycle: self.lifecycle,
            identity: self.identity,
            descriptor: self.descriptor,
            pkce,
            state,
            port,
            url,
            listener,
        })
    }
}

/// An authorization in progress, waiting for the user to consent.
#[derive(Debug)]
pub struct PendingAuthorization {
    lifecycle: TokenLifecycle,
    identity: String,
    descriptor: OAuthDescriptor,
    pkce: PkceParams,
    state: String,
    port: u16,
    url: String,
    listener: Option<ListeningCallback>,
}

impl PendingAuthorization {
    /// The authorization URL for the browser.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_manual(&self) -> bool {
        self.listener.is_none()
    }

    /// Wait for the browser redirect, then exchange and save.
    pub async fn complete(mut self) -> Result<TokenRecord> {
        let Some(mut listener) = self.listener.take() else {
            return Err(OAuthError::InvalidRequest(
                "no callback listener in manual mode; paste the redirect URL instead".to_string(),
            ));
        };
        let params = listener.wait().await?;
        drop(listener);
        self.finish(params).await
    }

    /// Complete from a redirect URL (or `code#state`) pasted by the user.
    pub async fn complete_with_redirect(mut self, input: &str) -> Result<TokenRecord> {
        self.listener.take();
        let params = parse_redirect_input(input)?;
        self.finish(params).await
    }

    async fn finish(self, params: CallbackParams) -> Result<TokenRecord> {
        if params.state != self.state {
            tracing::warn!(identity = %self.identity, "OAuth state mismatch; discarding code");
            return Err(OAuthError::StateMismatch);
        }

        let record = exchange_code(
            self.lifecycle.http(),
            &self.descriptor,
            &params.code,
            self.pkce,
            self.port,
        )
        .await?;

        let stored = self.lifecycle.install(&self.identity, &record).await?;
        tracing::info!(identity = %self.identity, "Authorization complete");
        Ok(stored)
    }
}
