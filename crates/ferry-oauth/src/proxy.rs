//! Localhost HTTP proxy for authorized upstream calls.
//!
//! Accepts JSON payloads on `/servers/{name}/rpc` and forwards them to the
//! named upstream with a valid Bearer token, so local clients never handle
//! OAuth themselves.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router as AxumRouter,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::caller::AuthorizedCaller;
use crate::error::OAuthError;
use crate::types::OAuthDescriptor;

/// An upstream server reachable through the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub url: String,
    pub descriptor: OAuthDescriptor,
}

impl UpstreamTarget {
    pub fn new(url: impl Into<String>, descriptor: OAuthDescriptor) -> Self {
        Self {
            url: url.into(),
            descriptor,
        }
    }
}

/// Configuration for the proxy server.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind_addr: SocketAddr,
    pub enable_cors: bool,
    /// Upstream targets keyed by identity.
    pub targets: BTreeMap<String, UpstreamTarget>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            enable_cors: true,
            targets: BTreeMap::new(),
        }
    }
}

impl ProxyConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    pub fn with_target(mut self, identity: impl Into<String>, target: UpstreamTarget) -> Self {
        self.targets.insert(identity.into(), target);
        self
    }
}

/// Shared state for the proxy server.
struct ProxyState {
    caller: AuthorizedCaller,
    targets: BTreeMap<String, UpstreamTarget>,
}

/// The proxy server.
pub struct ProxyServer {
    config: ProxyConfig,
    state: Arc<ProxyState>,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig, caller: AuthorizedCaller) -> Self {
        Self {
            state: Arc::new(ProxyState {
                caller,
                targets: config.targets.clone(),
            }),
            config,
        }
    }

    /// Build the axum router.
    pub fn router(&self) -> AxumRouter {
        let mut router = AxumRouter::new()
            .route("/health", get(handle_health))
            .route("/servers", get(handle_servers))
            .route("/servers/{name}/rpc", post(handle_rpc))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        router
    }

    /// Run the proxy server.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, servers = self.config.targets.len(), "Starting ferry proxy");
        axum::serve(listener, self.router()).await
    }

    /// Run with graceful shutdown, returning the bound address and the
    /// server task.
    ///
    /// The task finishes once `shutdown` resolves and every in-flight request
    /// has completed; await it before exiting the runtime.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<(SocketAddr, JoinHandle<std::io::Result<()>>)> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, servers = self.config.targets.len(), "Starting ferry proxy");
        let handle = tokio::spawn(async move {
            axum::serve(listener, self.router())
                .with_graceful_shutdown(shutdown)
                .await
        });
        Ok((local_addr, handle))
    }
}

/// Handle POST /servers/{name}/rpc
async fn handle_rpc(
    State(state): State<Arc<ProxyState>>,
    Path(name): Path<String>,
    body: String,
) -> Result<Json<serde_json::Value>, ProxyError> {
    let target = state
        .targets
        .get(&name)
        .ok_or_else(|| ProxyError::NotFound(format!("Unknown server: {}", name)))?;

    let payload: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| OAuthError::InvalidRequest(format!("Invalid JSON: {}", e)))?;

    let response = state
        .caller
        .post_json(&name, &target.descriptor, &target.url, &payload)
        .await?;
    Ok(Json(response))
}

/// Handle GET /servers
async fn handle_servers(State(state): State<Arc<ProxyState>>) -> impl IntoResponse {
    let servers: Vec<_> = state
        .targets
        .iter()
        .map(|(name, target)| serde_json::json!({ "name": name, "url": target.url }))
        .collect();
    Json(serde_json::json!({ "servers": servers }))
}

/// Handle GET /health
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ferry-proxy"
    }))
}

/// Error type for proxy responses.
#[derive(Debug)]
pub enum ProxyError {
    NotFound(String),
    OAuth(OAuthError),
}

impl From<OAuthError> for ProxyError {
    fn from(err: OAuthError) -> Self {
        Self::OAuth(err)
    }
}

impl ProxyError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        let err = match self {
            ProxyError::NotFound(_) => return (StatusCode::NOT_FOUND, "not_found"),
            ProxyError::OAuth(err) => err,
        };
        match err {
            OAuthError::NoToken { .. }
            | OAuthError::NoRefreshToken { .. }
            | OAuthError::RefreshFailed { .. }
            | OAuthError::AuthRejected { .. } => {
                (StatusCode::UNAUTHORIZED, "authentication_error")
            }
            OAuthError::Upstream { .. }
            | OAuthError::UnexpectedResponse { .. }
            | OAuthError::TokenExchange { .. }
            | OAuthError::Network(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            OAuthError::Unreachable(_) => (StatusCode::GATEWAY_TIMEOUT, "upstream_unreachable"),
            OAuthError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            err if err.is_config_error() => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type) = self.status_and_type();
        let message = match &self {
            ProxyError::NotFound(msg) => msg.clone(),
            ProxyError::OAuth(err) => err.to_string(),
        };

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error_type, %message, "Proxy request failed");
        }

        let body = serde_json::json!({
            "type": "error",
            "error": {
                "type": error_type,
                "message": message
            }
        });

        (status, Json(body)).into_response()
    }
}
