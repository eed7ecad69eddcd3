//! One-shot local listener for the OAuth redirect.
//!
//! ```text
//! Idle ──bind──▶ Listening ──request──▶ Completed | Failed
//!                    └──────timeout────▶ TimedOut
//! ```
//!
//! The listener serves exactly one meaningful request on `/callback` and is
//! shut down on every exit path. When no local browser can reach the
//! listener, [`parse_redirect_input`] accepts the redirect URL pasted by the
//! user and applies the same validation.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{RawQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{OAuthError, Result};

/// Path the authorization server redirects to.
pub const CALLBACK_PATH: &str = "/callback";

/// How long to wait for the redirect before giving up (5 minutes).
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Upper bound on draining in-flight connections after the outcome is known.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>ferry</title></head>
<body style="font-family: system-ui; text-align: center; padding-top: 80px;">
<h2>Authorization complete</h2>
<p>You can close this tab and return to the terminal.</p>
</body>
</html>"#;

const CLOSED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>ferry</title></head>
<body style="font-family: system-ui; text-align: center; padding-top: 80px;">
<h2>This authorization attempt has already finished</h2>
</body>
</html>"#;

/// Authorization code and state captured from a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

/// Lifecycle of a callback listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackState {
    Idle,
    Listening,
    Completed,
    Failed,
    TimedOut,
}

impl CallbackState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallbackState::Completed | CallbackState::Failed | CallbackState::TimedOut
        )
    }
}

// ============================================================================
// Query validation (shared by the listener and manual entry)
// ============================================================================

/// Validate a redirect query string into [`CallbackParams`].
///
/// `error` wins over everything else; otherwise both `code` and `state`
/// must be present and non-empty.
pub fn parse_callback_query(query: &str) -> Result<CallbackParams> {
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(code) = error {
        return Err(OAuthError::OAuthProvider { code, description });
    }

    match (
        code.filter(|c| !c.is_empty()),
        state.filter(|s| !s.is_empty()),
    ) {
        (Some(code), Some(state)) => Ok(CallbackParams { code, state }),
        (None, _) => Err(OAuthError::MalformedCallback(
            "redirect is missing the 'code' parameter".to_string(),
        )),
        (_, None) => Err(OAuthError::MalformedCallback(
            "redirect is missing the 'state' parameter".to_string(),
        )),
    }
}

/// Parse a redirect pasted by the user.
///
/// Accepts the full redirect URL, a bare `code=..&state=..` query string,
/// or the `code#state` form some providers display instead of redirecting.
pub fn parse_redirect_input(input: &str) -> Result<CallbackParams> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(OAuthError::MalformedCallback("no input provided".to_string()));
    }

    if let Ok(url) = url::Url::parse(trimmed)
        && url.has_host()
    {
        return match url.query() {
            Some(query) => parse_callback_query(query),
            None => Err(OAuthError::MalformedCallback(
                "redirect URL has no query string".to_string(),
            )),
        };
    }

    if trimmed.contains('=') {
        return parse_callback_query(trimmed.trim_start_matches('?'));
    }

    if let Some((code, state)) = trimmed.split_once('#') {
        if code.is_empty() || state.is_empty() {
            return Err(OAuthError::MalformedCallback(
                "missing code or state".to_string(),
            ));
        }
        return Ok(CallbackParams {
            code: code.to_string(),
            state: state.to_string(),
        });
    }

    Err(OAuthError::MalformedCallback(
        "expected the redirect URL containing code and state".to_string(),
    ))
}

// ============================================================================
// Listener
// ============================================================================

/// An idle callback listener: a port and a timeout, nothing bound yet.
#[derive(Debug, Clone)]
pub struct CallbackListener {
    port: u16,
    timeout: Duration,
}

impl CallbackListener {
    /// Create a listener for `port` (0 lets the OS choose).
    pub fn new(port: u16) -> Self {
        Self {
            port,
            timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> CallbackState {
        CallbackState::Idle
    }

    /// Bind on localhost and start serving.
    ///
    /// Fails immediately with [`OAuthError::PortInUse`] when the port is
    /// taken; no other port is tried.
    pub async fn bind(self) -> Result<ListeningCallback> {
        let listener = TcpListener::bind(("127.0.0.1", self.port))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AddrInUse => OAuthError::PortInUse { port: self.port },
                _ => OAuthError::Io(format!(
                    "Failed to bind callback listener on port {}: {}",
                    self.port, e
                )),
            })?;
        let port = listener
            .local_addr()
            .map_err(|e| OAuthError::Io(format!("Failed to read listener address: {}", e)))?
            .port();

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let shared = Arc::new(CallbackShared {
            outcome: Mutex::new(Some(outcome_tx)),
        });

        let router = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .fallback(handle_not_found)
            .with_state(shared);

        let server = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::warn!(error = %e, "Callback listener stopped with error");
            }
        });

        tracing::info!(port, "Callback listener waiting for OAuth redirect");

        Ok(ListeningCallback {
            port,
            timeout: self.timeout,
            state: CallbackState::Listening,
            outcome_rx,
            shutdown_tx: Some(shutdown_tx),
            server: Some(server),
        })
    }
}

struct CallbackShared {
    outcome: Mutex<Option<oneshot::Sender<Result<CallbackParams>>>>,
}

/// A bound listener awaiting the redirect.
///
/// Dropping it without calling [`wait`](Self::wait) still releases the port.
#[derive(Debug)]
pub struct ListeningCallback {
    port: u16,
    timeout: Duration,
    state: CallbackState,
    outcome_rx: oneshot::Receiver<Result<CallbackParams>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl ListeningCallback {
    /// The port actually bound.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> CallbackState {
        self.state
    }

    /// Wait for the redirect, then close the listener.
    ///
    /// Returns only after the listener has been released, whatever the outcome.
    pub async fn wait(&mut self) -> Result<CallbackParams> {
        if self.state.is_terminal() {
            return Err(OAuthError::Io("callback listener already closed".to_string()));
        }

        let outcome = match tokio::time::timeout(self.timeout, &mut self.outcome_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(OAuthError::Io(
                "callback listener stopped unexpectedly".to_string(),
            )),
            Err(_) => {
                self.close().await;
                self.state = CallbackState::TimedOut;
                tracing::warn!(port = self.port, "Timed out waiting for OAuth redirect");
                return Err(OAuthError::CallbackTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        self.close().await;
        self.state = match outcome {
            Ok(_) => CallbackState::Completed,
            Err(_) => CallbackState::Failed,
        };
        tracing::debug!(port = self.port, state = ?self.state, "Callback listener closed");
        outcome
    }

    async fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut server) = self.server.take()
            && tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err()
        {
            server.abort();
        }
    }
}

impl Drop for ListeningCallback {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

async fn handle_callback(
    State(shared): State<Arc<CallbackShared>>,
    RawQuery(query): RawQuery,
) -> Response {
    let Some(sender) = shared.outcome.lock().take() else {
        return (StatusCode::GONE, Html(CLOSED_PAGE)).into_response();
    };

    let outcome = parse_callback_query(query.as_deref().unwrap_or(""));
    let response = match &outcome {
        Ok(_) => (StatusCode::OK, Html(SUCCESS_PAGE.to_string())).into_response(),
        Err(OAuthError::OAuthProvider { code, description }) => {
            tracing::warn!(error = %code, "Authorization server returned an error");
            let detail = description.as_deref().unwrap_or(code);
            (StatusCode::OK, Html(failure_page(detail))).into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, Html(failure_page(&e.to_string()))).into_response(),
    };

    let _ = sender.send(outcome);
    response
}

async fn handle_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

fn failure_page(detail: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>ferry</title></head>
<body style="font-family: system-ui; text-align: center; padding-top: 80px;">
<h2>Authorization failed</h2>
<p>{}</p>
<p>Return to the terminal and run the login again.</p>
</body>
</html>"#,
        escape_html(detail)
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
