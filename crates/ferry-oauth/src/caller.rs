//! Authorized upstream calls.
//!
//! Obtains a valid token through the [`TokenLifecycle`], attaches it as a
//! Bearer credential, and classifies the upstream response. Never retries.

use reqwest::{Method, header};
use serde_json::Value;

use crate::error::{OAuthError, Result};
use crate::lifecycle::TokenLifecycle;
use crate::types::OAuthDescriptor;

/// A request to an upstream server, before authorization is attached.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl UpstreamRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST with a JSON body.
    pub fn json(url: impl Into<String>, payload: &Value) -> Result<Self> {
        Ok(Self::new(Method::POST, url)
            .with_header(header::CONTENT_TYPE.as_str(), "application/json")
            .with_header(header::ACCEPT.as_str(), "application/json")
            .with_body(serde_json::to_vec(payload)?))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A successful (2xx) upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON. An empty body decodes as `null`.
    pub fn json(&self) -> Result<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Map a non-success status to its error kind.
pub fn classify_status(status: u16, body: &str) -> Result<()> {
    let body = body.to_string();
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(OAuthError::AuthRejected { status, body }),
        500..=599 => Err(OAuthError::Upstream { status, body }),
        _ => Err(OAuthError::UnexpectedResponse { status, body }),
    }
}

/// Performs upstream calls on behalf of an identity.
#[derive(Debug, Clone)]
pub struct AuthorizedCaller {
    lifecycle: TokenLifecycle,
    http: reqwest::Client,
}

impl AuthorizedCaller {
    /// Share the lifecycle's HTTP client for upstream calls.
    pub fn new(lifecycle: TokenLifecycle) -> Self {
        let http = lifecycle.http().clone();
        Self { lifecycle, http }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn lifecycle(&self) -> &TokenLifecycle {
        &self.lifecycle
    }

    /// Perform one authorized call.
    pub async fn send(
        &self,
        identity: &str,
        descriptor: &OAuthDescriptor,
        request: UpstreamRequest,
    ) -> Result<UpstreamResponse> {
        let token = self.lifecycle.get_valid_token(identity, descriptor).await?;

        tracing::debug!(
            identity,
            method = %request.method,
            url = %request.url,
            "Forwarding authorized request"
        );

        let mut builder = self
            .http
            .request(request.method, &request.url)
            .header(header::AUTHORIZATION, token.authorization_header());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                tracing::warn!(identity, error = %e, "Upstream request is malformed");
                return OAuthError::InvalidUpstream(e.to_string());
            }
            tracing::warn!(identity, error = %e, "Upstream unreachable");
            OAuthError::Unreachable(e.to_string())
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| OAuthError::Unreachable(format!("Failed to read response: {}", e)))?;

        if let Err(err) = classify_status(status, &String::from_utf8_lossy(&body)) {
            tracing::warn!(identity, status, "Upstream call failed");
            return Err(err);
        }

        Ok(UpstreamResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }

    /// POST a JSON payload and decode the JSON response.
    ///
    /// A 2xx body that is not JSON is the upstream's fault and surfaces as
    /// [`OAuthError::UnexpectedResponse`].
    pub async fn post_json(
        &self,
        identity: &str,
        descriptor: &OAuthDescriptor,
        url: &str,
        payload: &Value,
    ) -> Result<Value> {
        let request = UpstreamRequest::json(url, payload)?;
        let response = self.send(identity, descriptor, request).await?;
        response.json().map_err(|_| {
            tracing::warn!(identity, status = response.status, "Upstream returned non-JSON body");
            OAuthError::UnexpectedResponse {
                status: response.status,
                body: response.text(),
            }
        })
    }
}
