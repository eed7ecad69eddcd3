//! End-to-end token lifecycle tests.
//!
//! These tests drive authorization, persistence, refresh and authorized calls
//! against wiremock token endpoints and upstreams, with tokens on disk.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ferry_oauth::{
    AuthorizationFlow, AuthorizedCaller, CallbackMode, FileTokenStore, OAuthDescriptor,
    OAuthError, ProxyConfig, ProxyServer, TokenLifecycle, TokenRecord, TokenStore,
    UpstreamRequest, UpstreamTarget,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn descriptor(token_server: &MockServer) -> OAuthDescriptor {
    OAuthDescriptor::new(
        "https://auth.example.com/authorize",
        format!("{}/token", token_server.uri()),
        "client-1",
    )
}

fn state_of(url: &str) -> Result<String> {
    url::Url::parse(url)?
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| anyhow::anyhow!("authorization URL has no state"))
}

#[tokio::test]
async fn test_expired_token_is_refreshed_before_upstream_call() -> Result<()> {
    let token_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&token_server)
        .await;

    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&upstream)
        .await;

    let temp = tempfile::tempdir()?;
    let store = Arc::new(FileTokenStore::new(temp.path()));
    store
        .save(
            "svc",
            &TokenRecord::new("old")
                .with_refresh_token("r1")
                .with_expires_at(ferry_oauth::types::now_millis() - 1000),
        )
        .await?;

    let caller = AuthorizedCaller::new(TokenLifecycle::new(store.clone()));
    let response = caller
        .send(
            "svc",
            &descriptor(&token_server),
            UpstreamRequest::get(format!("{}/data", upstream.uri())),
        )
        .await?;
    assert_eq!(response.text(), "ok");

    // A fresh store instance sees what was persisted.
    let reloaded = FileTokenStore::new(temp.path())
        .load("svc")
        .await?
        .expect("record should exist");
    assert_eq!(reloaded.access_token, "new");
    assert_eq!(reloaded.refresh_token.as_deref(), Some("r1"));
    assert!(!ferry_oauth::is_expired(&reloaded));

    Ok(())
}

#[tokio::test]
async fn test_login_through_callback_listener() -> Result<()> {
    let token_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a1",
            "refresh_token": "r1",
            "expires_in": 3600,
            "scope": "read"
        })))
        .expect(1)
        .mount(&token_server)
        .await;

    let temp = tempfile::tempdir()?;
    let store = Arc::new(FileTokenStore::new(temp.path()));
    let pending = AuthorizationFlow::new(
        TokenLifecycle::new(store.clone()),
        "svc",
        descriptor(&token_server),
    )
    .with_port(0)
    .with_timeout(Duration::from_secs(10))
    .begin(CallbackMode::Listener)
    .await?;

    let redirect = format!(
        "http://127.0.0.1:{}/callback?code=abc&state={}",
        pending.port(),
        state_of(pending.url())?
    );
    let browser = tokio::spawn(async move { reqwest::get(redirect).await });

    let record = pending.complete().await?;
    assert_eq!(record.access_token, "a1");
    assert_eq!(record.scope.as_deref(), Some("read"));

    let page = browser.await??;
    assert!(page.status().is_success());

    let stored = store.load("svc").await?.expect("record should exist");
    assert_eq!(stored, record);

    Ok(())
}

#[tokio::test]
async fn test_listener_state_mismatch_saves_nothing() -> Result<()> {
    let token_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&token_server)
        .await;

    let temp = tempfile::tempdir()?;
    let store = Arc::new(FileTokenStore::new(temp.path()));
    let pending = AuthorizationFlow::new(
        TokenLifecycle::new(store.clone()),
        "svc",
        descriptor(&token_server),
    )
    .with_port(0)
    .begin(CallbackMode::Listener)
    .await?;

    let redirect = format!(
        "http://127.0.0.1:{}/callback?code=abc&state=forged",
        pending.port()
    );
    let browser = tokio::spawn(async move { reqwest::get(redirect).await });

    let err = pending.complete().await.unwrap_err();
    assert!(matches!(err, OAuthError::StateMismatch));
    assert!(err.requires_reauthorization());
    browser.await??;

    assert!(!store.has_token("svc"));
    Ok(())
}

#[tokio::test]
async fn test_proxy_serves_authorized_rpc() -> Result<()> {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "pong"})))
        .mount(&upstream)
        .await;

    let temp = tempfile::tempdir()?;
    let store = Arc::new(FileTokenStore::new(temp.path()));
    store.save("svc", &TokenRecord::new("tok")).await?;

    let config = ProxyConfig::default().with_target(
        "svc",
        UpstreamTarget::new(
            format!("{}/mcp", upstream.uri()),
            OAuthDescriptor::new("https://a/authorize", "https://a/token", "c"),
        ),
    );
    let server = ProxyServer::new(config, AuthorizedCaller::new(TokenLifecycle::new(store)));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let (addr, handle) = server
        .run_with_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await?;

    let response: serde_json::Value = reqwest::Client::new()
        .post(format!("http://{}/servers/svc/rpc", addr))
        .json(&json!({"method": "ping"}))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(response, json!({"result": "pong"}));

    let _ = shutdown_tx.send(());
    handle.await??;
    Ok(())
}
