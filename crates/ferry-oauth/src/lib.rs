//! OAuth 2.0 PKCE token lifecycle engine for headless upstream access.
//!
//! Lets a local process that cannot run a browser-based login act on behalf
//! of a user against OAuth-protected upstream servers: interactive
//! authorization once per identity, durable per-identity token records, and
//! transparent refresh before every authorized call.
//!
//! # Components
//!
//! - [`pkce`] — PKCE parameters, authorization URL, code-for-token exchange
//! - [`callback`] — One-shot local listener for the redirect, plus manual entry
//! - [`store`] — Per-identity token persistence
//! - [`lifecycle`] — Expiry evaluation and refresh-token exchange
//! - [`caller`] — Authorized upstream calls with status classification
//! - [`flow`] — Interactive authorization tying the above together
//! - [`proxy`] — Axum-based localhost proxy server

pub mod callback;
pub mod caller;
pub mod error;
pub mod flow;
pub mod lifecycle;
pub mod pkce;
pub mod proxy;
pub mod store;
pub mod types;

pub use callback::{CallbackListener, CallbackParams, CallbackState, ListeningCallback};
pub use caller::{AuthorizedCaller, UpstreamRequest, UpstreamResponse};
pub use error::{OAuthError, Result};
pub use flow::{AuthorizationFlow, CallbackMode, PendingAuthorization};
pub use lifecycle::{TokenLifecycle, TokenStatus, is_expired};
pub use pkce::{PkceParams, TokenExchangeResult};
pub use proxy::{ProxyConfig, ProxyServer, UpstreamTarget};
pub use store::{FileTokenStore, InMemoryTokenStore, SharedTokenStore, TokenStore};
pub use types::{OAuthDescriptor, TokenRecord};
