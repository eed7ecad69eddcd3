//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [proxy]                  # local proxy listener
//! [callback]               # OAuth redirect listener
//! [servers.github]         # upstream server
//! [servers.github.oauth]   # its OAuth descriptor
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use ferry_oauth::{FileTokenStore, OAuthDescriptor};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Default proxy bind address.
pub const DEFAULT_PROXY_BIND: &str = "127.0.0.1:8790";

/// Default callback listener port.
pub const DEFAULT_CALLBACK_PORT: u16 = ferry_oauth::flow::DEFAULT_CALLBACK_PORT;

/// Default time to wait for the OAuth redirect.
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FerryConfig {
    /// Proxy server settings.
    pub proxy: ProxySettings,

    /// OAuth redirect listener settings.
    pub callback: CallbackSettings,

    /// Upstream servers keyed by name. The name is also the token identity.
    pub servers: BTreeMap<String, ServerConfig>,
}

impl FerryConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Look up a server by name.
    pub fn server(&self, name: &str) -> crate::Result<&ServerConfig> {
        self.servers
            .get(name)
            .ok_or_else(|| ConfigError::ServerNotFound(name.to_string()))
    }

    /// Register a server. Fails if the name is taken unless `replace` is set.
    pub fn add_server(
        &mut self,
        name: impl Into<String>,
        server: ServerConfig,
        replace: bool,
    ) -> crate::Result<()> {
        let name = name.into();
        validate_server(&name, &server)?;
        if !replace && self.servers.contains_key(&name) {
            return Err(ConfigError::ServerExists(name));
        }
        self.servers.insert(name, server);
        Ok(())
    }

    /// Remove a server, returning its entry.
    pub fn remove_server(&mut self, name: &str) -> crate::Result<ServerConfig> {
        self.servers
            .remove(name)
            .ok_or_else(|| ConfigError::ServerNotFound(name.to_string()))
    }

    /// Servers with `enabled = true`, sorted by name.
    pub fn enabled_servers(&self) -> impl Iterator<Item = (&str, &ServerConfig)> {
        self.servers
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(name, s)| (name.as_str(), s))
    }

    /// Check every server entry.
    pub fn validate(&self) -> crate::Result<()> {
        for (name, server) in &self.servers {
            validate_server(name, server)?;
        }
        Ok(())
    }

    /// Token store rooted at `token_dir`, honoring per-server `token_file` overrides.
    pub fn token_store(&self, token_dir: &Path) -> FileTokenStore {
        self.servers
            .iter()
            .filter_map(|(name, s)| s.oauth.token_file.as_ref().map(|path| (name, path)))
            .fold(FileTokenStore::new(token_dir), |store, (name, path)| {
                store.with_location(name.clone(), path.clone())
            })
    }
}

fn validate_server(name: &str, server: &ServerConfig) -> crate::Result<()> {
    let invalid = |reason: &str| ConfigError::InvalidServer {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if ferry_oauth::store::validate_identity(name).is_err() {
        return Err(invalid(
            "names must be non-empty and contain no path separators or '..'",
        ));
    }
    if server.url.trim().is_empty() {
        return Err(invalid("url is required"));
    }
    match url::Url::parse(&server.url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        Ok(parsed) => Err(invalid(&format!(
            "url scheme '{}' is not supported; use http or https",
            parsed.scheme()
        ))),
        Err(e) => Err(invalid(&format!("url is not absolute: {}", e))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Proxy / Callback
// ─────────────────────────────────────────────────────────────────────────────

/// Local proxy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Address to bind to.
    pub bind: String,
    /// Allow cross-origin requests.
    pub cors: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_PROXY_BIND.to_string(),
            cors: true,
        }
    }
}

/// OAuth redirect listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackSettings {
    pub port: u16,
    pub timeout_secs: u64,
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_CALLBACK_PORT,
            timeout_secs: DEFAULT_CALLBACK_TIMEOUT_SECS,
        }
    }
}

impl CallbackSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Servers
// ─────────────────────────────────────────────────────────────────────────────

/// One upstream server and how to authorize against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Endpoint that receives forwarded payloads.
    pub url: String,
    /// Whether this server is enabled. Defaults to true.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// OAuth descriptor (`[servers.<name>.oauth]`).
    #[serde(default)]
    pub oauth: OAuthDescriptor,
}

fn default_enabled() -> bool {
    true
}

impl ServerConfig {
    pub fn new(url: impl Into<String>, oauth: OAuthDescriptor) -> Self {
        Self {
            url: url.into(),
            enabled: true,
            oauth,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github() -> ServerConfig {
        ServerConfig::new(
            "https://api.example.com/mcp",
            OAuthDescriptor::new(
                "https://example.com/oauth/authorize",
                "https://example.com/oauth/token",
                "abc",
            )
            .with_scopes(["read", "write"]),
        )
    }

    #[test]
    fn test_empty_config() {
        let config = FerryConfig::new();
        assert!(config.servers.is_empty());
        assert_eq!(config.proxy.bind, DEFAULT_PROXY_BIND);
        assert!(config.proxy.cors);
        assert_eq!(config.callback.port, 8976);
        assert_eq!(config.callback.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_parse_full() {
        let toml = r#"
[proxy]
bind = "127.0.0.1:9000"
cors = false

[callback]
port = 9999
timeout_secs = 60

[servers.github]
url = "https://api.example.com/mcp"

[servers.github.oauth]
authorization_endpoint = "https://example.com/oauth/authorize"
token_endpoint = "https://example.com/oauth/token"
client_id = "abc"
client_secret = "shh"
scopes = ["read", "write"]
token_file = "/tmp/github.json"
"#;
        let config = FerryConfig::from_toml(toml).unwrap();
        assert_eq!(config.proxy.bind, "127.0.0.1:9000");
        assert!(!config.proxy.cors);
        assert_eq!(config.callback.port, 9999);

        let server = config.server("github").unwrap();
        assert!(server.enabled);
        assert_eq!(server.oauth.client_id, "abc");
        assert_eq!(server.oauth.secret(), Some("shh"));
        assert_eq!(server.oauth.scopes, vec!["read", "write"]);
        assert_eq!(
            server.oauth.token_file.as_deref(),
            Some(Path::new("/tmp/github.json"))
        );
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config = FerryConfig::from_toml("[callback]\nport = 1234\n").unwrap();
        assert_eq!(config.callback.port, 1234);
        assert_eq!(config.callback.timeout_secs, DEFAULT_CALLBACK_TIMEOUT_SECS);
        assert_eq!(config.proxy, ProxySettings::default());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = FerryConfig::new();
        config.add_server("github", github(), false).unwrap();
        config
            .add_server("local", github().with_enabled(false), false)
            .unwrap();

        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[servers.github.oauth]"));

        let parsed = FerryConfig::from_toml(&toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_add_server_conflict() {
        let mut config = FerryConfig::new();
        config.add_server("github", github(), false).unwrap();

        let err = config.add_server("github", github(), false).unwrap_err();
        assert!(matches!(err, ConfigError::ServerExists(ref n) if n == "github"));

        let replacement = ServerConfig::new("https://other.example.com", OAuthDescriptor::default());
        config.add_server("github", replacement, true).unwrap();
        assert_eq!(config.server("github").unwrap().url, "https://other.example.com");
    }

    #[test]
    fn test_add_server_rejects_bad_entries() {
        let mut config = FerryConfig::new();
        let err = config.add_server("../x", github(), false).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServer { .. }));

        let no_url = ServerConfig::new("  ", OAuthDescriptor::default());
        let err = config.add_server("svc", no_url, false).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServer { ref reason, .. } if reason.contains("url")));

        let no_scheme = ServerConfig::new("api.example.com/mcp", OAuthDescriptor::default());
        let err = config.add_server("svc", no_scheme, false).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServer { ref reason, .. } if reason.contains("not absolute")));

        let ftp = ServerConfig::new("ftp://files.example.com", OAuthDescriptor::default());
        let err = config.add_server("svc", ftp, false).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServer { ref reason, .. } if reason.contains("ftp")));
    }

    #[test]
    fn test_remove_server() {
        let mut config = FerryConfig::new();
        config.add_server("github", github(), false).unwrap();

        let removed = config.remove_server("github").unwrap();
        assert_eq!(removed, github());
        assert!(matches!(
            config.remove_server("github"),
            Err(ConfigError::ServerNotFound(_))
        ));
    }

    #[test]
    fn test_enabled_servers_sorted() {
        let mut config = FerryConfig::new();
        config.add_server("zeta", github(), false).unwrap();
        config
            .add_server("beta", github().with_enabled(false), false)
            .unwrap();
        config.add_server("alpha", github(), false).unwrap();

        let names: Vec<_> = config.enabled_servers().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_validate_catches_hand_edited_entries() {
        let config = FerryConfig::from_toml(
            r#"
[servers."bad/name"]
url = "https://example.com"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidServer { .. })
        ));
    }

    #[test]
    fn test_token_store_honors_overrides() {
        let mut config = FerryConfig::new();
        let mut server = github();
        server.oauth.token_file = Some("/var/lib/ferry/github.json".into());
        config.add_server("github", server, false).unwrap();
        config.add_server("plain", github(), false).unwrap();

        let store = config.token_store(Path::new("/home/u/.config/ferry/tokens"));
        assert_eq!(
            store.path_for("github").unwrap(),
            Path::new("/var/lib/ferry/github.json")
        );
        assert_eq!(
            store.path_for("plain").unwrap(),
            Path::new("/home/u/.config/ferry/tokens/plain.json")
        );
    }
}
