//! Durable per-identity token storage.
//!
//! One JSON record per identity. The store stamps `expires_at` and
//! `created_at` at save time and otherwise holds no business logic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{OAuthError, Result};
use crate::types::{TokenRecord, now_millis};

/// Default token directory name within the ferry config directory.
pub const TOKEN_DIR: &str = "tokens";

// ============================================================================
// TokenStore Trait
// ============================================================================

/// Storage for token records, addressed by identity name.
#[async_trait]
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Load the record for an identity, if one exists.
    async fn load(&self, identity: &str) -> Result<Option<TokenRecord>>;

    /// Persist a record, returning it as stored (with save-time fields stamped).
    async fn save(&self, identity: &str, record: &TokenRecord) -> Result<TokenRecord>;

    /// Delete the record. Returns whether one existed.
    async fn delete(&self, identity: &str) -> Result<bool>;

    /// Check if a record exists.
    fn has_token(&self, identity: &str) -> bool;
}

/// Shared token store for use across async contexts.
pub type SharedTokenStore = Arc<dyn TokenStore>;

/// Reject identity names that cannot safely name a file.
pub fn validate_identity(identity: &str) -> Result<()> {
    let invalid = identity.is_empty()
        || identity == "."
        || identity.contains("..")
        || identity.contains('/')
        || identity.contains('\\')
        || identity.chars().any(char::is_control);
    if invalid {
        return Err(OAuthError::InvalidIdentity(identity.to_string()));
    }
    Ok(())
}

// ============================================================================
// FileTokenStore
// ============================================================================

/// File-based token store: `<root>/<identity>.json`, owner-only permissions.
#[derive(Debug)]
pub struct FileTokenStore {
    root: PathBuf,
    locations: RwLock<HashMap<String, PathBuf>>,
}

impl FileTokenStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locations: RwLock::new(HashMap::new()),
        }
    }

    /// Persist one identity's record at an explicit path instead of under the root.
    pub fn with_location(self, identity: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.locations.write().insert(identity.into(), path.into());
        self
    }

    /// Root directory for records without an explicit location.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path backing an identity's record.
    pub fn path_for(&self, identity: &str) -> Result<PathBuf> {
        validate_identity(identity)?;
        if let Some(path) = self.locations.read().get(identity) {
            return Ok(path.clone());
        }
        Ok(self.root.join(format!("{}.json", identity)))
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self, identity: &str) -> Result<Option<TokenRecord>> {
        let path = self.path_for(identity)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| OAuthError::Storage(format!("Failed to read token file: {}", e)))?;

        let record: TokenRecord = serde_json::from_str(&content).map_err(|e| {
            OAuthError::Serialization(format!("Failed to parse token file: {}", e))
        })?;

        Ok(Some(record))
    }

    async fn save(&self, identity: &str, record: &TokenRecord) -> Result<TokenRecord> {
        let path = self.path_for(identity)?;

        let mut stored = record.clone();
        stored.stamp(now_millis());

        if let Some(parent) = path.parent() {
            create_private_dir(parent).map_err(|e| {
                OAuthError::Storage(format!("Failed to create token directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&stored).map_err(|e| {
            OAuthError::Serialization(format!("Failed to serialize token: {}", e))
        })?;

        let tmp = path.with_extension("json.tmp");
        write_private(&tmp, json.as_bytes())
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| OAuthError::Storage(format!("Failed to write token file: {}", e)))?;

        tracing::info!(identity, path = %path.display(), "Token saved");
        Ok(stored)
    }

    async fn delete(&self, identity: &str) -> Result<bool> {
        let path = self.path_for(identity)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .map_err(|e| OAuthError::Storage(format!("Failed to delete token file: {}", e)))?;
        tracing::info!(identity, "Token deleted");
        Ok(true)
    }

    fn has_token(&self, identity: &str) -> bool {
        self.path_for(identity).map(|p| p.exists()).unwrap_or(false)
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

// ============================================================================
// InMemoryTokenStore (for testing)
// ============================================================================

/// In-memory token store for testing.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    records: RwLock<HashMap<String, TokenRecord>>,
    save_count: std::sync::atomic::AtomicU32,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record verbatim, bypassing save-time stamping.
    pub fn with_record(self, identity: impl Into<String>, record: TokenRecord) -> Self {
        self.records.write().insert(identity.into(), record);
        self
    }

    pub fn save_count(&self) -> u32 {
        self.save_count.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self, identity: &str) -> Result<Option<TokenRecord>> {
        validate_identity(identity)?;
        Ok(self.records.read().get(identity).cloned())
    }

    async fn save(&self, identity: &str, record: &TokenRecord) -> Result<TokenRecord> {
        validate_identity(identity)?;
        let mut stored = record.clone();
        stored.stamp(now_millis());
        self.records
            .write()
            .insert(identity.to_string(), stored.clone());
        self.save_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(stored)
    }

    async fn delete(&self, identity: &str) -> Result<bool> {
        validate_identity(identity)?;
        Ok(self.records.write().remove(identity).is_some())
    }

    fn has_token(&self, identity: &str) -> bool {
        self.records.read().contains_key(identity)
    }
}
