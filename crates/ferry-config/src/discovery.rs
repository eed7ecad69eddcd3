//! Config file discovery, loading and saving.
//!
//! The config directory is `FERRY_CONFIG_DIR` when set, otherwise the
//! platform default (`~/.config/ferry` on Linux). It holds `config.toml`,
//! the `tokens/` directory and `logs/`.

use std::path::{Path, PathBuf};

use crate::{ConfigError, FerryConfig, Result};

/// Config filename within the config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for XDG directory resolution.
const APP_NAME: &str = "ferry";

/// Environment variable to override the config directory.
///
/// When set, this takes precedence over the platform default (XDG/Application Support).
pub const CONFIG_DIR_ENV: &str = "FERRY_CONFIG_DIR";

/// Load the user config. A missing file yields the default config.
pub fn load_config() -> Result<FerryConfig> {
    let dir = xdg_config_dir().ok_or(ConfigError::NoConfigDir)?;
    load_config_from_dir(&dir)
}

/// Load `config.toml` from an explicit config directory.
pub fn load_config_from_dir(dir: &Path) -> Result<FerryConfig> {
    let path = dir.join(USER_CONFIG_FILE);
    if !path.is_file() {
        return Ok(FerryConfig::default());
    }
    load_config_file(&path)
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<FerryConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    FerryConfig::from_toml(&contents)
}

/// Save configuration to a file.
///
/// Creates parent directories if they don't exist. The file may hold client
/// secrets, so on unix it is written owner-only (0600).
pub fn save_config(config: &FerryConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    write_private(path, contents.as_bytes()).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies when the file is created.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

/// Get the config file path for ferry.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| config_path_in(&d))
}

/// Get the config directory for ferry.
///
/// Checks `FERRY_CONFIG_DIR` env var first, then falls back to platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Default token directory.
pub fn token_dir() -> Option<PathBuf> {
    xdg_config_dir().map(|d| token_dir_in(&d))
}

/// `config.toml` within a config directory.
pub fn config_path_in(dir: &Path) -> PathBuf {
    dir.join(USER_CONFIG_FILE)
}

/// Token directory within a config directory.
pub fn token_dir_in(dir: &Path) -> PathBuf {
    dir.join(ferry_oauth::store::TOKEN_DIR)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerConfig;
    use ferry_oauth::OAuthDescriptor;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_xdg_config_path_exists() {
        // May be None in some CI environments
        if let Some(p) = xdg_config_path() {
            assert!(p.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_paths_within_dir() {
        let dir = Path::new("/etc/ferry");
        assert_eq!(config_path_in(dir), Path::new("/etc/ferry/config.toml"));
        assert_eq!(token_dir_in(dir), Path::new("/etc/ferry/tokens"));
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[servers.svc]
url = "https://svc.example.com"
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.server("svc").unwrap().url, "https://svc.example.com");
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_yields_default() {
        let dir = TempDir::new().unwrap();
        let config = load_config_from_dir(dir.path()).unwrap();
        assert_eq!(config, FerryConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");

        let mut config = FerryConfig::new();
        config
            .add_server(
                "svc",
                ServerConfig::new(
                    "https://svc.example.com",
                    OAuthDescriptor::new("https://a/authorize", "https://a/token", "c"),
                ),
                false,
            )
            .unwrap();

        save_config(&config, &config_path_in(&nested)).unwrap();
        assert_eq!(load_config_from_dir(&nested).unwrap(), config);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = config_path_in(dir.path());
        fs::write(&path, "").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        save_config(&FerryConfig::new(), &path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
