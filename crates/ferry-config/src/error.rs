//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and editing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to write a config file.
    #[error("failed to write config file '{path}': {source}")]
    WriteFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No server registered under the name.
    #[error("server '{0}' not found; add it with 'ferry servers add {0}'")]
    ServerNotFound(String),

    /// A server is already registered under the name.
    #[error("server '{0}' already exists; pass --replace to overwrite it")]
    ServerExists(String),

    /// A server entry is unusable.
    #[error("invalid server '{name}': {reason}")]
    InvalidServer { name: String, reason: String },

    /// No platform config directory and no override.
    #[error("could not determine a config directory; set FERRY_CONFIG_DIR")]
    NoConfigDir,
}
