//! Configuration system for the ferry OAuth bridge.
//!
//! A single TOML file registers upstream servers and their OAuth
//! descriptors, plus settings for the local proxy and the redirect
//! listener. The server name doubles as the token identity.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    CONFIG_DIR_ENV, config_path_in, load_config, load_config_file, load_config_from_dir,
    save_config, token_dir, token_dir_in, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
