//! Configuration system for Reportline clients.
//!
//! Provides TOML-based configuration with:
//! - Backend connection settings (`[server]`)
//! - Read coordination, liveness polling and expiry poll tuning
//! - Config file layering (user config dir + project-local overrides)
//! - `REPORTLINE_SERVER_URL` override of the backend URL

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, data_dir, load_config, load_config_file, load_config_with_options, save_config,
    user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
