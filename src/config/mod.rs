//! Configuration module for the backend supervisor.
//!
//! This module handles parsing, validation, and access to configuration
//! settings. Configurations load from JSON (or YAML, chosen by file
//! extension) files or strings.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use backend_supervisor::config::Config;
//!
//! let config = Config::from_file("supervisor.json").unwrap();
//! println!("Backend served at {}", config.server.url());
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use backend_supervisor::config::{Config, LaunchConfig, SupervisorConfig};
//! use std::collections::HashMap;
//! use std::path::PathBuf;
//!
//! let config = Config {
//!     app: Default::default(),
//!     server: Default::default(),
//!     launch: LaunchConfig::Packaged {
//!         executable: PathBuf::from("resources/server/server"),
//!         args: vec![],
//!         working_dir: Some(PathBuf::from("resources")),
//!         env: HashMap::new(),
//!     },
//!     supervisor: SupervisorConfig {
//!         max_attempts: 3,
//!         ..Default::default()
//!     },
//!     storage: Default::default(),
//!     bridge: None,
//! };
//! backend_supervisor::config::validate_config(&config).unwrap();
//! ```
mod parser;
pub mod validator;

pub use parser::{
    AppConfig, AuthConfig, BearerAuthConfig, BridgeConfig, Config, DEFAULT_READINESS_MARKERS,
    DEFAULT_WORKERS, LaunchConfig, ServerConfig, StorageConfig, SupervisorConfig,
};
pub use validator::validate_config;
