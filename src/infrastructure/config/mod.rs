//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading from the project's `.warden/` directory
//! - Environment variable overrides (`WARDEN_` prefix)
//! - Configuration validation

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
