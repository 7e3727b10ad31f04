//! Portico Core - Foundation crate for the Portico login automation tool.
//!
//! This crate provides shared types, error handling, and configuration
//! management that all other Portico crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`types`] - Shared newtypes (`AttemptId`)
//!
//! # Example
//!
//! ```rust
//! use portico_core::AppConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert_eq!(config.attempts.max_attempts, 3);
//! println!("login url: {}", config.target.login_url);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, AttemptConfig, CertificateConfig, ClassifierRules, RemoteConfig, SolverConfig,
    TargetConfig, TimingConfig,
};
pub use error::{ConfigError, ConfigResult, PorticoError, Result};
pub use types::AttemptId;
