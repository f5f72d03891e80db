//! Traefiker Core - Foundational Types and Abstractions
//!
//! This module provides the error taxonomy, the instance model shared by all
//! execution backends, and the deployment configuration consumed by the
//! runtime and the CLI.

pub mod config;
pub mod error;
pub mod instance;

// Re-export commonly used types
pub use config::{DeployConfig, RuntimeConfig, ServiceConfig};
pub use error::{DeployError, Result};
pub use instance::{BackendKind, Instance};

/// Traefiker version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
