//! Traefiker Runtime - blue/green service rollover.
//!
//! This crate provides the deployment machinery behind Traefiker: execution
//! backends for containers and bare processes, image builds with build
//! context packaging, runtime spec resolution and the rollover orchestrator.

#![allow(clippy::result_large_err)]

pub mod backend;
pub mod build;
pub mod deploy;
pub mod proxy;
pub mod spec;

// Re-export common types
pub use backend::{DockerBackend, ExecutionBackend, ProcessBackend};
pub use build::{BuildOptions, ContextPackager, CredentialStore, ImageBuildApi, ImageBuilder};
pub use deploy::{DeployOutcome, DeployRequest, Deployer, VerifyPolicy};
pub use proxy::{start_proxy, ProxyOptions};
pub use spec::{LinkAliases, ResolveContext, RuntimeSpec};

/// Traefiker Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
