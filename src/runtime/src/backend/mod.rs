//! Execution backends.
//!
//! A backend lists, runs and stops instances on one execution substrate:
//! containers on a container engine ([`DockerBackend`]) or plain OS processes
//! ([`ProcessBackend`]). The deployment orchestrator only talks to this trait.

pub mod docker;
pub mod process;

use std::collections::HashMap;

use async_trait::async_trait;
use traefiker_core::error::Result;
use traefiker_core::{BackendKind, Instance};

use crate::build::ImageBuildApi;
use crate::spec::RuntimeSpec;

pub use docker::DockerBackend;
pub use process::ProcessBackend;

/// Trait for execution substrates.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Substrate this backend drives.
    fn kind(&self) -> BackendKind;

    /// Currently running instances.
    async fn list(&self) -> Result<Vec<Instance>>;

    /// Launch a new instance of `image` and return its id.
    ///
    /// `pull` names a registry reference to fetch before launching.
    async fn run(
        &self,
        image: &str,
        pull: Option<&str>,
        labels: &HashMap<String, String>,
        spec: &RuntimeSpec,
    ) -> Result<String>;

    /// Stop the instance with `id`.
    async fn stop(&self, id: &str) -> Result<()>;

    /// Image build capability, if this substrate builds its own artifacts.
    fn image_builder(&self) -> Option<&dyn ImageBuildApi> {
        None
    }
}
