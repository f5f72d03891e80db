//! Deployment orchestrator.
//!
//! One deployment runs `SNAPSHOT -> BUILD -> RUN_NEW -> VERIFY -> SWAP`:
//!
//! 1. Snapshot the running instances; every instance contributes a link alias.
//! 2. Build a fresh image when the backend can, otherwise deploy the
//!    configured program as is. Snapshot instances running that identity or
//!    named after the service are the ones to replace.
//! 3. Resolve the runtime spec and launch the new instance.
//! 4. Wait, then confirm exactly one new instance is running.
//! 5. Stop the previous instances.
//!
//! Any failure before step 5 leaves the previous instances untouched. There
//! is no rollback: a launched but unverified instance is left running for
//! inspection.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use traefiker_core::error::{DeployError, Result};
use traefiker_core::{DeployConfig, Instance, RuntimeConfig, ServiceConfig};

use crate::backend::ExecutionBackend;
use crate::build::{BuildOptions, CredentialStore, ImageBuilder, DEFAULT_DOCKERFILE};
use crate::spec::{LinkAliases, ResolveContext, RuntimeSpec};

/// How the new instance is confirmed after launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyPolicy {
    /// Delay before the first check
    pub settle: Duration,
    pub attempts: u32,
    /// Delay between further checks
    pub interval: Duration,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(2),
            attempts: 1,
            interval: Duration::from_secs(1),
        }
    }
}

/// Inputs for one deployment.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub service: ServiceConfig,
    pub runtime: RuntimeConfig,
    pub labels: HashMap<String, String>,
    /// Build context root and base for relative mounts
    pub workdir: PathBuf,
    /// Dockerfile path relative to `workdir`
    pub dockerfile: String,
    /// Registry reference to pull before launching
    pub pull: Option<String>,
}

impl DeployRequest {
    pub fn from_config(config: DeployConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            service: config.service,
            runtime: config.runtime,
            labels: config.labels,
            workdir: workdir.into(),
            dockerfile: DEFAULT_DOCKERFILE.to_string(),
            pull: None,
        }
    }
}

/// Result of a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub new_id: String,
    /// Previous instances that were stopped
    pub replaced: Vec<String>,
    /// Previous instances that failed to stop, with the reason
    pub stop_failures: Vec<(String, String)>,
}

/// Runs deployments against one backend.
pub struct Deployer {
    backend: Arc<dyn ExecutionBackend>,
    builder: ImageBuilder,
    verify: VerifyPolicy,
}

impl Deployer {
    pub fn new(backend: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            backend,
            builder: ImageBuilder::new(None),
            verify: VerifyPolicy::default(),
        }
    }

    /// Use `store` for registry credentials during builds.
    pub fn with_credentials(mut self, store: CredentialStore) -> Self {
        self.builder = ImageBuilder::new(Some(store));
        self
    }

    pub fn with_verify_policy(mut self, policy: VerifyPolicy) -> Self {
        self.verify = policy;
        self
    }

    /// Deploy the service described by `request`.
    pub async fn deploy(&mut self, request: &DeployRequest) -> Result<DeployOutcome> {
        let service = request.service.name.as_str();

        // SNAPSHOT
        let snapshot = self.backend.list().await?;
        let aliases = LinkAliases::from_instances(&snapshot);
        tracing::info!(
            service,
            backend = %self.backend.kind(),
            running = snapshot.len(),
            "Snapshot taken"
        );

        // BUILD
        let image = match self.backend.image_builder() {
            Some(api) => {
                let mut options = BuildOptions::new(&request.workdir, service);
                options.dockerfile = request.dockerfile.clone();
                options.cpus = request.service.cpus.clone();
                self.builder.build(api, &options).await?
            }
            None => request
                .runtime
                .first("command")
                .map(str::to_string)
                .ok_or_else(|| {
                    DeployError::ConfigError(format!(
                        "No command configured for {} on the {} backend",
                        service,
                        self.backend.kind()
                    ))
                })?,
        };

        // Previous instances carry either the service name or the deployed
        // identity; programs are listed under their executable name.
        let old = previous_instances(&snapshot, service, &image);
        tracing::info!(service, image = %image, previous = old.len(), "Previous instances selected");

        // RUN_NEW
        let spec = RuntimeSpec::resolve(
            &image,
            &request.runtime,
            &ResolveContext {
                workdir: &request.workdir,
                aliases: &aliases,
            },
        )?;
        let new_id = self
            .backend
            .run(&image, request.pull.as_deref(), &request.labels, &spec)
            .await?;
        tracing::info!(service, image = %image, id = %new_id, "New instance launched");

        // VERIFY
        let verified = self.verify_new_instance(&image, &old).await?;
        if verified.id != new_id {
            tracing::debug!(launched = %new_id, listed = %verified.id, "Listed id differs from launch id");
        }

        // SWAP
        let mut replaced = Vec::new();
        let mut stop_failures = Vec::new();
        for id in old {
            tracing::info!(id = %id, "Stopping previous instance");
            match self.backend.stop(&id).await {
                Ok(()) => replaced.push(id),
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "Failed to stop previous instance");
                    stop_failures.push((id, e.to_string()));
                }
            }
        }

        tracing::info!(
            service,
            id = %new_id,
            replaced = replaced.len(),
            failed = stop_failures.len(),
            "Deployment complete"
        );
        Ok(DeployOutcome {
            new_id,
            replaced,
            stop_failures,
        })
    }

    /// Find the single instance of `image` that was not running before.
    async fn verify_new_instance(&self, image: &str, old: &[String]) -> Result<Instance> {
        let old: HashSet<&str> = old.iter().map(String::as_str).collect();
        let attempts = self.verify.attempts.max(1);
        let mut found = 0;

        for attempt in 0..attempts {
            let delay = if attempt == 0 {
                self.verify.settle
            } else {
                self.verify.interval
            };
            tokio::time::sleep(delay).await;

            let listed = match self.backend.list().await {
                Ok(listed) => listed,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Listing failed during verification");
                    continue;
                }
            };

            let mut candidates: Vec<Instance> = listed
                .into_iter()
                .filter(|i| i.image == image && !old.contains(i.id.as_str()))
                .collect();
            found = candidates.len();
            if found == 1 {
                if let Some(instance) = candidates.pop() {
                    return Ok(instance);
                }
            }
            tracing::debug!(attempt, found, image, "New instance not confirmed yet");
        }

        Err(DeployError::VerifyError(format!(
            "container is not running ({} new instances of {} found)",
            found, image
        )))
    }
}

/// Ids in `snapshot` that the deployment of `image` for `service` replaces.
fn previous_instances(snapshot: &[Instance], service: &str, image: &str) -> Vec<String> {
    snapshot
        .iter()
        .filter(|i| i.image == image || i.belongs_to(service))
        .map(|i| i.id.clone())
        .collect()
}
