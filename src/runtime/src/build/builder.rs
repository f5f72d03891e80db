//! Image builder.
//!
//! Packages the build context, attaches registry credentials, submits the
//! build to the engine and drains the event stream. A build counts as
//! successful only when the engine reports a tagged image; a stream that ends
//! cleanly without that marker is still a failure.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use traefiker_core::error::{DeployError, Result};

use super::context::ContextPackager;
use super::credentials::{resolve_build_auth, CredentialStore, RegistryCredentials};
use super::event::BuildItem;

/// Stream of build items returned by the engine; may borrow the engine client.
pub type BuildStream<'a> = BoxStream<'a, Result<BuildItem>>;

/// Default Dockerfile location, relative to the build context.
pub const DEFAULT_DOCKERFILE: &str = "./Dockerfile";

/// Everything the engine needs for one build. Consumed by the submission.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Uncompressed tar archive of the build context
    pub context: Vec<u8>,
    /// Dockerfile path inside the context
    pub dockerfile: String,
    pub tags: Vec<String>,
    pub no_cache: bool,
    pub pull_parent: bool,
    /// Remove intermediate containers after the build
    pub remove_intermediate: bool,
    /// Registry URL -> credentials
    pub auth: HashMap<String, RegistryCredentials>,
    /// CPU set the build may use
    pub cpuset_cpus: Option<String>,
}

/// Engine-side image build capability.
#[async_trait]
pub trait ImageBuildApi: Send + Sync {
    /// Submit a build and return its event stream.
    async fn build_image<'a>(&'a self, request: BuildRequest) -> Result<BuildStream<'a>>;

    /// Point `target` at the image currently tagged `source`.
    async fn tag_image(&self, source: &str, target: &str) -> Result<()>;
}

/// Options for one build run.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Root of the build context; also where the Dockerfile is looked up
    pub context_dir: PathBuf,
    /// Dockerfile path relative to the context
    pub dockerfile: String,
    /// Tags for the new image; the first one is reported back
    pub tags: Vec<String>,
    pub cpus: Option<String>,
    pub no_cache: bool,
    pub pull_parent: bool,
}

impl BuildOptions {
    pub fn new(context_dir: impl Into<PathBuf>, tag: impl Into<String>) -> Self {
        Self {
            context_dir: context_dir.into(),
            dockerfile: DEFAULT_DOCKERFILE.to_string(),
            tags: vec![tag.into()],
            cpus: None,
            no_cache: false,
            pull_parent: false,
        }
    }
}

/// Builds images through an [`ImageBuildApi`].
pub struct ImageBuilder {
    packager: ContextPackager,
    credentials: Option<CredentialStore>,
}

impl ImageBuilder {
    pub fn new(credentials: Option<CredentialStore>) -> Self {
        Self {
            packager: ContextPackager::new(),
            credentials,
        }
    }

    /// Build an image and return its primary tag.
    pub async fn build(&mut self, api: &dyn ImageBuildApi, options: &BuildOptions) -> Result<String> {
        let tag = options
            .tags
            .first()
            .cloned()
            .ok_or_else(|| DeployError::BuildError("No image tag given".to_string()))?;

        let dockerfile_path = options.context_dir.join(&options.dockerfile);
        let auth = resolve_build_auth(self.credentials.as_ref(), &dockerfile_path)?;

        let context = self.packager.package_to_vec(&options.context_dir)?;
        tracing::info!(
            tag = %tag,
            context = %options.context_dir.display(),
            bytes = context.len(),
            "Building image"
        );

        let request = BuildRequest {
            context,
            dockerfile: options.dockerfile.clone(),
            tags: options.tags.clone(),
            no_cache: options.no_cache,
            pull_parent: options.pull_parent,
            remove_intermediate: true,
            auth,
            cpuset_cpus: options.cpus.clone().filter(|c| !c.is_empty()),
        };

        let stream = api.build_image(request).await?;
        drain_build_stream(stream).await?;

        for extra in options.tags.iter().skip(1) {
            api.tag_image(&tag, extra).await?;
        }

        tracing::info!(tag = %tag, "Build successful");
        Ok(tag)
    }
}

/// Consume a build stream; succeed only if the tagged marker was seen.
pub async fn drain_build_stream(mut stream: BuildStream<'_>) -> Result<()> {
    let mut tagged = false;

    while let Some(item) = stream.next().await {
        match item? {
            BuildItem::Event(event) => {
                let summary = event.summary();
                if !summary.is_empty() {
                    tracing::info!(target: "traefiker::build", "{}", summary);
                }
                if let Some(error) = &event.error {
                    tracing::warn!(target: "traefiker::build", error = %error, "Build reported an error");
                }
                if event.is_tagged() {
                    tagged = true;
                }
            }
            BuildItem::Malformed(line) => {
                tracing::debug!(line = %line, "Skipping undecodable build output");
            }
        }
    }

    if tagged {
        Ok(())
    } else {
        Err(DeployError::BuildError(
            "Build finished without a tagged image".to_string(),
        ))
    }
}
