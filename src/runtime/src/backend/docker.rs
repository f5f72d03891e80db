//! Container engine backend.
//!
//! Talks to the local Docker daemon through `bollard`. Containers are named
//! `<short image>_<suffix>`, where the suffix is the launch time in
//! nanoseconds written in base 32, so every rollover gets a fresh name while
//! the service prefix stays recognizable.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, NetworkingConfig,
    StartContainerOptions,
};
use bollard::image::{BuildImageOptions, CreateImageOptions, TagImageOptions};
use bollard::models::{
    ContainerSummary, EndpointSettings, HostConfig, Mount, MountTypeEnum, PortBinding,
    RestartPolicy as EngineRestartPolicy, RestartPolicyNameEnum,
};
use bollard::Docker;
use futures::StreamExt;
use traefiker_core::error::{DeployError, Result};
use traefiker_core::{BackendKind, Instance};

use super::ExecutionBackend;
use crate::build::{BuildEvent, BuildItem, BuildRequest, BuildStream, ImageBuildApi, RegistryCredentials};
use crate::spec::{short_image_name, RestartPolicy, RuntimeSpec};

/// Backend for containers on the local Docker daemon.
pub struct DockerBackend {
    docker: Docker,
}

impl DockerBackend {
    /// Connect to the daemon using the environment's defaults
    /// (`DOCKER_HOST` or the local socket).
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            DeployError::BackendError(format!("Failed to connect to Docker: {}", e))
        })?;
        Ok(Self { docker })
    }

    /// Wrap an existing client.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    async fn pull(&self, image: &str, reference: &str) -> Result<()> {
        tracing::info!(reference, "Pulling image");

        let options = CreateImageOptions {
            from_image: reference,
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::debug!(status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    return Err(DeployError::LaunchError {
                        image: image.to_string(),
                        message: format!("Failed to pull {}: {}", reference, e),
                    });
                }
            }
        }

        tracing::info!(reference, "Image pulled");
        Ok(())
    }
}

#[async_trait]
impl ExecutionBackend for DockerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Container
    }

    async fn list(&self) -> Result<Vec<Instance>> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| DeployError::BackendError(format!("Failed to list containers: {}", e)))?;

        Ok(containers.into_iter().map(instance_from_summary).collect())
    }

    async fn run(
        &self,
        image: &str,
        pull: Option<&str>,
        labels: &HashMap<String, String>,
        spec: &RuntimeSpec,
    ) -> Result<String> {
        if let Some(reference) = pull {
            self.pull(image, reference).await?;
        }

        let name = container_name(image, chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default());
        let config = container_config(image, labels, spec);
        let launch_error = |e: bollard::errors::Error| DeployError::LaunchError {
            image: image.to_string(),
            message: e.to_string(),
        };

        let options = CreateContainerOptions {
            name: name.clone(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(launch_error)?;
        for warning in &response.warnings {
            tracing::warn!(container = %name, warning = %warning, "Engine warning");
        }

        self.docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(launch_error)?;

        tracing::info!(container = %name, id = %response.id, image, "Container started");
        Ok(response.id)
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.docker
            .stop_container(id, None)
            .await
            .map_err(|e| DeployError::StopError {
                id: id.to_string(),
                message: e.to_string(),
            })?;
        tracing::debug!(id, "Container stopped");
        Ok(())
    }

    fn image_builder(&self) -> Option<&dyn ImageBuildApi> {
        Some(self)
    }
}

#[async_trait]
impl ImageBuildApi for DockerBackend {
    async fn build_image<'a>(&'a self, request: BuildRequest) -> Result<BuildStream<'a>> {
        let options = BuildImageOptions {
            dockerfile: request.dockerfile,
            t: request.tags.first().cloned().unwrap_or_default(),
            nocache: request.no_cache,
            pull: request.pull_parent,
            rm: request.remove_intermediate,
            cpusetcpus: request.cpuset_cpus.unwrap_or_default(),
            ..Default::default()
        };
        let credentials = engine_credentials(request.auth);

        let stream = self
            .docker
            .build_image(options, Some(credentials), Some(request.context.into()))
            .map(|item| match item {
                Ok(info) => Ok(BuildItem::Event(BuildEvent {
                    status: info.status,
                    stream: info.stream,
                    progress: info.progress,
                    error: info.error,
                })),
                Err(bollard::errors::Error::JsonDataError { message, .. }) => {
                    Ok(BuildItem::Malformed(message))
                }
                Err(e) => Err(DeployError::BuildError(e.to_string())),
            });

        Ok(stream.boxed())
    }

    async fn tag_image(&self, source: &str, target: &str) -> Result<()> {
        let (repo, tag) = split_tag(target);
        let options = TagImageOptions { repo, tag };
        self.docker
            .tag_image(source, Some(options))
            .await
            .map_err(|e| DeployError::BuildError(format!("Failed to tag {} as {}: {}", source, target, e)))
    }
}

/// `<short image>_<nanos in base 32>`.
pub fn container_name(image: &str, nanos: i64) -> String {
    format!("{}_{}", short_image_name(image), to_base32(nanos.unsigned_abs()))
}

fn to_base32(mut n: u64) -> String {
    const DIGITS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 32) as usize]);
        n /= 32;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Split `repo:tag`, defaulting the tag to `latest`. A `:` inside the
/// registry host (`host:5000/repo`) is not a tag separator.
fn split_tag(reference: &str) -> (&str, &str) {
    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (reference, "latest"),
    }
}

fn engine_credentials(
    auth: HashMap<String, RegistryCredentials>,
) -> HashMap<String, DockerCredentials> {
    auth.into_iter()
        .map(|(url, creds)| {
            let engine = DockerCredentials {
                username: Some(creds.username),
                password: Some(creds.password),
                serveraddress: Some(url.clone()),
                ..Default::default()
            };
            (url, engine)
        })
        .collect()
}

fn instance_from_summary(summary: ContainerSummary) -> Instance {
    Instance {
        id: summary.id.unwrap_or_default(),
        image: summary.image.unwrap_or_default(),
        names: summary
            .names
            .unwrap_or_default()
            .into_iter()
            .map(|n| n.trim_start_matches('/').to_string())
            .collect(),
        backend: BackendKind::Container,
    }
}

fn engine_restart_policy(policy: RestartPolicy) -> EngineRestartPolicy {
    let name = match policy {
        RestartPolicy::No => RestartPolicyNameEnum::NO,
        RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
        RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
    };
    EngineRestartPolicy {
        name: Some(name),
        maximum_retry_count: None,
    }
}

/// Translate a resolved spec into engine create parameters.
pub fn container_config(
    image: &str,
    labels: &HashMap<String, String>,
    spec: &RuntimeSpec,
) -> Config<String> {
    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    for binding in spec.ports() {
        port_bindings
            .entry(binding.container_port.clone())
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(PortBinding {
                host_ip: Some(binding.host_ip.clone()),
                host_port: Some(binding.host_port.clone()),
            });
    }

    let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
        .exposed_ports()
        .iter()
        .map(|p| (p.clone(), HashMap::new()))
        .collect();

    let mounts: Vec<Mount> = spec
        .mounts()
        .iter()
        .map(|m| Mount {
            source: Some(m.source.clone()),
            target: Some(m.target.clone()),
            typ: Some(MountTypeEnum::BIND),
            ..Default::default()
        })
        .collect();

    let limits = spec.limits();
    let host_config = HostConfig {
        restart_policy: Some(engine_restart_policy(spec.restart())),
        network_mode: spec.network().map(|n| n.name.clone()),
        nano_cpus: limits.nano_cpus,
        memory: limits.memory_bytes,
        mounts: Some(mounts).filter(|m| !m.is_empty()),
        port_bindings: Some(port_bindings).filter(|p| !p.is_empty()),
        ..Default::default()
    };

    let networking_config = spec.network().map(|network| {
        let endpoint = EndpointSettings {
            aliases: Some(network.aliases.clone()),
            links: Some(network.links.clone()).filter(|l| !l.is_empty()),
            ..Default::default()
        };
        NetworkingConfig {
            endpoints_config: HashMap::from([(network.name.clone(), endpoint)]),
        }
    });

    Config {
        image: Some(image.to_string()),
        hostname: Some(spec.hostname().to_string()),
        labels: Some(labels.clone()),
        exposed_ports: Some(exposed_ports).filter(|p| !p.is_empty()),
        cmd: spec.command().map(<[String]>::to_vec),
        host_config: Some(host_config),
        networking_config,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{LinkAliases, ResolveContext};
    use std::path::Path;
    use traefiker_core::RuntimeConfig;

    fn spec(entries: &[(&str, &[&str])]) -> RuntimeSpec {
        let config: RuntimeConfig = entries
            .iter()
            .map(|(k, v)| (*k, v.iter().map(|s| s.to_string()).collect()))
            .collect();
        let mut aliases = LinkAliases::new();
        aliases.insert("redis", "redis_abc");
        RuntimeSpec::resolve(
            "web",
            &config,
            &ResolveContext {
                workdir: Path::new("/srv"),
                aliases: &aliases,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_container_name() {
        assert_eq!(container_name("web:latest", 32), "web_10");
        assert_eq!(container_name("web", 0), "web_0");
        assert_eq!(container_name("traefik:latest", 31), "traefik_v");
    }

    #[test]
    fn test_base32_matches_radix() {
        let n: u64 = 1_700_000_000_123_456_789;
        assert_eq!(u64::from_str_radix(&to_base32(n), 32).unwrap(), n);
    }

    #[test]
    fn test_split_tag() {
        assert_eq!(split_tag("web:stable"), ("web", "stable"));
        assert_eq!(split_tag("web"), ("web", "latest"));
        assert_eq!(split_tag("localhost:5000/web"), ("localhost:5000/web", "latest"));
        assert_eq!(split_tag("localhost:5000/web:v2"), ("localhost:5000/web", "v2"));
    }

    #[test]
    fn test_container_config_full() {
        let spec = spec(&[
            ("ports", &["8000:80", "8001:80"]),
            ("mounts", &["./data:/data"]),
            ("networks", &["edge"]),
            ("links", &["{{.redis}}:cache"]),
            ("restart", &["on-failure"]),
            ("nanocpus", &["1000000000"]),
            ("memorylimit", &["1048576"]),
            ("command", &["serve", "--verbose"]),
        ]);
        let labels = HashMap::from([("traefik.enable".to_string(), "true".to_string())]);
        let config = container_config("web", &labels, &spec);

        assert_eq!(config.image.as_deref(), Some("web"));
        assert_eq!(config.hostname.as_deref(), Some("web"));
        assert_eq!(config.labels, Some(labels));
        assert_eq!(
            config.cmd,
            Some(vec!["serve".to_string(), "--verbose".to_string()])
        );
        assert!(config.exposed_ports.unwrap().contains_key("80/tcp"));

        let host = config.host_config.unwrap();
        assert_eq!(host.network_mode.as_deref(), Some("edge"));
        assert_eq!(host.nano_cpus, Some(1_000_000_000));
        assert_eq!(host.memory, Some(1_048_576));
        assert_eq!(
            host.restart_policy.unwrap().name,
            Some(RestartPolicyNameEnum::ON_FAILURE)
        );
        let bindings = host.port_bindings.unwrap();
        let web = bindings.get("80/tcp").unwrap().as_ref().unwrap();
        assert_eq!(web.len(), 2);
        assert_eq!(web[0].host_ip.as_deref(), Some("0.0.0.0"));
        assert_eq!(web[0].host_port.as_deref(), Some("8000"));
        let mounts = host.mounts.unwrap();
        assert_eq!(mounts[0].source.as_deref(), Some("/srv/data"));
        assert_eq!(mounts[0].typ, Some(MountTypeEnum::BIND));

        let endpoints = config.networking_config.unwrap().endpoints_config;
        let edge = endpoints.get("edge").unwrap();
        assert_eq!(edge.aliases, Some(vec!["web".to_string()]));
        assert_eq!(edge.links, Some(vec!["redis_abc:cache".to_string()]));
    }

    #[test]
    fn test_container_config_minimal() {
        let config = container_config("web", &HashMap::new(), &spec(&[]));
        assert!(config.cmd.is_none());
        assert!(config.exposed_ports.is_none());
        assert!(config.networking_config.is_none());
        let host = config.host_config.unwrap();
        assert!(host.network_mode.is_none());
        assert!(host.port_bindings.is_none());
        assert!(host.nano_cpus.is_none());
        assert_eq!(
            host.restart_policy.unwrap().name,
            Some(RestartPolicyNameEnum::ALWAYS)
        );
    }

    #[test]
    fn test_instance_from_summary_strips_slash() {
        let summary = ContainerSummary {
            id: Some("abc".to_string()),
            image: Some("web".to_string()),
            names: Some(vec!["/web_1a2b".to_string()]),
            ..Default::default()
        };
        let instance = instance_from_summary(summary);
        assert_eq!(instance.names, vec!["web_1a2b".to_string()]);
        assert_eq!(instance.backend, BackendKind::Container);
        assert!(instance.belongs_to("web"));
    }

    #[test]
    fn test_engine_credentials() {
        let auth = HashMap::from([(
            "quay.io".to_string(),
            RegistryCredentials {
                registry_url: "quay.io".to_string(),
                username: "u".to_string(),
                password: "p".to_string(),
            },
        )]);
        let engine = engine_credentials(auth);
        let quay = engine.get("quay.io").unwrap();
        assert_eq!(quay.username.as_deref(), Some("u"));
        assert_eq!(quay.serveraddress.as_deref(), Some("quay.io"));
    }
}
