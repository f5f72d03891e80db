//! Edge proxy bootstrap.
//!
//! Replaces any running Traefik instance with a fresh `traefik:latest`
//! container that discovers services through the Docker provider. Every
//! requested port becomes an entrypoint named `port<N>`.

use std::collections::HashMap;
use std::path::Path;

use traefiker_core::error::{DeployError, Result};
use traefiker_core::RuntimeConfig;

use crate::backend::ExecutionBackend;
use crate::spec::{LinkAliases, ResolveContext, RuntimeSpec};

pub const PROXY_IMAGE: &str = "traefik:latest";
pub const PROXY_PULL_REFERENCE: &str = "docker.io/library/traefik:latest";
pub const PROXY_NETWORK: &str = "traefik";
pub const DOCKER_SOCKET_MOUNT: &str = "/var/run/docker.sock:/var/run/docker.sock";
pub const DASHBOARD_PORT: &str = "8080:8080";

const PROXY_NAME_PREFIX: &str = "traefik_";

const BASE_COMMAND: &[&str] = &[
    "traefik",
    "--providers.docker=true",
    "--global.checknewversion=false",
    "--global.sendanonymoususage=false",
    "--log.level=DEBUG",
    "--api=true",
    "--api.insecure=true",
];

/// Listener layout for the proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyOptions {
    /// Plain HTTP ports
    pub ports: Vec<u16>,
    /// HTTPS ports
    pub tls_ports: Vec<u16>,
    /// `http:https` redirect between a plain and a TLS port
    pub tls_redirect: Option<String>,
}

impl ProxyOptions {
    /// Runtime configuration for the proxy container, layered on `base`.
    pub fn runtime_config(&self, base: &RuntimeConfig) -> Result<RuntimeConfig> {
        let mut config = base.clone();
        config.set("command", BASE_COMMAND.iter().copied());
        config.push("networks", PROXY_NETWORK);
        config.push("mounts", DOCKER_SOCKET_MOUNT);
        config.push("ports", DASHBOARD_PORT);

        for port in &self.ports {
            config.push("ports", format!("{port}:{port}"));
            config.push("command", format!("--entrypoints.port{port}.address=:{port}"));
        }
        for port in &self.tls_ports {
            config.push("ports", format!("{port}:{port}"));
            config.push("command", format!("--entrypoints.port{port}.address=:{port}"));
            config.push("command", format!("--entrypoints.port{port}.https=true"));
        }

        if let Some(redirect) = &self.tls_redirect {
            let (from, to) = self.parse_redirect(redirect)?;
            config.push(
                "command",
                format!("--entrypoints.web.port{from}.redirections.entrypoint.to=port{to}"),
            );
            config.push(
                "command",
                format!("--entrypoints.web.port{from}.redirections.entrypoint.scheme=https"),
            );
        }

        Ok(config)
    }

    fn parse_redirect(&self, redirect: &str) -> Result<(u16, u16)> {
        let invalid = |reason: &str| {
            DeployError::ConfigError(format!("Invalid TLS redirect '{}': {}", redirect, reason))
        };

        let parts: Vec<&str> = redirect.split(':').collect();
        if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("expected 'port:tlsport'"));
        }
        let from: u16 = parts[0].parse().map_err(|_| invalid("source is not a port"))?;
        let to: u16 = parts[1].parse().map_err(|_| invalid("target is not a port"))?;

        if !self.ports.contains(&from) {
            return Err(invalid("source port is not defined with --port"));
        }
        if !self.tls_ports.contains(&to) {
            return Err(invalid("target port is not defined with --tlsport"));
        }
        Ok((from, to))
    }
}

/// Stop the running proxy, if any, and start a new one. Returns the new id.
pub async fn start_proxy(
    backend: &dyn ExecutionBackend,
    options: &ProxyOptions,
    base: &RuntimeConfig,
    workdir: &Path,
) -> Result<String> {
    let config = options.runtime_config(base)?;
    let spec = RuntimeSpec::resolve(
        PROXY_IMAGE,
        &config,
        &ResolveContext {
            workdir,
            aliases: &LinkAliases::new(),
        },
    )?;

    let running = backend.list().await?;
    let previous = running
        .iter()
        .find(|i| i.image == PROXY_IMAGE || i.primary_name().starts_with(PROXY_NAME_PREFIX));
    if let Some(previous) = previous {
        tracing::info!(id = %previous.id, names = ?previous.names, "Stopping running proxy");
        if let Err(e) = backend.stop(&previous.id).await {
            tracing::warn!(id = %previous.id, error = %e, "Failed to stop running proxy");
        }
    }

    tracing::debug!(config = ?config, "Proxy configuration");
    backend
        .run(PROXY_IMAGE, Some(PROXY_PULL_REFERENCE), &HashMap::new(), &spec)
        .await
}
