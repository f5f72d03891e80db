//! Backend-neutral runtime specification.
//!
//! Resolves the multi-valued `docker` configuration map into a fully typed
//! [`RuntimeSpec`]. Resolution is pure: it touches neither the filesystem nor
//! the engine, and every malformed entry is rejected before a backend sees
//! anything.

pub mod template;

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use traefiker_core::error::{DeployError, Result};
use traefiker_core::RuntimeConfig;

pub use template::{render, LinkAliases};

/// Address every published port binds to.
pub const ANY_HOST_IP: &str = "0.0.0.0";

/// Publish `host_port` on the host for `container_port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
    /// Engine port key, e.g. `80/tcp`
    pub container_port: String,
}

/// Host directory bound into the instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindMount {
    pub source: String,
    pub target: String,
}

/// Primary network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkAttachment {
    pub name: String,
    pub aliases: Vec<String>,
    /// Rendered `name:alias` link entries
    pub links: Vec<String>,
}

/// Restart behaviour requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    #[default]
    Always,
    UnlessStopped,
    OnFailure,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Always => "always",
            Self::UnlessStopped => "unless-stopped",
            Self::OnFailure => "on-failure",
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestartPolicy {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "no" => Ok(Self::No),
            "always" => Ok(Self::Always),
            "unless-stopped" => Ok(Self::UnlessStopped),
            "on-failure" => Ok(Self::OnFailure),
            other => Err(DeployError::ConfigError(format!(
                "Unknown restart policy '{}' (expected no, always, unless-stopped or on-failure)",
                other
            ))),
        }
    }
}

/// CPU and memory ceilings; `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ResourceLimits {
    /// CPU quota in units of 1e-9 CPUs
    pub nano_cpus: Option<i64>,
    pub memory_bytes: Option<i64>,
}

/// Inputs the resolution needs besides the configuration itself.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Base for `./` mount sources
    pub workdir: &'a Path,
    pub aliases: &'a LinkAliases,
}

/// Fully resolved runtime parameters for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeSpec {
    hostname: String,
    ports: Vec<PortBinding>,
    exposed_ports: BTreeSet<String>,
    mounts: Vec<BindMount>,
    network: Option<NetworkAttachment>,
    restart: RestartPolicy,
    limits: ResourceLimits,
    command: Option<Vec<String>>,
}

impl RuntimeSpec {
    /// Resolve `config` for an instance of `image`.
    pub fn resolve(image: &str, config: &RuntimeConfig, ctx: &ResolveContext<'_>) -> Result<Self> {
        let short = short_image_name(image);

        let mounts = config
            .get("mounts")
            .iter()
            .map(|m| parse_mount(m, ctx.workdir))
            .collect::<Result<Vec<_>>>()?;

        let mut ports = Vec::new();
        let mut exposed_ports = BTreeSet::new();
        for entry in config.get("ports") {
            let binding = parse_port(entry)?;
            exposed_ports.insert(binding.container_port.clone());
            ports.push(binding);
        }

        let links = config
            .get("links")
            .iter()
            .map(|l| render(l, ctx.aliases))
            .collect::<Result<Vec<_>>>()?;

        let restart = match config.first("restart") {
            Some(value) if !value.trim().is_empty() => value.parse()?,
            _ => RestartPolicy::default(),
        };

        let limits = ResourceLimits {
            nano_cpus: parse_limit("nanocpus", config.first("nanocpus")),
            memory_bytes: parse_limit("memorylimit", config.first("memorylimit")),
        };

        let network = config.first("networks").map(|name| NetworkAttachment {
            name: name.to_string(),
            aliases: vec![short.to_string()],
            links: links.clone(),
        });
        if network.is_none() && !links.is_empty() {
            tracing::warn!(image, "Links configured without a network; ignoring them");
        }

        let command = Some(config.get("command").to_vec()).filter(|c| !c.is_empty());

        Ok(Self {
            hostname: short.to_string(),
            ports,
            exposed_ports,
            mounts,
            network,
            restart,
            limits,
            command,
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn ports(&self) -> &[PortBinding] {
        &self.ports
    }

    pub fn exposed_ports(&self) -> &BTreeSet<String> {
        &self.exposed_ports
    }

    pub fn mounts(&self) -> &[BindMount] {
        &self.mounts
    }

    pub fn network(&self) -> Option<&NetworkAttachment> {
        self.network.as_ref()
    }

    pub fn restart(&self) -> RestartPolicy {
        self.restart
    }

    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    pub fn command(&self) -> Option<&[String]> {
        self.command.as_deref()
    }
}

/// Image name up to the first `:`.
pub fn short_image_name(image: &str) -> &str {
    image.split(':').next().unwrap_or(image)
}

fn parse_mount(entry: &str, workdir: &Path) -> Result<BindMount> {
    let parts: Vec<&str> = entry.split(':').collect();
    if parts.len() != 2 {
        return Err(DeployError::ConfigError(format!(
            "Invalid mount '{}': expected 'source:target'",
            entry
        )));
    }

    let source = match parts[0].strip_prefix("./") {
        Some(rest) => format!("{}/{}", workdir.display(), rest),
        None => parts[0].to_string(),
    };
    Ok(BindMount {
        source,
        target: parts[1].to_string(),
    })
}

fn parse_port(entry: &str) -> Result<PortBinding> {
    let parts: Vec<&str> = entry.split(':').collect();
    if parts.len() != 2 {
        return Err(DeployError::ConfigError(format!(
            "Invalid port '{}': expected 'host:container'",
            entry
        )));
    }

    let host = parts[0].trim();
    if !is_port_or_range(host) {
        return Err(DeployError::ConfigError(format!(
            "Invalid port '{}': host port '{}' is not numeric",
            entry, host
        )));
    }

    let container = parts[1].trim();
    if !is_port_or_range(container) {
        return Err(DeployError::ConfigError(format!(
            "Invalid port '{}': container port '{}' is not numeric",
            entry, container
        )));
    }

    Ok(PortBinding {
        host_ip: ANY_HOST_IP.to_string(),
        host_port: host.to_string(),
        container_port: format!("{}/tcp", container),
    })
}

/// `80` or `8000-8010`.
fn is_port_or_range(value: &str) -> bool {
    match value.split_once('-') {
        Some((start, end)) => match (start.parse::<u16>(), end.parse::<u16>()) {
            (Ok(s), Ok(e)) => s <= e,
            _ => false,
        },
        None => value.parse::<u16>().is_ok(),
    }
}

fn parse_limit(key: &str, value: Option<&str>) -> Option<i64> {
    let value = value?.trim();
    match value.parse::<i64>() {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::debug!(key, value, error = %e, "Ignoring unparsable limit");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn resolve(config: &RuntimeConfig) -> Result<RuntimeSpec> {
        let workdir = PathBuf::from("/srv/app");
        let mut aliases = LinkAliases::new();
        aliases.insert("redis", "redis_abc");
        RuntimeSpec::resolve(
            "web:latest",
            config,
            &ResolveContext {
                workdir: &workdir,
                aliases: &aliases,
            },
        )
    }

    fn config(entries: &[(&str, &[&str])]) -> RuntimeConfig {
        entries
            .iter()
            .map(|(k, v)| (*k, v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_empty_config_defaults() {
        let spec = resolve(&RuntimeConfig::new()).unwrap();
        assert_eq!(spec.hostname(), "web");
        assert!(spec.ports().is_empty());
        assert!(spec.exposed_ports().is_empty());
        assert!(spec.mounts().is_empty());
        assert!(spec.network().is_none());
        assert_eq!(spec.restart(), RestartPolicy::Always);
        assert_eq!(spec.limits(), ResourceLimits::default());
        assert!(spec.command().is_none());
    }

    #[test]
    fn test_relative_mount_is_rewritten() {
        let spec = resolve(&config(&[("mounts", &["./data:/data", "/etc/ssl:/ssl"])])).unwrap();
        assert_eq!(
            spec.mounts(),
            &[
                BindMount {
                    source: "/srv/app/data".to_string(),
                    target: "/data".to_string()
                },
                BindMount {
                    source: "/etc/ssl".to_string(),
                    target: "/ssl".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_bad_mount_is_config_error() {
        for bad in ["a:b:c", "justone"] {
            let err = resolve(&config(&[("mounts", &[bad])])).unwrap_err();
            assert!(matches!(err, DeployError::ConfigError(_)), "{}", bad);
        }
    }

    #[test]
    fn test_ports() {
        let spec = resolve(&config(&[("ports", &["8000:80", "8443:443"])])).unwrap();
        assert_eq!(spec.ports().len(), 2);
        assert_eq!(spec.ports()[0].host_ip, "0.0.0.0");
        assert_eq!(spec.ports()[0].host_port, "8000");
        assert_eq!(spec.ports()[0].container_port, "80/tcp");
        assert!(spec.exposed_ports().contains("80/tcp"));
        assert!(spec.exposed_ports().contains("443/tcp"));
    }

    #[test]
    fn test_bad_ports_are_config_errors() {
        for bad in ["80", "1:2:3", "8000:http", "8000:80/udp", "abc:80", ":80", "70000:80"] {
            let err = resolve(&config(&[("ports", &[bad])])).unwrap_err();
            assert!(matches!(err, DeployError::ConfigError(_)), "{}", bad);
        }
    }

    #[test]
    fn test_port_range() {
        let spec = resolve(&config(&[("ports", &["9000-9001:9000-9001"])])).unwrap();
        assert_eq!(spec.ports()[0].container_port, "9000-9001/tcp");
    }

    #[test]
    fn test_network_alias_and_links() {
        let spec = resolve(&config(&[
            ("networks", &["edge", "internal"]),
            ("links", &["{{.redis}}:cache"]),
        ]))
        .unwrap();
        let network = spec.network().unwrap();
        assert_eq!(network.name, "edge");
        assert_eq!(network.aliases, vec!["web".to_string()]);
        assert_eq!(network.links, vec!["redis_abc:cache".to_string()]);
    }

    #[test]
    fn test_unknown_link_key_is_config_error() {
        let err = resolve(&config(&[("networks", &["edge"]), ("links", &["{{.mysql}}:db"])])).unwrap_err();
        assert!(matches!(err, DeployError::ConfigError(_)));
    }

    #[test]
    fn test_restart_policies() {
        let spec = resolve(&config(&[("restart", &["unless-stopped"])])).unwrap();
        assert_eq!(spec.restart(), RestartPolicy::UnlessStopped);
        let spec = resolve(&config(&[("restart", &["no"])])).unwrap();
        assert_eq!(spec.restart(), RestartPolicy::No);

        let err = resolve(&config(&[("restart", &["sometimes"])])).unwrap_err();
        assert!(matches!(err, DeployError::ConfigError(_)));
    }

    #[test]
    fn test_limits() {
        let spec = resolve(&config(&[("nanocpus", &["500000000"]), ("memorylimit", &["268435456"])])).unwrap();
        assert_eq!(spec.limits().nano_cpus, Some(500_000_000));
        assert_eq!(spec.limits().memory_bytes, Some(268_435_456));

        let spec = resolve(&config(&[("nanocpus", &["half"]), ("memorylimit", &["256m"])])).unwrap();
        assert_eq!(spec.limits(), ResourceLimits::default());
    }

    #[test]
    fn test_command() {
        let spec = resolve(&config(&[("command", &["server", "--port", "80"])])).unwrap();
        assert_eq!(
            spec.command(),
            Some(&["server".to_string(), "--port".to_string(), "80".to_string()][..])
        );
    }

    #[test]
    fn test_short_image_name() {
        assert_eq!(short_image_name("traefik:latest"), "traefik");
        assert_eq!(short_image_name("web"), "web");
    }

    #[test]
    fn test_restart_display_roundtrip() {
        for policy in [
            RestartPolicy::No,
            RestartPolicy::Always,
            RestartPolicy::UnlessStopped,
            RestartPolicy::OnFailure,
        ] {
            assert_eq!(policy.to_string().parse::<RestartPolicy>().unwrap(), policy);
        }
    }
}
