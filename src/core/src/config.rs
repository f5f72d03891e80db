//! Deployment configuration.
//!
//! Loaded from a YAML file (`config.yml` by default) with three sections:
//!
//! ```yaml
//! traefiker:
//!   name: web            # service identity, also the image tag
//!   cpus: "0-1"          # optional CPU set for the image build
//!   network: edge        # default network when docker.networks is empty
//! docker:
//!   ports: ["8000:80"]
//!   mounts: ["./data:/data"]
//!   restart: unless-stopped   # scalars are one-element lists
//! labels:
//!   traefik.http.routers.web.entrypoints: web
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{DeployError, Result};

/// Recognized keys of the multi-valued runtime map.
pub const RUNTIME_KEYS: &[&str] = &[
    "mounts",
    "ports",
    "networks",
    "links",
    "restart",
    "nanocpus",
    "memorylimit",
    "command",
];

/// Service identity and build settings (`traefiker` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name; doubles as the image tag and the instance name prefix
    pub name: String,
    /// CPU set passed to the image build
    pub cpus: Option<String>,
    /// Default network attachment
    pub network: Option<String>,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cpus: None,
            network: None,
        }
    }

    /// Build from a resolved string map. `name` is required.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let name = map
            .get("name")
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                DeployError::ConfigError("traefiker.name is required".to_string())
            })?;
        Ok(Self {
            name: name.trim().to_string(),
            cpus: map.get("cpus").filter(|v| !v.is_empty()).cloned(),
            network: map.get("network").filter(|v| !v.is_empty()).cloned(),
        })
    }
}

/// Multi-valued backend configuration (`docker` section).
///
/// Keys are case-insensitive and stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    entries: BTreeMap<String, Vec<String>>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// All values for `key`; empty when absent.
    pub fn get(&self, key: &str) -> &[String] {
        self.entries
            .get(&key.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First value for `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).first().map(String::as_str)
    }

    /// Replace all values for `key`.
    pub fn set<I, S>(&mut self, key: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.insert(
            key.to_lowercase(),
            values.into_iter().map(Into::into).collect(),
        );
    }

    /// Append one value to `key`.
    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        self.entries
            .entry(key.to_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<String>)> for RuntimeConfig {
    fn from_iter<T: IntoIterator<Item = (K, Vec<String>)>>(iter: T) -> Self {
        let mut config = RuntimeConfig::new();
        for (k, v) in iter {
            config.set(&k.into(), v);
        }
        config
    }
}

/// Complete deployment configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployConfig {
    pub service: ServiceConfig,
    pub runtime: RuntimeConfig,
    pub labels: HashMap<String, String>,
}

/// Raw file layout before normalization.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    traefiker: BTreeMap<String, Value>,
    #[serde(default)]
    docker: BTreeMap<String, Value>,
    #[serde(default)]
    labels: BTreeMap<String, Value>,
}

impl DeployConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from YAML text.
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(content)?;

        let service_map: HashMap<String, String> = raw
            .traefiker
            .iter()
            .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k.to_lowercase(), s)))
            .collect();
        let service = ServiceConfig::from_map(&service_map)?;

        let mut runtime = RuntimeConfig::new();
        for (key, value) in &raw.docker {
            let values = match value {
                Value::Sequence(items) => items.iter().filter_map(scalar_to_string).collect(),
                Value::Null => Vec::new(),
                other => scalar_to_string(other).into_iter().collect(),
            };
            if !RUNTIME_KEYS.contains(&key.to_lowercase().as_str()) {
                tracing::warn!(key = %key, "Unrecognized docker configuration key");
            }
            runtime.set(key, values);
        }

        if let Some(network) = &service.network {
            if runtime.get("networks").is_empty() {
                runtime.set("networks", [network.clone()]);
            }
        }

        let labels = raw
            .labels
            .iter()
            .filter_map(|(k, v)| scalar_to_string(v).map(|s| (normalize_label_key(k), s)))
            .collect();

        Ok(Self {
            service,
            runtime,
            labels,
        })
    }
}

/// Traefik expects `entryPoints` in camel case; lowercase spellings are fixed up.
fn normalize_label_key(key: &str) -> String {
    if key.contains("entrypoints") {
        key.replace("entrypoints", "entryPoints")
    } else {
        key.to_string()
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
