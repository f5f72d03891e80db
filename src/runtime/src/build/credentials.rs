//! Registry credentials for image builds.
//!
//! Stores per-registry credentials at `~/.traefiker/auth/credentials.json`,
//! keyed by a short alias (`dockerhub`, `quay`). Uses atomic writes (write
//! tmp, rename) for safety.
//!
//! The alias for a build is picked from the Dockerfile's base image by
//! substring: a reference mentioning a known mirror uses that mirror's entry,
//! everything else uses the default registry. A missing entry is not an
//! error; the build goes out unauthenticated and only private base images
//! fail, at pull time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use traefiker_core::error::{DeployError, Result};

use super::dockerfile::read_base_image;

/// Alias used when no mirror matches.
pub const DEFAULT_REGISTRY_ALIAS: &str = "dockerhub";

/// `(substring of the base image, alias)` pairs, checked in order.
pub const MIRROR_ALIASES: &[(&str, &str)] = &[("quay", "quay")];

/// Server addresses of the well-known aliases.
pub const KNOWN_REGISTRIES: &[(&str, &str)] = &[
    ("dockerhub", "https://index.docker.io/v1/"),
    ("quay", "quay.io"),
];

/// Server address for a well-known alias.
pub fn known_registry_url(alias: &str) -> Option<&'static str> {
    let alias = normalize_alias(alias);
    KNOWN_REGISTRIES
        .iter()
        .find(|(name, _)| *name == alias)
        .map(|(_, url)| *url)
}

/// Credentials for one registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredentials {
    /// Server address the engine authenticates against
    pub registry_url: String,
    pub username: String,
    pub password: String,
}

/// Persistent credential file format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    registries: HashMap<String, RegistryCredentials>,
}

/// Persistent credential store for container registries.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Create a credential store at the default path (`~/.traefiker/auth/credentials.json`).
    pub fn default_path() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            DeployError::ConfigError(
                "Cannot determine home directory for credential store".to_string(),
            )
        })?;
        Ok(Self {
            path: home.join(".traefiker").join("auth").join("credentials.json"),
        })
    }

    /// Create a credential store at a custom path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store credentials under `alias`. Overwrites existing entry.
    pub fn store(&self, alias: &str, credentials: RegistryCredentials) -> Result<()> {
        let mut file = self.load()?;
        file.registries.insert(normalize_alias(alias), credentials);
        self.save(&file)
    }

    /// Get credentials stored under `alias`.
    pub fn get(&self, alias: &str) -> Result<Option<RegistryCredentials>> {
        let file = self.load()?;
        Ok(file.registries.get(&normalize_alias(alias)).cloned())
    }

    /// Remove credentials for `alias`. Returns true if entry existed.
    pub fn remove(&self, alias: &str) -> Result<bool> {
        let mut file = self.load()?;
        let removed = file.registries.remove(&normalize_alias(alias)).is_some();
        if removed {
            self.save(&file)?;
        }
        Ok(removed)
    }

    /// Load the credential file from disk. Returns empty if not found.
    fn load(&self) -> Result<CredentialFile> {
        if !self.path.exists() {
            return Ok(CredentialFile::default());
        }
        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            DeployError::ConfigError(format!(
                "Failed to read credential store {}: {}",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            DeployError::ConfigError(format!(
                "Failed to parse credential store {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Save the credential file to disk atomically (write tmp, rename).
    fn save(&self, file: &CredentialFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        let data = serde_json::to_string_pretty(file)?;
        std::fs::write(&tmp_path, &data)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn normalize_alias(alias: &str) -> String {
    alias.trim().to_lowercase()
}

/// Pick the credential alias for a base image reference.
pub fn registry_alias_for(image: &str) -> &'static str {
    MIRROR_ALIASES
        .iter()
        .find(|(needle, _)| image.contains(needle))
        .map(|(_, alias)| *alias)
        .unwrap_or(DEFAULT_REGISTRY_ALIAS)
}

/// Resolve the auth set for building from `dockerfile`.
///
/// Fails only when the Dockerfile itself cannot be read or has no `FROM`.
/// Any credential lookup problem yields an empty set.
pub fn resolve_build_auth(
    store: Option<&CredentialStore>,
    dockerfile: &Path,
) -> Result<HashMap<String, RegistryCredentials>> {
    let base = read_base_image(dockerfile)?;
    let alias = registry_alias_for(&base);

    let found = match store.map(|s| s.get(alias)) {
        Some(Ok(found)) => found,
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Credential store unreadable");
            None
        }
        None => None,
    };

    let mut auth = HashMap::new();
    match found {
        Some(credentials) => {
            tracing::debug!(base = %base, alias, registry = %credentials.registry_url, "Using registry credentials");
            auth.insert(credentials.registry_url.clone(), credentials);
        }
        None => {
            tracing::info!(base = %base, alias, "No registry credentials, building unauthenticated");
        }
    }
    Ok(auth)
}
