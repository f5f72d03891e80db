//! `traefiker deploy` command - Build and roll over the configured service.

use std::path::Path;
use std::time::Duration;

use clap::Args;
use traefiker_core::error::Result;
use traefiker_core::DeployConfig;
use traefiker_runtime::build::DEFAULT_DOCKERFILE;
use traefiker_runtime::{CredentialStore, DeployRequest, Deployer, VerifyPolicy};

use super::{open_backend, working_dir, Mode};

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Dockerfile path relative to the working directory
    #[arg(long, default_value = DEFAULT_DOCKERFILE)]
    pub dockerfile: String,

    /// Registry reference to pull before launching
    #[arg(long)]
    pub pull: Option<String>,

    /// Seconds to wait before checking the new instance
    #[arg(long, default_value_t = 2)]
    pub settle: u64,

    /// Number of checks before giving up on the new instance
    #[arg(long, default_value_t = 1)]
    pub verify_attempts: u32,
}

impl Default for DeployArgs {
    fn default() -> Self {
        Self {
            dockerfile: DEFAULT_DOCKERFILE.to_string(),
            pull: None,
            settle: 2,
            verify_attempts: 1,
        }
    }
}

impl DeployArgs {
    fn verify_policy(&self) -> VerifyPolicy {
        VerifyPolicy {
            settle: Duration::from_secs(self.settle),
            attempts: self.verify_attempts,
            ..VerifyPolicy::default()
        }
    }
}

/// Load the configuration and assemble the deployment request.
fn load_request(config: &Path, workdir: &Path, args: &DeployArgs) -> Result<DeployRequest> {
    tracing::info!(path = %config.display(), "Reading configuration");
    let config = DeployConfig::load(config)?;

    let mut request = DeployRequest::from_config(config, workdir);
    request.dockerfile = args.dockerfile.clone();
    request.pull = args.pull.clone();
    Ok(request)
}

pub async fn execute(mode: Mode, config: &Path, args: DeployArgs) -> Result<()> {
    let workdir = working_dir()?;
    let request = load_request(config, &workdir, &args)?;

    let backend = open_backend(mode)?;
    let mut deployer = Deployer::new(backend).with_verify_policy(args.verify_policy());
    match CredentialStore::default_path() {
        Ok(store) => deployer = deployer.with_credentials(store),
        Err(e) => tracing::warn!(error = %e, "Registry credentials unavailable"),
    }

    let outcome = deployer.deploy(&request).await?;

    for (id, reason) in &outcome.stop_failures {
        eprintln!("Warning: previous instance {id} is still running: {reason}");
    }
    println!("{}", outcome.new_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use traefiker_core::error::DeployError;

    #[test]
    fn test_load_request() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "traefiker:\n  name: web\n  network: edge\n").unwrap();

        let args = DeployArgs {
            pull: Some("registry.local/web:1".to_string()),
            ..DeployArgs::default()
        };
        let request = load_request(&path, dir.path(), &args).unwrap();
        assert_eq!(request.service.name, "web");
        assert_eq!(request.runtime.get("networks"), &["edge".to_string()]);
        assert_eq!(request.workdir, dir.path());
        assert_eq!(request.dockerfile, "./Dockerfile");
        assert_eq!(request.pull.as_deref(), Some("registry.local/web:1"));
    }

    #[test]
    fn test_missing_config_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = load_request(&dir.path().join("config.yml"), dir.path(), &DeployArgs::default())
            .unwrap_err();
        assert!(matches!(err, DeployError::ConfigError(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_verify_policy_from_args() {
        let args = DeployArgs {
            settle: 5,
            verify_attempts: 3,
            ..DeployArgs::default()
        };
        let policy = args.verify_policy();
        assert_eq!(policy.settle, Duration::from_secs(5));
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.interval, Duration::from_secs(1));
    }
}
