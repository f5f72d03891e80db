//! `traefiker login` command - Store registry credentials for image builds.

use std::io::BufRead;

use clap::Args;
use traefiker_core::error::{DeployError, Result};
use traefiker_runtime::build::{known_registry_url, RegistryCredentials};
use traefiker_runtime::CredentialStore;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Credential alias (`dockerhub` or `quay`)
    #[arg(default_value = "dockerhub")]
    pub alias: String,

    /// Registry server address (defaults to the alias' well-known server)
    #[arg(long)]
    pub server: Option<String>,

    /// Username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password
    #[arg(short, long)]
    pub password: Option<String>,

    /// Read password from stdin
    #[arg(long)]
    pub password_stdin: bool,
}

pub async fn execute(args: LoginArgs) -> Result<()> {
    let store = CredentialStore::default_path()?;
    let stdin = std::io::stdin();
    login(&store, args, &mut stdin.lock())?;
    println!("Login Succeeded");
    Ok(())
}

/// Store the credentials described by `args`, prompting on `input` for
/// whatever was not given on the command line.
fn login(store: &CredentialStore, args: LoginArgs, input: &mut impl BufRead) -> Result<()> {
    let registry_url = match args.server {
        Some(server) => server,
        None => known_registry_url(&args.alias)
            .map(str::to_string)
            .ok_or_else(|| {
                DeployError::ConfigError(format!(
                    "No known server for '{}'; pass --server",
                    args.alias
                ))
            })?,
    };

    let username = match args.username {
        Some(u) => u,
        None => {
            eprint!("Username: ");
            read_line(input)?
        }
    };

    let password = if args.password_stdin {
        read_line(input)?
    } else {
        match args.password {
            Some(p) => p,
            None => {
                eprint!("Password: ");
                read_line(input)?
            }
        }
    };

    if username.is_empty() || password.is_empty() {
        return Err(DeployError::ConfigError(
            "Username and password are required".to_string(),
        ));
    }

    tracing::debug!(alias = %args.alias, registry = %registry_url, "Storing registry credentials");
    store.store(
        &args.alias,
        RegistryCredentials {
            registry_url,
            username,
            password,
        },
    )
}

fn read_line(input: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}
