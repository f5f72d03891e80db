//! CLI command definitions and dispatch.

mod deploy;
mod login;
mod logout;
mod ps;
mod start;
mod stop;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use traefiker_core::error::{DeployError, Result};
use traefiker_runtime::{DockerBackend, ExecutionBackend, ProcessBackend};

/// Traefiker - blue/green service rollover behind Traefik.
#[derive(Parser)]
#[command(name = "traefiker", version, about)]
pub struct Cli {
    /// Execution backend
    #[arg(long, value_enum, default_value_t = Mode::Docker, global = true)]
    pub mode: Mode,

    /// Deployment configuration file
    #[arg(long, default_value = "config.yml", global = true)]
    pub config: PathBuf,

    /// Defaults to `deploy`
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Execution substrates selectable with `--mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Containers on the local Docker daemon
    Docker,
    /// Prebuilt executables run as plain processes
    Static,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Build and roll over the configured service
    Deploy(deploy::DeployArgs),
    /// List running instances
    Ps(ps::PsArgs),
    /// Stop instances by id
    Stop(stop::StopArgs),
    /// Start (or restart) the Traefik edge proxy
    Start(start::StartArgs),
    /// Store registry credentials used by image builds
    Login(login::LoginArgs),
    /// Remove stored registry credentials
    Logout(logout::LogoutArgs),
}

/// Open the backend selected by `mode`.
pub(crate) fn open_backend(mode: Mode) -> Result<Arc<dyn ExecutionBackend>> {
    match mode {
        Mode::Docker => Ok(Arc::new(DockerBackend::connect()?)),
        Mode::Static => Ok(Arc::new(ProcessBackend::new(working_dir()?))),
    }
}

/// The current directory: build context root and base for relative mounts.
pub(crate) fn working_dir() -> Result<PathBuf> {
    std::env::current_dir().map_err(|e| {
        DeployError::ConfigError(format!("Cannot determine working directory: {}", e))
    })
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let command = cli
        .command
        .unwrap_or_else(|| Command::Deploy(deploy::DeployArgs::default()));

    match command {
        Command::Deploy(args) => deploy::execute(cli.mode, &cli.config, args).await,
        Command::Ps(args) => ps::execute(cli.mode, args).await,
        Command::Stop(args) => stop::execute(cli.mode, args).await,
        Command::Start(args) => start::execute(cli.mode, args).await,
        Command::Login(args) => login::execute(args).await,
        Command::Logout(args) => logout::execute(args).await,
    }
}
