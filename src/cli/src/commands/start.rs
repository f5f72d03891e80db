//! `traefiker start` command - Start the Traefik edge proxy.

use clap::Args;
use traefiker_core::error::{DeployError, Result};
use traefiker_core::RuntimeConfig;
use traefiker_runtime::{start_proxy, ProxyOptions};

use super::{open_backend, working_dir, Mode};

#[derive(Args, Debug)]
pub struct StartArgs {
    /// HTTP port to listen on (repeatable, e.g. --port 80 --port 8081)
    #[arg(long = "port")]
    pub ports: Vec<u16>,

    /// HTTPS port to listen on (repeatable, e.g. --tlsport 443)
    #[arg(long = "tlsport")]
    pub tls_ports: Vec<u16>,

    /// Redirect an HTTP port to an HTTPS port, format: 80:443
    #[arg(long = "tlsredir")]
    pub tls_redirect: Option<String>,
}

impl From<StartArgs> for ProxyOptions {
    fn from(args: StartArgs) -> Self {
        Self {
            ports: args.ports,
            tls_ports: args.tls_ports,
            tls_redirect: args.tls_redirect,
        }
    }
}

pub async fn execute(mode: Mode, args: StartArgs) -> Result<()> {
    if mode != Mode::Docker {
        return Err(DeployError::ConfigError(
            "The proxy runs as a container; use --mode docker".to_string(),
        ));
    }

    let options = ProxyOptions::from(args);
    let backend = open_backend(mode)?;
    let id = start_proxy(backend.as_ref(), &options, &RuntimeConfig::new(), &working_dir()?).await?;
    println!("{id}");
    Ok(())
}
