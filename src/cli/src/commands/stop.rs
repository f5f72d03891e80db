//! `traefiker stop` command - Stop one or more instances.

use clap::Args;
use traefiker_core::error::Result;

use super::{open_backend, Mode};

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Instance ID(s)
    #[arg(required = true)]
    pub ids: Vec<String>,
}

/// Stops every id; the first failure is returned after all were attempted.
pub async fn execute(mode: Mode, args: StopArgs) -> Result<()> {
    let backend = open_backend(mode)?;
    let mut first_error = None;

    for id in &args.ids {
        match backend.stop(id).await {
            Ok(()) => println!("{id}"),
            Err(e) => {
                eprintln!("{id}: {e}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
