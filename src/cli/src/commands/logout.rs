//! `traefiker logout` command - Remove stored registry credentials.

use clap::Args;
use traefiker_core::error::Result;
use traefiker_runtime::CredentialStore;

#[derive(Args, Debug)]
pub struct LogoutArgs {
    /// Credential alias
    #[arg(default_value = "dockerhub")]
    pub alias: String,
}

pub async fn execute(args: LogoutArgs) -> Result<()> {
    let store = CredentialStore::default_path()?;
    println!("{}", logout(&store, &args.alias)?);
    Ok(())
}

fn logout(store: &CredentialStore, alias: &str) -> Result<String> {
    Ok(if store.remove(alias)? {
        format!("Removing login credentials for {}", alias)
    } else {
        format!("Not logged in to {}", alias)
    })
}
