//! `traefiker ps` command - List running instances.

use clap::Args;
use traefiker_core::error::Result;
use traefiker_core::Instance;

use super::{open_backend, Mode};
use crate::output;

#[derive(Args, Debug)]
pub struct PsArgs {
    /// Only display instance IDs
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(mode: Mode, args: PsArgs) -> Result<()> {
    let backend = open_backend(mode)?;
    let instances = backend.list().await?;

    // --quiet: print only IDs
    if args.quiet {
        for instance in &instances {
            println!("{}", instance.id);
        }
        return Ok(());
    }

    println!("{}", render_table(&instances));
    Ok(())
}

fn render_table(instances: &[Instance]) -> comfy_table::Table {
    let mut table = output::new_table(&["ID", "IMAGE", "NAMES", "BACKEND"]);
    for instance in instances {
        table.add_row([
            output::short_id(&instance.id).to_string(),
            instance.image.clone(),
            instance.names.join(", "),
            instance.backend.to_string(),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use traefiker_core::BackendKind;

    #[test]
    fn test_render_table() {
        let instances = vec![Instance {
            id: "0123456789abcdef0123".to_string(),
            image: "web".to_string(),
            names: vec!["web_1a2b".to_string()],
            backend: BackendKind::Container,
        }];
        let rendered = render_table(&instances).to_string();
        assert!(rendered.contains("0123456789ab"));
        assert!(!rendered.contains("0123456789abcdef"));
        assert!(rendered.contains("web_1a2b"));
        assert!(rendered.contains("container"));
    }
}
