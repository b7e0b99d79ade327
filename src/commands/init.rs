use crate::output::UserOutput;
use port_warden::registry::{Parser, CONFIG_FILE_NAME};
use std::path::Path;

pub fn run_init(workdir: &Path, force: bool, out: &dyn UserOutput) -> anyhow::Result<()> {
    let path = workdir.join(CONFIG_FILE_NAME);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    std::fs::write(&path, Parser::new().starter_config()?)?;
    out.success(&format!("Wrote {}", path.display()));
    out.status("Edit the ranges and service assignments, then run `warden validate`.");
    Ok(())
}
