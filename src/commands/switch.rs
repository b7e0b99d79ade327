use crate::output::UserOutput;
use port_warden::Warden;

pub fn run_switch(
    warden: &Warden,
    environment: &str,
    force: bool,
    confirm: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    if confirm {
        warden.confirm_production(true);
    }

    let from = warden.active_environment();
    let name = warden.switch_to(environment, force)?;

    match from {
        Some(from) if from != name => out.success(&format!("Switched {} -> {}", from, name)),
        _ => out.success(&format!("Active environment: {}", name)),
    }
    if force {
        out.warning("Isolation checks were bypassed (--force)");
    }
    Ok(())
}
