use crate::output::UserOutput;
use port_warden::Warden;

pub fn run_status(warden: &Warden, json: bool, out: &dyn UserOutput) -> anyhow::Result<()> {
    let active = warden.resolve()?;
    let switches = warden.switch_history();
    let resolutions = warden.resolution_history();

    if json {
        let doc = serde_json::json!({
            "environment": active,
            "switch_history": switches,
            "resolution_history": resolutions,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    out.status(&format!("Active environment: {}", active));

    if !switches.is_empty() {
        out.blank();
        out.status("Recent switches:");
        for record in switches.iter().rev().take(5) {
            out.status(&format!(
                "  {} {} -> {}{} (by {})",
                record.at.format("%Y-%m-%d %H:%M:%S"),
                record.from.as_deref().unwrap_or("-"),
                record.to,
                if record.forced { " [forced]" } else { "" },
                record.actor,
            ));
        }
    }

    if !resolutions.is_empty() {
        out.blank();
        out.status("Recent resolutions:");
        for result in resolutions.iter().take(5) {
            out.status(&format!(
                "  {} {}: {} ({} detected, {} resolved, {} failed)",
                result.started_at.format("%Y-%m-%d %H:%M:%S"),
                result.environment,
                result.status,
                result.conflicts_detected,
                result.conflicts_resolved,
                result.actions_failed,
            ));
        }
    }
    Ok(())
}
