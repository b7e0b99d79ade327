use crate::output::UserOutput;
use port_warden::Warden;

pub async fn run_conflicts(
    warden: &Warden,
    environment: Option<String>,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let environment = match environment {
        Some(env) => env,
        None => warden.resolve()?,
    };

    out.status(&format!("Scanning {}...", environment));
    let conflicts = warden.get_conflicts(&environment).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        out.success("No conflicts detected");
        return Ok(());
    }

    out.warning(&format!("{} conflict(s) detected:", conflicts.len()));
    out.blank();
    for conflict in &conflicts {
        out.status(&format!("  {}", conflict));
        out.status(&format!("    -> {}", conflict.recommendation()));
    }
    Ok(())
}
