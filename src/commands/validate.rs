use crate::output::UserOutput;
use port_warden::{Conflict, Warden};

pub fn run_validate(
    warden: &Warden,
    environment: Option<String>,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let targets: Vec<String> = match environment {
        Some(env) => vec![env],
        None => warden.registry().names().map(str::to_string).collect(),
    };

    let mut all: Vec<Conflict> = Vec::new();
    for name in &targets {
        all.extend(warden.validate_isolation(name)?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&all)?);
        return Ok(());
    }

    if all.is_empty() {
        out.success(&format!(
            "Isolation holds for {}",
            if targets.len() == 1 {
                targets[0].clone()
            } else {
                format!("all {} environments", targets.len())
            }
        ));
        return Ok(());
    }

    out.warning(&format!("{} isolation conflict(s):", all.len()));
    out.blank();
    for conflict in &all {
        out.status(&format!("  {}", conflict));
        out.status(&format!("    -> {}", conflict.recommendation()));
    }
    anyhow::bail!("isolation validation failed")
}
