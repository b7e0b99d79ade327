use crate::output::UserOutput;
use port_warden::Warden;

pub fn run_envs(warden: &Warden, json: bool, out: &dyn UserOutput) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(warden.registry())?);
        return Ok(());
    }

    let active = warden.active_environment();
    for name in warden.registry().names() {
        let env = warden.registry().get(name)?;
        let marker = if active.as_deref() == Some(name) {
            "*"
        } else {
            " "
        };
        out.status(&format!(
            "{} {:<12} {}  ({} service(s), isolation: {:?}, fallback: {})",
            marker,
            env.name,
            env.range,
            env.services.len(),
            env.isolation,
            if env.allow_fallback { "yes" } else { "no" },
        ));
        for (service, port) in env.assignments() {
            out.status(&format!("      {:<10} {}", service, port));
        }
    }
    Ok(())
}
