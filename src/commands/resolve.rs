use crate::output::UserOutput;
use port_warden::resolution::{ActionState, ExecuteOptions, Strategy};
use port_warden::{FinalStatus, Warden};
use std::time::Duration;

pub async fn run_resolve(
    warden: &Warden,
    environment: Option<String>,
    dry_run: bool,
    yes: bool,
    strategy: &str,
    timeout_secs: u64,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let environment = match environment {
        Some(env) => env,
        None => warden.resolve()?,
    };

    let strategy = match strategy {
        "automatic" => Strategy::Automatic,
        "interactive" => Strategy::Interactive,
        "manual" => Strategy::Manual,
        "fallback" => Strategy::Fallback,
        other => anyhow::bail!(
            "unknown strategy '{}' (expected automatic, interactive, manual, or fallback)",
            other
        ),
    };

    let options = ExecuteOptions {
        strategy,
        auto_approve: yes,
        dry_run,
        timeout: Duration::from_secs(timeout_secs),
        ..ExecuteOptions::default()
    };

    out.status(&format!(
        "Resolving conflicts in {}{}...",
        environment,
        if dry_run { " (dry run)" } else { "" }
    ));
    let result = warden.resolve_conflicts(&environment, options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    out.blank();
    for outcome in &result.outcomes {
        let mark = match outcome.state {
            ActionState::Succeeded => "ok",
            ActionState::WouldExecute => "would",
            ActionState::Skipped => "skip",
            ActionState::Failed => "FAIL",
            ActionState::Pending | ActionState::Executing => "?",
        };
        let mut line = format!("  [{}] {} port {}", mark, outcome.kind, outcome.port);
        if let Some(ref method) = outcome.method {
            line.push_str(&format!(" ({})", method));
        }
        if let Some(ref error) = outcome.error {
            line.push_str(&format!(" - {}", error));
        }
        out.status(&line);
    }

    out.blank();
    match result.status {
        FinalStatus::NoConflicts => out.success("No conflicts detected"),
        FinalStatus::Resolved => out.success(&format!(
            "Resolved: {}/{} conflict(s)",
            result.conflicts_resolved, result.conflicts_detected
        )),
        FinalStatus::DryRunCompleted => out.success(&format!(
            "Dry run complete: {} action(s) would execute",
            result.outcomes.len()
        )),
        FinalStatus::PartiallyResolved => {
            out.warning(&format!(
                "Partially resolved: {} conflict(s) remain",
                result.remaining.len()
            ));
            for recommendation in &result.recommendations {
                out.status(&format!("  -> {}", recommendation));
            }
        }
        FinalStatus::Failed => {
            out.error("Resolution failed");
            for error in &result.errors {
                out.status(&format!("  -> {}", error));
            }
        }
    }
    Ok(())
}
