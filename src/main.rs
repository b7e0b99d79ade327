mod cli;
mod commands;
mod output;
mod prompt;

use clap::Parser;
use cli::{Cli, Commands};
use port_warden::{Error as WardenError, Warden};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(warden_error) = e.downcast_ref::<WardenError>() {
            eprintln!("Error: {}", warden_error);
            if let Some(suggestion) = warden_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let workdir = match cli.workdir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let out: Box<dyn output::UserOutput> = if cli.json {
        Box::new(output::QuietOutput)
    } else {
        Box::new(output::CliOutput)
    };

    // ── Tier 1: commands that need no engine ────────────────────────────
    if let Commands::Init { force } = &cli.command {
        return commands::run_init(&workdir, *force, out.as_ref());
    }

    // ── Load registry and build the engine ──────────────────────────────
    let parser = port_warden::registry::Parser::new();
    let registry = match cli.config.clone() {
        Some(path) => parser.load(&path)?,
        None => parser.load_or_builtin(&workdir)?,
    };

    let warden = Arc::new(
        Warden::builder()
            .registry(registry)
            .workdir(workdir)
            .approval_gate(Arc::new(prompt::PromptGate))
            .build()?,
    );

    match cli.command {
        Commands::Status => commands::run_status(&warden, cli.json, out.as_ref()),
        Commands::Conflicts { environment } => {
            commands::run_conflicts(&warden, environment, cli.json, out.as_ref()).await
        }
        Commands::Resolve {
            environment,
            dry_run,
            yes,
            strategy,
            timeout,
        } => {
            commands::run_resolve(
                &warden,
                environment,
                dry_run,
                yes,
                &strategy,
                timeout,
                cli.json,
                out.as_ref(),
            )
            .await
        }
        Commands::Switch {
            environment,
            force,
            confirm,
        } => commands::run_switch(&warden, &environment, force, confirm, out.as_ref()),
        Commands::Validate { environment } => {
            commands::run_validate(&warden, environment, cli.json, out.as_ref())
        }
        Commands::Envs => commands::run_envs(&warden, cli.json, out.as_ref()),
        Commands::Monitor {
            interval,
            threshold,
        } => commands::run_monitor(warden, interval, threshold, out.as_ref()).await,
        Commands::Init { .. } => unreachable!("handled in earlier dispatch tier"),
    }
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
