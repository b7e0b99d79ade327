use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Port Warden - Assign, validate, and defend environment port ranges")]
pub struct Cli {
    /// Config file path (defaults to discovering port-warden.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Working directory (compose/branch heuristics and config discovery)
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// Emit machine-readable JSON instead of human output
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the active environment, switch history, and recent resolutions
    Status,

    /// Detect conflicts for an environment
    Conflicts {
        /// Environment to scan (defaults to the resolved one)
        environment: Option<String>,
    },

    /// Detect conflicts, build a plan, and execute it
    Resolve {
        /// Environment to resolve (defaults to the resolved one)
        environment: Option<String>,

        /// Preview the plan without executing any action
        #[arg(long)]
        dry_run: bool,

        /// Approve every action without prompting
        #[arg(short = 'y', long)]
        yes: bool,

        /// Execution strategy
        #[arg(long, value_name = "STRATEGY", default_value = "interactive")]
        strategy: String,

        /// Bound on the whole resolution call, in seconds
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },

    /// Switch the active environment
    Switch {
        /// Target environment
        environment: String,

        /// Override isolation conflicts blocking the switch
        #[arg(long)]
        force: bool,

        /// Confirm a production switch (equivalent to the confirmation variable)
        #[arg(long)]
        confirm: bool,
    },

    /// Validate isolation (range boundaries and cross-environment overlap)
    Validate {
        /// Environment to validate (defaults to all)
        environment: Option<String>,
    },

    /// List registered environments and their port ranges
    Envs,

    /// Periodically re-scan and alert on conflict thresholds (until Ctrl-C)
    Monitor {
        /// Seconds between scans
        #[arg(long, default_value_t = 30)]
        interval: u64,

        /// Conflict count that triggers an alert
        #[arg(long, default_value_t = 3)]
        threshold: usize,
    },

    /// Write a starter port-warden.yaml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
