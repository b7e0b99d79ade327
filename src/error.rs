use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(warden::config::error),
        help("Run `warden validate` for detailed configuration diagnostics")
    )]
    Configuration(String),

    #[error("Unknown environment: '{0}'")]
    #[diagnostic(
        code(warden::config::unknown_environment),
        help("List known environments with `warden envs`")
    )]
    UnknownEnvironment(String),

    #[error("Switching to '{environment}' requires explicit confirmation")]
    #[diagnostic(
        code(warden::resolver::confirmation_required),
        help("Set PORT_WARDEN_CONFIRM_PRODUCTION=yes (or pass --confirm) to proceed")
    )]
    ConfirmationRequired { environment: String },

    #[error("Switch to '{target}' blocked: {conflicts} isolation conflict(s)")]
    #[diagnostic(
        code(warden::resolver::isolation),
        help("Inspect the conflicts with `warden validate <target>`, or retry with --force")
    )]
    Isolation { target: String, conflicts: usize },

    #[error("No fallback port available for {port} after {attempts} attempts")]
    #[diagnostic(
        code(warden::fallback::exhausted),
        help("Free some ports in the environment range, or widen the range in port-warden.yaml")
    )]
    NoFallbackAvailable { port: u16, attempts: u32 },

    #[error("Action '{action}' failed: {reason}")]
    #[diagnostic(code(warden::executor::action_failed))]
    ActionExecution { action: String, reason: String },

    #[error("Port probe unavailable: {0}")]
    #[diagnostic(
        code(warden::probe::unavailable),
        help("Check that `ss` or `lsof` is installed and on PATH")
    )]
    ProbeUnavailable(String),

    #[error("Invalid PID {pid}: {reason}")]
    InvalidPid { pid: u32, reason: String },

    #[error("Container error: {0}")]
    #[diagnostic(
        code(warden::container::error),
        help("Check that Docker is running with `docker ps`")
    )]
    Container(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Operation aborted by user")]
    Aborted,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::UnknownEnvironment(name) => Some(format!(
                "'{}' is not a registered environment. Check `warden envs` for the known set, \
                 or add it to port-warden.yaml.",
                name
            )),
            Error::ConfirmationRequired { environment } => Some(format!(
                "Selecting '{}' is gated in strict mode. Export PORT_WARDEN_CONFIRM_PRODUCTION=yes \
                 in the invoking shell if this is intentional.",
                environment
            )),
            Error::Isolation { target, conflicts } => Some(format!(
                "{} conflict(s) block the switch to '{}'. Run `warden validate {}` to see them, \
                 then fix the overlaps or pass --force to override.",
                conflicts, target, target
            )),
            Error::NoFallbackAvailable { port, .. } => Some(format!(
                "Every candidate above port {} inside the environment range is occupied or reserved. \
                 Stop unneeded services or widen the range.",
                port
            )),
            Error::ProbeUnavailable(_) => Some(
                "Occupancy is treated as unknown-and-occupied while the probe is down, so detection \
                 stays conservative. Install `ss` (iproute2) or `lsof` for process attribution."
                    .to_string(),
            ),
            Error::Container(_) => Some("Check that Docker is running: docker ps".to_string()),
            Error::Configuration(_) => {
                Some("Validate your config with: warden validate".to_string())
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }

    /// True for the fatal class: caller mistakes that must surface immediately
    /// and are never folded into a `ResolutionResult`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::UnknownEnvironment(_)
                | Error::ConfirmationRequired { .. }
                | Error::Isolation { .. }
        )
    }
}

/// Validates and converts a u32 PID to nix::unistd::Pid safely.
/// Returns Err for PID 0 (process group), PID 1 (init), or values > i32::MAX.
#[cfg(unix)]
pub fn validate_pid(pid: u32) -> Result<nix::unistd::Pid> {
    if pid == 0 {
        return Err(Error::InvalidPid {
            pid,
            reason: "PID 0 refers to the process group, not a process".to_string(),
        });
    }
    if pid == 1 {
        return Err(Error::InvalidPid {
            pid,
            reason: "refusing to signal PID 1 (init)".to_string(),
        });
    }
    if pid > i32::MAX as u32 {
        return Err(Error::InvalidPid {
            pid,
            reason: "exceeds i32::MAX, cannot convert safely".to_string(),
        });
    }
    Ok(nix::unistd::Pid::from_raw(pid as i32))
}

/// Same as validate_pid but without the PID 1 rejection.
/// Use validate_pid for signal operations; use this for read-only liveness checks.
#[cfg(unix)]
pub fn validate_pid_for_check(pid: u32) -> Option<nix::unistd::Pid> {
    if pid == 0 || pid > i32::MAX as u32 {
        return None;
    }
    Some(nix::unistd::Pid::from_raw(pid as i32))
}
