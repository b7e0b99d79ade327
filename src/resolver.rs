//! Environment resolution and switching.
//!
//! The active environment is chosen from prioritized signal sources: the
//! dedicated override variable first, then generic deployment variables,
//! then auto-detection heuristics, then the configured fallback. Switching
//! is gated by the isolation validator and recorded in a bounded history.

use crate::error::{Error, Result};
use crate::isolation::IsolationValidator;
use crate::registry::{IsolationLevel, Registry};
use crate::ring::Ring;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Explicit signal sources, highest priority first.
pub const SIGNAL_SOURCES: &[&str] = &["PORT_WARDEN_ENV", "ENVIRONMENT", "DEPLOY_ENV", "APP_ENV"];

/// Confirmation signal required for production in strict mode.
pub const CONFIRM_VAR: &str = "PORT_WARDEN_CONFIRM_PRODUCTION";

/// Switch history capacity.
pub const SWITCH_HISTORY_CAPACITY: usize = 100;

/// A recorded environment transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchRecord {
    pub from: Option<String>,
    pub to: String,
    pub at: DateTime<Utc>,
    pub forced: bool,
    pub actor: String,
}

/// Notifications consumable by the monitor and CLI. Switch events are
/// published synchronously inside `switch_to`, before any scan of the new
/// environment can run, so ordering is preserved.
#[derive(Debug, Clone)]
pub enum WardenEvent {
    Switched {
        from: Option<String>,
        to: String,
        forced: bool,
    },
    ScanCompleted {
        environment: String,
        conflicts: usize,
    },
    ThresholdAlert {
        environment: String,
        conflicts: usize,
        limit: usize,
    },
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct EnvironmentResolver {
    registry: Arc<Registry>,
    validator: IsolationValidator,
    workdir: PathBuf,
    active: Mutex<Option<String>>,
    history: Mutex<Ring<SwitchRecord>>,
    events: broadcast::Sender<WardenEvent>,
    /// Reads a named external variable. Injectable so tests never mutate
    /// process-global environment state.
    lookup: EnvLookup,
    /// API-level production confirmation, equivalent to the env signal.
    production_confirmed: AtomicBool,
}

impl EnvironmentResolver {
    pub fn new(registry: Arc<Registry>, workdir: PathBuf) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            validator: IsolationValidator::new(registry.clone()),
            registry,
            workdir,
            active: Mutex::new(None),
            history: Mutex::new(Ring::new(SWITCH_HISTORY_CAPACITY)),
            events,
            lookup: Arc::new(|name| std::env::var(name).ok()),
            production_confirmed: AtomicBool::new(false),
        }
    }

    /// Replace the variable lookup (tests; embedding).
    pub fn with_env_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.lookup = Arc::new(lookup);
        self
    }

    /// Programmatic equivalent of the confirmation variable.
    pub fn confirm_production(&self, confirmed: bool) {
        self.production_confirmed.store(confirmed, Ordering::SeqCst);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WardenEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: WardenEvent) {
        let _ = self.events.send(event);
    }

    pub fn active(&self) -> Option<String> {
        self.active.lock().clone()
    }

    /// Most recent switches, newest last.
    pub fn history(&self) -> Vec<SwitchRecord> {
        self.history.lock().to_vec()
    }

    /// Pick the active environment. First matching valid name wins; an
    /// explicit signal carrying an unknown name is rejected, not skipped.
    pub fn resolve(&self) -> Result<String> {
        if let Some(active) = self.active.lock().clone() {
            return Ok(active);
        }

        let name = self.detect()?;
        self.check_production_gate(&name)?;

        tracing::info!(environment = %name, "environment resolved");
        *self.active.lock() = Some(name.clone());
        Ok(name)
    }

    fn detect(&self) -> Result<String> {
        for &var in SIGNAL_SOURCES {
            if let Some(value) = (self.lookup)(var) {
                let value = value.trim().to_lowercase();
                if value.is_empty() {
                    continue;
                }
                if !self.registry.contains(&value) {
                    return Err(Error::Configuration(format!(
                        "{} names unknown environment '{}'",
                        var, value
                    )));
                }
                tracing::debug!(source = var, environment = %value, "explicit signal matched");
                return Ok(value);
            }
        }

        for (heuristic, candidate) in [
            ("compose-file", self.detect_from_compose()),
            ("vcs-branch", self.detect_from_branch()),
            ("hostname", self.detect_from_hostname()),
            ("port-usage", self.detect_from_port_usage()),
        ] {
            if let Some(name) = candidate {
                if self.registry.contains(&name) {
                    tracing::debug!(source = heuristic, environment = %name, "heuristic matched");
                    return Ok(name);
                }
            }
        }

        tracing::debug!(environment = %self.registry.fallback, "falling back");
        Ok(self.registry.fallback.clone())
    }

    /// A compose file in the workdir marks a local development checkout.
    fn detect_from_compose(&self) -> Option<String> {
        const COMPOSE_FILES: &[&str] = &[
            "docker-compose.yml",
            "docker-compose.yaml",
            "compose.yml",
            "compose.yaml",
        ];
        COMPOSE_FILES
            .iter()
            .any(|f| self.workdir.join(f).is_file())
            .then(|| "development".to_string())
    }

    fn detect_from_branch(&self) -> Option<String> {
        let head = std::fs::read_to_string(self.workdir.join(".git/HEAD")).ok()?;
        let branch = head.trim().strip_prefix("ref: refs/heads/")?;
        classify_branch(branch).map(str::to_string)
    }

    fn detect_from_hostname(&self) -> Option<String> {
        let hostname = (self.lookup)("HOSTNAME").or_else(hostname)?;
        classify_hostname(&hostname).map(str::to_string)
    }

    /// Correlate live occupancy with configured assignments: the environment
    /// whose ports are most in use is probably the one running here.
    fn detect_from_port_usage(&self) -> Option<String> {
        let mut best: Option<(&str, usize, u8)> = None;
        for env in self.registry.environments.values() {
            let occupied = env
                .assignments()
                .filter(|&(_, port)| port_held(port))
                .count();
            if occupied == 0 {
                continue;
            }
            let candidate = (env.name.as_str(), occupied, env.priority);
            best = match best {
                Some(current) if (current.1, current.2) >= (candidate.1, candidate.2) => {
                    Some(current)
                }
                _ => Some(candidate),
            };
        }
        best.map(|(name, _, _)| name.to_string())
    }

    fn production_gate_open(&self) -> bool {
        if self.production_confirmed.load(Ordering::SeqCst) {
            return true;
        }
        (self.lookup)(CONFIRM_VAR)
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }

    fn check_production_gate(&self, name: &str) -> Result<()> {
        if name == "production" && self.registry.strict_production && !self.production_gate_open() {
            return Err(Error::ConfirmationRequired {
                environment: name.to_string(),
            });
        }
        Ok(())
    }

    /// Switch the active environment. Without `force`, any cross-environment
    /// conflict on a strict-isolation target blocks the switch; the current
    /// environment is left unchanged on every failure path.
    pub fn switch_to(&self, target: &str, force: bool) -> Result<String> {
        let env = self.registry.get(target)?;
        self.check_production_gate(target)?;

        if !force && env.isolation == IsolationLevel::Strict {
            let conflicts = self.validator.validate_cross_environment(env);
            if !conflicts.is_empty() {
                return Err(Error::Isolation {
                    target: target.to_string(),
                    conflicts: conflicts.len(),
                });
            }
        }

        let from = {
            let mut active = self.active.lock();
            let from = active.clone();
            *active = Some(target.to_string());
            from
        };

        let record = SwitchRecord {
            from: from.clone(),
            to: target.to_string(),
            at: Utc::now(),
            forced: force,
            actor: (self.lookup)("USER").unwrap_or_else(|| "unknown".to_string()),
        };
        self.history.lock().push(record);

        tracing::info!(from = ?from, to = %target, forced = force, "environment switched");
        self.publish(WardenEvent::Switched {
            from,
            to: target.to_string(),
            forced: force,
        });

        Ok(target.to_string())
    }
}

fn classify_branch(branch: &str) -> Option<&'static str> {
    let branch = branch.to_lowercase();
    if branch == "main" || branch == "master" {
        Some("production")
    } else if branch.starts_with("release/") || branch == "staging" {
        Some("staging")
    } else if branch.starts_with("test") || branch == "qa" {
        Some("testing")
    } else if branch == "develop" || branch == "dev" || branch.starts_with("feature/") {
        Some("development")
    } else {
        None
    }
}

fn classify_hostname(hostname: &str) -> Option<&'static str> {
    let hostname = hostname.to_lowercase();
    if hostname.contains("prod") {
        Some("production")
    } else if hostname.contains("staging") || hostname.contains("stage") {
        Some("staging")
    } else if hostname.contains("test") || hostname.contains("qa") {
        Some("testing")
    } else if hostname.contains("dev") {
        Some("development")
    } else {
        None
    }
}

#[cfg(unix)]
fn hostname() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
}

#[cfg(not(unix))]
fn hostname() -> Option<String> {
    None
}

fn port_held(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_err() || TcpListener::bind(("0.0.0.0", port)).is_err()
}
