//! Resolution planning: conflicts in, ordered risk-annotated plan out.
//!
//! Plans are pure projections of a conflict list. They never mutate the
//! conflicts they were built from and may be discarded without side effect.

use crate::conflict::{Conflict, ConflictKind};
use crate::registry::Environment;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ordinal disruption estimate for one remediation step.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    KillProcess,
    StopContainer,
    UseFallback,
    ChangePort,
    WaitForRelease,
}

impl ActionKind {
    /// Fixed per-kind duration estimate, used only for plan-level
    /// aggregation and tie-breaking, never for outcomes.
    pub fn estimated_duration(&self) -> Duration {
        match self {
            ActionKind::ChangePort => Duration::from_secs(1),
            ActionKind::UseFallback => Duration::from_secs(2),
            ActionKind::KillProcess => Duration::from_secs(3),
            ActionKind::StopContainer => Duration::from_secs(5),
            ActionKind::WaitForRelease => Duration::from_secs(10),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionKind::KillProcess => "kill_process",
            ActionKind::StopContainer => "stop_container",
            ActionKind::UseFallback => "use_fallback",
            ActionKind::ChangePort => "change_port",
            ActionKind::WaitForRelease => "wait_for_release",
        };
        f.write_str(s)
    }
}

/// One remediation step, bound to the conflict that produced it.
/// Consumed exactly once; never reused across plans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionAction {
    pub kind: ActionKind,
    pub conflict: Conflict,
    pub risk: RiskLevel,
    pub estimated: Duration,
    pub reversible: bool,
    /// Process to terminate, for `kill_process`.
    pub target_pid: Option<u32>,
    /// Container to stop, for `stop_container`.
    pub target_container: Option<String>,
}

impl ResolutionAction {
    pub fn describe(&self) -> String {
        match self.kind {
            ActionKind::KillProcess => {
                let who = self
                    .conflict
                    .occupants
                    .as_ref()
                    .and_then(|o| o.processes.first())
                    .map(|p| format!("'{}' (pid {})", p.name, p.pid))
                    .unwrap_or_else(|| "unknown process".to_string());
                format!("terminate {} holding port {}", who, self.conflict.port)
            }
            ActionKind::StopContainer => format!(
                "stop container '{}' publishing port {}",
                self.target_container.as_deref().unwrap_or("?"),
                self.conflict.port
            ),
            ActionKind::UseFallback => {
                format!("allocate a fallback for port {}", self.conflict.port)
            }
            ActionKind::ChangePort => format!(
                "reassign '{}' off port {}",
                self.conflict.services.join(", "),
                self.conflict.port
            ),
            ActionKind::WaitForRelease => {
                format!("wait for port {} to be released", self.conflict.port)
            }
        }
    }
}

/// Ordered remediation derived from one conflict list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionPlan {
    pub environment: String,
    /// Risk-ascending, duration-ascending. Execution consumes this order.
    pub actions: Vec<ResolutionAction>,
    /// Maximum risk among the actions.
    pub aggregate_risk: RiskLevel,
    pub total_estimated: Duration,
}

impl ResolutionPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// One classifier rule: substring pattern → risk.
pub struct RiskRule {
    pub pattern: &'static str,
    pub risk: RiskLevel,
}

/// Priority-ordered process-name classifier, first match wins.
///
/// This is a heuristic, not authoritative: it looks at names only, and an
/// unmatched name defaults to `medium` rather than to a distinct unknown
/// tier. OS-core and data-bearing processes rank before dev tools so that a
/// name matching both (e.g. "postgres-dev") takes the cautious rank.
pub const RISK_RULES: &[RiskRule] = &[
    // OS-core: terminating these can take the host down.
    RiskRule { pattern: "systemd", risk: RiskLevel::Critical },
    RiskRule { pattern: "launchd", risk: RiskLevel::Critical },
    RiskRule { pattern: "init", risk: RiskLevel::Critical },
    RiskRule { pattern: "sshd", risk: RiskLevel::Critical },
    RiskRule { pattern: "kernel", risk: RiskLevel::Critical },
    // Databases and web servers: data loss or user-facing outage.
    RiskRule { pattern: "postgres", risk: RiskLevel::High },
    RiskRule { pattern: "mysqld", risk: RiskLevel::High },
    RiskRule { pattern: "mysql", risk: RiskLevel::High },
    RiskRule { pattern: "mariadb", risk: RiskLevel::High },
    RiskRule { pattern: "mongod", risk: RiskLevel::High },
    RiskRule { pattern: "redis-server", risk: RiskLevel::High },
    RiskRule { pattern: "nginx", risk: RiskLevel::High },
    RiskRule { pattern: "apache", risk: RiskLevel::High },
    RiskRule { pattern: "httpd", risk: RiskLevel::High },
    RiskRule { pattern: "haproxy", risk: RiskLevel::High },
    // Common dev tooling: safe to restart.
    RiskRule { pattern: "node", risk: RiskLevel::Low },
    RiskRule { pattern: "npm", risk: RiskLevel::Low },
    RiskRule { pattern: "yarn", risk: RiskLevel::Low },
    RiskRule { pattern: "pnpm", risk: RiskLevel::Low },
    RiskRule { pattern: "vite", risk: RiskLevel::Low },
    RiskRule { pattern: "webpack", risk: RiskLevel::Low },
    RiskRule { pattern: "cargo", risk: RiskLevel::Low },
    RiskRule { pattern: "flask", risk: RiskLevel::Low },
    RiskRule { pattern: "uvicorn", risk: RiskLevel::Low },
    RiskRule { pattern: "gunicorn", risk: RiskLevel::Low },
    RiskRule { pattern: "rails", risk: RiskLevel::Low },
    RiskRule { pattern: "deno", risk: RiskLevel::Low },
    RiskRule { pattern: "bun", risk: RiskLevel::Low },
];

/// Classify a process name; unmatched names default to `medium`.
pub fn classify_process(name: &str) -> RiskLevel {
    let lowered = name.to_lowercase();
    RISK_RULES
        .iter()
        .find(|rule| lowered.contains(rule.pattern))
        .map(|rule| rule.risk)
        .unwrap_or(RiskLevel::Medium)
}

/// Converts a conflict list into an ordered, risk-annotated plan.
pub struct ResolutionPlanner;

impl ResolutionPlanner {
    pub fn new() -> Self {
        ResolutionPlanner
    }

    pub fn plan(&self, conflicts: &[Conflict], env: &Environment) -> ResolutionPlan {
        let mut actions: Vec<ResolutionAction> = conflicts
            .iter()
            .filter_map(|conflict| self.action_for(conflict, env))
            .collect();

        // Risk ascending, ties broken by ascending estimated duration.
        actions.sort_by(|a, b| a.risk.cmp(&b.risk).then(a.estimated.cmp(&b.estimated)));

        let aggregate_risk = actions
            .iter()
            .map(|a| a.risk)
            .max()
            .unwrap_or(RiskLevel::None);
        let total_estimated = actions.iter().map(|a| a.estimated).sum();

        ResolutionPlan {
            environment: env.name.clone(),
            actions,
            aggregate_risk,
            total_estimated,
        }
    }

    fn action_for(&self, conflict: &Conflict, env: &Environment) -> Option<ResolutionAction> {
        match conflict.kind {
            ConflictKind::PortInUse => Some(self.occupancy_action(conflict, env)),
            // A misplaced assignment is fixed by moving it, not by touching
            // whatever may run there.
            ConflictKind::RangeViolation => Some(ResolutionAction {
                kind: ActionKind::ChangePort,
                conflict: conflict.clone(),
                risk: RiskLevel::Low,
                estimated: ActionKind::ChangePort.estimated_duration(),
                reversible: true,
                target_pid: None,
                target_container: None,
            }),
            // Registry mistakes surface as recommendations only.
            ConflictKind::ReservedPort
            | ConflictKind::DuplicateAssignment
            | ConflictKind::RangeOverlap => None,
        }
    }

    fn occupancy_action(&self, conflict: &Conflict, env: &Environment) -> ResolutionAction {
        let occupants = conflict.occupants.as_ref();

        if let Some(process) = occupants.and_then(|o| o.processes.first()) {
            let risk = classify_process(&process.name);
            return ResolutionAction {
                kind: ActionKind::KillProcess,
                conflict: conflict.clone(),
                risk,
                estimated: ActionKind::KillProcess.estimated_duration(),
                reversible: false,
                target_pid: Some(process.pid),
                target_container: None,
            };
        }

        if let Some(container) = occupants.and_then(|o| o.containers.first()) {
            return ResolutionAction {
                kind: ActionKind::StopContainer,
                conflict: conflict.clone(),
                risk: RiskLevel::Low,
                estimated: ActionKind::StopContainer.estimated_duration(),
                reversible: true,
                target_pid: None,
                target_container: Some(container.name.clone()),
            };
        }

        // No identifiable owner. Fall back if the environment permits;
        // otherwise the only safe move is to wait the holder out.
        let kind = if env.allow_fallback {
            ActionKind::UseFallback
        } else {
            ActionKind::WaitForRelease
        };
        ResolutionAction {
            kind,
            conflict: conflict.clone(),
            risk: RiskLevel::Low,
            estimated: kind.estimated_duration(),
            reversible: true,
            target_pid: None,
            target_container: None,
        }
    }
}

impl Default for ResolutionPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::Severity;
    use crate::probe::{ContainerInfo, PortOccupants, ProcessInfo};
    use crate::registry::{IsolationLevel, PortRange};
    use std::collections::BTreeMap;

    fn dev_env() -> Environment {
        Environment {
            name: "development".into(),
            range: PortRange::new(21000, 21999),
            services: BTreeMap::new(),
            isolation: IsolationLevel::Strict,
            auto_resolve: true,
            allow_fallback: true,
            priority: 10,
        }
    }

    fn in_use(port: u16, occupants: Option<PortOccupants>) -> Conflict {
        Conflict {
            kind: ConflictKind::PortInUse,
            severity: Severity::High,
            port,
            services: vec!["api".into()],
            environments: vec!["development".into()],
            occupants,
            detail: String::new(),
        }
    }

    fn with_process(name: &str, pid: u32) -> Option<PortOccupants> {
        Some(PortOccupants {
            processes: vec![ProcessInfo {
                pid,
                name: name.into(),
                command: None,
            }],
            containers: vec![],
        })
    }

    #[test]
    fn classifier_first_match_wins() {
        // "postgres-node" matches the database rule before the dev-tool rule.
        assert_eq!(classify_process("postgres-node"), RiskLevel::High);
        assert_eq!(classify_process("node"), RiskLevel::Low);
        assert_eq!(classify_process("systemd-resolved"), RiskLevel::Critical);
    }

    #[test]
    fn unclassified_defaults_to_medium() {
        assert_eq!(classify_process("my-bespoke-daemon"), RiskLevel::Medium);
    }

    #[test]
    fn classifier_is_case_insensitive() {
        assert_eq!(classify_process("Node"), RiskLevel::Low);
        assert_eq!(classify_process("POSTGRES"), RiskLevel::High);
    }

    #[test]
    fn process_owner_yields_kill_action() {
        let planner = ResolutionPlanner::new();
        let plan = planner.plan(&[in_use(21001, with_process("node", 100))], &dev_env());

        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].kind, ActionKind::KillProcess);
        assert_eq!(plan.actions[0].risk, RiskLevel::Low);
        assert_eq!(plan.actions[0].target_pid, Some(100));
        assert_eq!(plan.aggregate_risk, RiskLevel::Low);
    }

    #[test]
    fn container_owner_yields_stop_action() {
        let planner = ResolutionPlanner::new();
        let occupants = Some(PortOccupants {
            processes: vec![],
            containers: vec![ContainerInfo {
                name: "warden-db".into(),
            }],
        });
        let plan = planner.plan(&[in_use(21432, occupants)], &dev_env());

        assert_eq!(plan.actions[0].kind, ActionKind::StopContainer);
        assert_eq!(plan.actions[0].risk, RiskLevel::Low);
        assert!(plan.actions[0].reversible);
        assert_eq!(
            plan.actions[0].target_container.as_deref(),
            Some("warden-db")
        );
    }

    #[test]
    fn unknown_owner_falls_back_or_waits() {
        let planner = ResolutionPlanner::new();

        let plan = planner.plan(&[in_use(21001, None)], &dev_env());
        assert_eq!(plan.actions[0].kind, ActionKind::UseFallback);

        let mut no_fallback = dev_env();
        no_fallback.allow_fallback = false;
        let plan = planner.plan(&[in_use(21001, None)], &no_fallback);
        assert_eq!(plan.actions[0].kind, ActionKind::WaitForRelease);
    }

    #[test]
    fn duplicate_assignment_yields_no_action() {
        let planner = ResolutionPlanner::new();
        let conflict = Conflict {
            kind: ConflictKind::DuplicateAssignment,
            severity: Severity::Critical,
            port: 21001,
            services: vec!["api".into(), "web".into()],
            environments: vec!["development".into()],
            occupants: None,
            detail: String::new(),
        };
        let plan = planner.plan(&[conflict], &dev_env());
        assert!(plan.is_empty());
        assert_eq!(plan.aggregate_risk, RiskLevel::None);
    }

    #[test]
    fn actions_ordered_by_risk_then_duration() {
        let planner = ResolutionPlanner::new();
        let conflicts = vec![
            in_use(21432, with_process("postgres", 200)), // high risk
            in_use(21001, with_process("node", 100)),     // low risk, 3s
            in_use(21002, None),                          // low risk, fallback 2s
            in_use(21003, with_process("unknown-thing", 300)), // medium
        ];
        let plan = planner.plan(&conflicts, &dev_env());

        let risks: Vec<RiskLevel> = plan.actions.iter().map(|a| a.risk).collect();
        let mut sorted = risks.clone();
        sorted.sort();
        assert_eq!(risks, sorted, "actions must be risk-ascending");

        // Within equal risk, duration ascending: fallback (2s) before kill (3s).
        assert_eq!(plan.actions[0].kind, ActionKind::UseFallback);
        assert_eq!(plan.actions[1].kind, ActionKind::KillProcess);
        assert_eq!(plan.aggregate_risk, RiskLevel::High);
    }
}
