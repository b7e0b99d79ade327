//! Plan execution: strategy handlers, approval gating, dry-run, and
//! post-execution verification.

use super::fallback::FallbackAllocator;
use super::plan::{ActionKind, ResolutionAction, ResolutionPlan};
use crate::conflict::{Conflict, ConflictDetector};
use crate::error::{Error, Result};
use crate::probe::{ContainerControl, PortProbe, ProcessControl};
use crate::registry::Environment;
use crate::ring::Ring;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How much initiative the executor takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Execute every action without asking.
    #[default]
    Automatic,
    /// Gate each action through the approval hook.
    Interactive,
    /// Execute nothing; report the plan and recommendations only.
    Manual,
    /// Execute only fallback allocations; skip anything destructive.
    Fallback,
}

/// Options for one resolution pass.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub strategy: Strategy,
    pub auto_approve: bool,
    pub dry_run: bool,
    /// Bound on liveness rechecks after a graceful stop, and on release
    /// polls for `wait_for_release`.
    pub max_retries: u32,
    /// Bound on the whole resolution call.
    pub timeout: Duration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::Automatic,
            auto_approve: false,
            dry_run: false,
            max_retries: 10,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Terminal (or gate) state of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Pending,
    Skipped,
    Executing,
    Succeeded,
    Failed,
    /// Dry-run marker: recorded without invoking a strategy handler.
    WouldExecute,
}

/// What happened to one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub kind: ActionKind,
    pub port: u16,
    pub state: ActionState,
    /// Mechanism used, e.g. "graceful" vs "forced" termination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Replacement port granted by `use_fallback` / suggested by `change_port`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_port: Option<u16>,
    pub elapsed_ms: u64,
}

/// Machine-checkable overall outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    NoConflicts,
    Resolved,
    PartiallyResolved,
    Failed,
    DryRunCompleted,
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FinalStatus::NoConflicts => "no_conflicts",
            FinalStatus::Resolved => "resolved",
            FinalStatus::PartiallyResolved => "partially_resolved",
            FinalStatus::Failed => "failed",
            FinalStatus::DryRunCompleted => "dry_run_completed",
        };
        f.write_str(s)
    }
}

/// Outcome record for one resolution attempt. Always returned to the caller;
/// action-level failures live inside, never as thrown errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub environment: String,
    pub status: FinalStatus,
    pub conflicts_detected: usize,
    pub conflicts_resolved: usize,
    pub actions_failed: usize,
    pub actions_skipped: usize,
    pub outcomes: Vec<ActionOutcome>,
    /// Conflicts still present after verification.
    pub remaining: Vec<Conflict>,
    /// One per remaining conflict, plus one per unplannable conflict.
    pub recommendations: Vec<String>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Decision point for interactive strategy. Rendering is the caller's
/// concern; the executor only consumes the yes/no.
pub trait ApprovalGate: Send + Sync {
    fn approve(&self, action: &ResolutionAction) -> Result<bool>;
}

/// Approves everything. Used by the automatic strategy and tests.
pub struct ApproveAll;

impl ApprovalGate for ApproveAll {
    fn approve(&self, _action: &ResolutionAction) -> Result<bool> {
        Ok(true)
    }
}

/// Denies everything. Default gate when no interactive hook is installed.
pub struct DenyAll;

impl ApprovalGate for DenyAll {
    fn approve(&self, _action: &ResolutionAction) -> Result<bool> {
        Ok(false)
    }
}

/// Runs plans against the pluggable control capabilities.
///
/// One executor per engine; no two resolution passes run concurrently
/// against the same environment (the engine's in-flight guard enforces it).
pub struct ResolutionExecutor {
    process: Arc<dyn ProcessControl>,
    containers: Arc<dyn ContainerControl>,
    probe: Arc<dyn PortProbe>,
    allocator: Arc<FallbackAllocator>,
    approval: Arc<dyn ApprovalGate>,
    /// Wait after SIGTERM before escalating.
    grace_period: Duration,
    /// Poll cadence for liveness rechecks and release waits.
    poll_interval: Duration,
    history: Mutex<Ring<ResolutionResult>>,
}

/// Bounded history of resolution attempts, most recent last.
pub const HISTORY_CAPACITY: usize = 50;

impl ResolutionExecutor {
    pub fn new(
        process: Arc<dyn ProcessControl>,
        containers: Arc<dyn ContainerControl>,
        probe: Arc<dyn PortProbe>,
        allocator: Arc<FallbackAllocator>,
        approval: Arc<dyn ApprovalGate>,
    ) -> Self {
        Self {
            process,
            containers,
            probe,
            allocator,
            approval,
            grace_period: Duration::from_secs(3),
            poll_interval: Duration::from_millis(250),
            history: Mutex::new(Ring::new(HISTORY_CAPACITY)),
        }
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Execute a plan, verify with a fresh detection, and record the attempt.
    #[tracing::instrument(skip_all, fields(environment = %env.name, actions = plan.actions.len()))]
    pub async fn execute(
        &self,
        plan: &ResolutionPlan,
        conflicts: &[Conflict],
        env: &Environment,
        detector: &ConflictDetector,
        options: &ExecuteOptions,
    ) -> ResolutionResult {
        let started_at = Utc::now();
        let deadline = Instant::now() + options.timeout;
        let mut outcomes = Vec::with_capacity(plan.actions.len());
        let mut errors = Vec::new();

        // Recommendations for conflicts no action can address.
        let mut recommendations: Vec<String> = conflicts
            .iter()
            .filter(|c| !plan.actions.iter().any(|a| a.conflict.port == c.port && a.conflict.kind == c.kind))
            .map(|c| c.recommendation())
            .collect();

        for action in &plan.actions {
            let outcome = self
                .run_action(action, env, options, deadline, &mut errors)
                .await;
            outcomes.push(outcome);
        }

        let result = if options.dry_run {
            // Detector state must be untouched by a dry run.
            self.assemble(
                env,
                conflicts.len(),
                outcomes,
                Vec::new(),
                recommendations,
                errors,
                started_at,
                FinalStatus::DryRunCompleted,
            )
        } else {
            // Re-verify: invalidate, then detect the same service set.
            detector.invalidate(&env.name);
            match detector.detect(env).await {
                Ok(remaining) => {
                    let status = if conflicts.is_empty() {
                        FinalStatus::NoConflicts
                    } else if remaining.is_empty() {
                        FinalStatus::Resolved
                    } else {
                        FinalStatus::PartiallyResolved
                    };
                    recommendations.extend(remaining.iter().map(|c| c.recommendation()));
                    recommendations.dedup();
                    self.assemble(
                        env,
                        conflicts.len(),
                        outcomes,
                        remaining,
                        recommendations,
                        errors,
                        started_at,
                        status,
                    )
                }
                Err(e) => {
                    errors.push(format!("verification scan failed: {}", e));
                    self.assemble(
                        env,
                        conflicts.len(),
                        outcomes,
                        Vec::new(),
                        recommendations,
                        errors,
                        started_at,
                        FinalStatus::Failed,
                    )
                }
            }
        };

        self.history.lock().push(result.clone());
        result
    }

    /// Most-recent-first view of past attempts.
    pub fn history(&self) -> Vec<ResolutionResult> {
        let ring = self.history.lock();
        let mut all = ring.to_vec();
        all.reverse();
        all
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        env: &Environment,
        detected: usize,
        outcomes: Vec<ActionOutcome>,
        remaining: Vec<Conflict>,
        recommendations: Vec<String>,
        errors: Vec<String>,
        started_at: DateTime<Utc>,
        status: FinalStatus,
    ) -> ResolutionResult {
        let resolved = outcomes
            .iter()
            .filter(|o| o.state == ActionState::Succeeded)
            .count();
        let failed = outcomes
            .iter()
            .filter(|o| o.state == ActionState::Failed)
            .count();
        let skipped = outcomes
            .iter()
            .filter(|o| o.state == ActionState::Skipped)
            .count();

        ResolutionResult {
            environment: env.name.clone(),
            status,
            conflicts_detected: detected,
            conflicts_resolved: resolved,
            actions_failed: failed,
            actions_skipped: skipped,
            outcomes,
            remaining,
            recommendations,
            errors,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn run_action(
        &self,
        action: &ResolutionAction,
        env: &Environment,
        options: &ExecuteOptions,
        deadline: Instant,
        errors: &mut Vec<String>,
    ) -> ActionOutcome {
        let start = Instant::now();
        let mut outcome = ActionOutcome {
            kind: action.kind,
            port: action.conflict.port,
            state: ActionState::Pending,
            method: None,
            error: None,
            fallback_port: None,
            elapsed_ms: 0,
        };

        if options.dry_run {
            outcome.state = ActionState::WouldExecute;
            outcome.method = Some(action.describe());
            return outcome;
        }

        // Approval gate, per strategy.
        let approved = match options.strategy {
            Strategy::Automatic => true,
            Strategy::Manual => false,
            Strategy::Fallback => action.kind == ActionKind::UseFallback,
            Strategy::Interactive => {
                if options.auto_approve {
                    true
                } else {
                    match self.approval.approve(action) {
                        Ok(yes) => yes,
                        Err(e) => {
                            errors.push(format!("approval failed: {}", e));
                            false
                        }
                    }
                }
            }
        };
        if !approved {
            tracing::debug!(action = %action.kind, port = action.conflict.port, "action skipped");
            outcome.state = ActionState::Skipped;
            outcome.elapsed_ms = start.elapsed().as_millis() as u64;
            return outcome;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            outcome.state = ActionState::Failed;
            outcome.error = Some("resolution timeout reached before action".to_string());
            errors.push(format!("{}: resolution timeout", action.kind));
            return outcome;
        }

        outcome.state = ActionState::Executing;
        let handled = tokio::time::timeout(
            remaining,
            self.dispatch(action, env, options, &mut outcome),
        )
        .await;

        match handled {
            Ok(Ok(())) => outcome.state = ActionState::Succeeded,
            Ok(Err(e)) => {
                outcome.state = ActionState::Failed;
                outcome.error = Some(e.to_string());
                errors.push(format!("{}: {}", action.kind, e));
            }
            Err(_) => {
                // Timed out: mark and move on to the next action.
                outcome.state = ActionState::Failed;
                outcome.error = Some("action timed out".to_string());
                errors.push(format!("{}: timed out", action.kind));
            }
        }

        outcome.elapsed_ms = start.elapsed().as_millis() as u64;
        outcome
    }

    async fn dispatch(
        &self,
        action: &ResolutionAction,
        env: &Environment,
        options: &ExecuteOptions,
        outcome: &mut ActionOutcome,
    ) -> Result<()> {
        match action.kind {
            ActionKind::KillProcess => self.kill_process(action, options, outcome).await,
            ActionKind::StopContainer => self.stop_container(action, outcome).await,
            ActionKind::UseFallback => self.use_fallback(action, env, outcome).await,
            ActionKind::ChangePort => self.change_port(action, env, outcome).await,
            ActionKind::WaitForRelease => self.wait_for_release(action, options, outcome).await,
        }
    }

    /// Graceful-then-forced termination: SIGTERM, bounded liveness polling,
    /// and SIGKILL only if the process is still alive afterwards.
    async fn kill_process(
        &self,
        action: &ResolutionAction,
        options: &ExecuteOptions,
        outcome: &mut ActionOutcome,
    ) -> Result<()> {
        let pid = action.target_pid.ok_or_else(|| Error::ActionExecution {
            action: "kill_process".to_string(),
            reason: "no target pid".to_string(),
        })?;

        self.process.graceful_stop(pid).await?;

        let polls = options.max_retries.max(1);
        let step = self
            .grace_period
            .checked_div(polls)
            .unwrap_or(self.poll_interval);
        for _ in 0..polls {
            tokio::time::sleep(step).await;
            if !self.process.is_alive(pid).await {
                outcome.method = Some("graceful".to_string());
                tracing::info!(pid, port = action.conflict.port, "process exited gracefully");
                return Ok(());
            }
        }

        tracing::warn!(pid, "still alive after grace period, escalating");
        self.process.force_stop(pid).await?;
        tokio::time::sleep(self.poll_interval).await;
        if self.process.is_alive(pid).await {
            return Err(Error::ActionExecution {
                action: "kill_process".to_string(),
                reason: format!("pid {} survived forced stop", pid),
            });
        }
        outcome.method = Some("forced".to_string());
        Ok(())
    }

    async fn stop_container(
        &self,
        action: &ResolutionAction,
        outcome: &mut ActionOutcome,
    ) -> Result<()> {
        let name = action
            .target_container
            .as_deref()
            .ok_or_else(|| Error::ActionExecution {
                action: "stop_container".to_string(),
                reason: "no target container".to_string(),
            })?;
        self.containers.stop(name).await?;
        outcome.method = Some("container stop".to_string());
        Ok(())
    }

    async fn use_fallback(
        &self,
        action: &ResolutionAction,
        env: &Environment,
        outcome: &mut ActionOutcome,
    ) -> Result<()> {
        let port = self
            .allocator
            .find_fallback(action.conflict.port, env)
            .await?;
        outcome.fallback_port = Some(port);
        outcome.method = Some(format!("fallback to {}", port));
        Ok(())
    }

    /// Recommends an in-range replacement; the registry on disk is never
    /// mutated by the engine.
    async fn change_port(
        &self,
        action: &ResolutionAction,
        env: &Environment,
        outcome: &mut ActionOutcome,
    ) -> Result<()> {
        let search_from = if env.range.contains(action.conflict.port) {
            action.conflict.port
        } else {
            env.range.start
        };
        let port = self.allocator.find_fallback(search_from, env).await?;
        outcome.fallback_port = Some(port);
        outcome.method = Some(format!("reassign to {}", port));
        Ok(())
    }

    async fn wait_for_release(
        &self,
        action: &ResolutionAction,
        options: &ExecuteOptions,
        outcome: &mut ActionOutcome,
    ) -> Result<()> {
        let port = action.conflict.port;
        let polls = options.max_retries.max(1);
        for _ in 0..polls {
            // Probe failure counts as still-occupied; waiting stays
            // conservative.
            if !self.probe.is_occupied(port).await.unwrap_or(true) {
                outcome.method = Some("released".to_string());
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(Error::Timeout(format!(
            "port {} not released after {} polls",
            port, polls
        )))
    }
}
