//! The central engine: an explicitly constructed instance owning the
//! registry, resolver, detector, planner, executor, caches, and history.
//!
//! There is no module-level shared state; callers hold a `Warden` (usually
//! behind an `Arc`) and everything flows through it.
//!
//! # Concurrency model
//!
//! Each operation (switch, scan, resolution) is one sequential unit of work.
//! An in-flight set keyed by environment name guarantees that no two
//! resolution passes run concurrently against the same environment and lets
//! the monitor suppress scans that would interleave with one. All caches and
//! histories sit behind `parking_lot` locks that are never held across await
//! points.

use crate::conflict::{Conflict, ConflictDetector, DEFAULT_CACHE_TTL};
use crate::error::{Error, Result};
use crate::isolation::IsolationValidator;
use crate::probe::{
    ContainerControl, DockerContainerControl, PortProbe, ProcessControl, SignalProcessControl,
    SystemProbe,
};
use crate::registry::Registry;
use crate::resolution::{
    ApprovalGate, DenyAll, ExecuteOptions, FallbackAllocator, ResolutionExecutor, ResolutionPlan,
    ResolutionPlanner, ResolutionResult, DEFAULT_MAX_ATTEMPTS,
};
use crate::resolver::{EnvironmentResolver, SwitchRecord, WardenEvent};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub struct WardenBuilder {
    registry: Option<Registry>,
    workdir: PathBuf,
    probe: Option<Arc<dyn PortProbe>>,
    process: Option<Arc<dyn ProcessControl>>,
    containers: Option<Arc<dyn ContainerControl>>,
    approval: Option<Arc<dyn ApprovalGate>>,
    cache_ttl: Duration,
    grace_period: Duration,
}

impl WardenBuilder {
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn workdir(mut self, workdir: PathBuf) -> Self {
        self.workdir = workdir;
        self
    }

    pub fn probe(mut self, probe: Arc<dyn PortProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn process_control(mut self, control: Arc<dyn ProcessControl>) -> Self {
        self.process = Some(control);
        self
    }

    pub fn container_control(mut self, control: Arc<dyn ContainerControl>) -> Self {
        self.containers = Some(control);
        self
    }

    pub fn approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval = Some(gate);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn build(self) -> Result<Warden> {
        let registry = self.registry.unwrap_or_default();
        registry.validate()?;
        let registry = Arc::new(registry);

        let probe = self.probe.unwrap_or_else(|| Arc::new(SystemProbe::new()));
        let process = self
            .process
            .unwrap_or_else(|| Arc::new(SignalProcessControl::new()));
        let containers = self
            .containers
            .unwrap_or_else(|| Arc::new(DockerContainerControl::new()));
        let approval = self.approval.unwrap_or_else(|| Arc::new(DenyAll));

        let allocator = Arc::new(FallbackAllocator::new(probe.clone(), DEFAULT_MAX_ATTEMPTS));
        let executor = ResolutionExecutor::new(
            process,
            containers,
            probe.clone(),
            allocator.clone(),
            approval,
        )
        .with_grace_period(self.grace_period);

        Ok(Warden {
            resolver: EnvironmentResolver::new(registry.clone(), self.workdir),
            validator: IsolationValidator::new(registry.clone()),
            detector: ConflictDetector::new(probe, self.cache_ttl),
            planner: ResolutionPlanner::new(),
            executor,
            allocator,
            registry,
            in_flight: Mutex::new(HashSet::new()),
        })
    }
}

/// Conflict detection, planning and resolution engine for one registry.
pub struct Warden {
    registry: Arc<Registry>,
    resolver: EnvironmentResolver,
    validator: IsolationValidator,
    detector: ConflictDetector,
    planner: ResolutionPlanner,
    executor: ResolutionExecutor,
    allocator: Arc<FallbackAllocator>,
    /// Environments with a resolution pass in flight.
    in_flight: Mutex<HashSet<String>>,
}

impl Warden {
    pub fn builder() -> WardenBuilder {
        WardenBuilder {
            registry: None,
            workdir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            probe: None,
            process: None,
            containers: None,
            approval: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            grace_period: Duration::from_secs(3),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Pick the active environment from signals, heuristics, or fallback.
    pub fn resolve(&self) -> Result<String> {
        self.resolver.resolve()
    }

    pub fn active_environment(&self) -> Option<String> {
        self.resolver.active()
    }

    pub fn confirm_production(&self, confirmed: bool) {
        self.resolver.confirm_production(confirmed);
    }

    /// Gated environment switch. On success all engine caches are cleared:
    /// a stale scan or memoized fallback from the previous environment must
    /// never leak across.
    pub fn switch_to(&self, target: &str, force: bool) -> Result<String> {
        let name = self.resolver.switch_to(target, force)?;
        self.detector.invalidate_all();
        self.allocator.clear();
        Ok(name)
    }

    pub fn switch_history(&self) -> Vec<SwitchRecord> {
        self.resolver.history()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WardenEvent> {
        self.resolver.subscribe()
    }

    pub(crate) fn publish(&self, event: WardenEvent) {
        self.resolver.publish(event);
    }

    /// Read-only detection scan (cached).
    pub async fn get_conflicts(&self, environment: &str) -> Result<Vec<Conflict>> {
        let env = self.registry.get(environment)?;
        self.detector.detect(env).await
    }

    /// Read-only isolation validation: boundaries plus cross-environment.
    pub fn validate_isolation(&self, environment: &str) -> Result<Vec<Conflict>> {
        let env = self.registry.get(environment)?;
        Ok(self.validator.validate(env))
    }

    /// Build a plan from the current conflicts without executing it.
    pub async fn build_plan(&self, environment: &str) -> Result<(Vec<Conflict>, ResolutionPlan)> {
        let env = self.registry.get(environment)?;
        let conflicts = self.detector.detect(env).await?;
        let plan = self.planner.plan(&conflicts, env);
        Ok((conflicts, plan))
    }

    /// Single public remediation entry point: detect, plan, execute, verify.
    ///
    /// Fatal errors (unknown environment, concurrent pass) surface as `Err`;
    /// every action-level failure is folded into the returned result.
    pub async fn resolve_conflicts(
        &self,
        environment: &str,
        options: ExecuteOptions,
    ) -> Result<ResolutionResult> {
        let env = self.registry.get(environment)?;
        let _guard = self.begin_resolution(environment)?;

        let conflicts = self.detector.detect(env).await?;
        let plan = self.planner.plan(&conflicts, env);
        tracing::info!(
            environment,
            conflicts = conflicts.len(),
            actions = plan.actions.len(),
            aggregate_risk = %plan.aggregate_risk,
            dry_run = options.dry_run,
            "executing resolution plan"
        );

        let result = self
            .executor
            .execute(&plan, &conflicts, env, &self.detector, &options)
            .await;
        Ok(result)
    }

    /// Past resolution attempts, most recent first.
    pub fn resolution_history(&self) -> Vec<ResolutionResult> {
        self.executor.history()
    }

    /// Direct fallback search, bounded by the environment's range.
    pub async fn find_fallback(&self, port: u16, environment: &str) -> Result<u16> {
        let env = self.registry.get(environment)?;
        self.allocator.find_fallback(port, env).await
    }

    /// True while a resolution pass holds the environment. The monitor
    /// checks this to suppress overlapping scans.
    pub fn resolution_in_flight(&self, environment: &str) -> bool {
        self.in_flight.lock().contains(environment)
    }

    fn begin_resolution(&self, environment: &str) -> Result<InFlightGuard<'_>> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(environment.to_string()) {
            return Err(Error::ActionExecution {
                action: "resolve_conflicts".to_string(),
                reason: format!("a resolution for '{}' is already in flight", environment),
            });
        }
        Ok(InFlightGuard {
            warden: self,
            environment: environment.to_string(),
        })
    }
}

/// Releases the in-flight slot when a resolution pass ends, on every path.
struct InFlightGuard<'a> {
    warden: &'a Warden,
    environment: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.warden.in_flight.lock().remove(&self.environment);
    }
}
