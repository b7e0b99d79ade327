//! Executor semantics: dry-run, strategies, timeouts, and failure capture.

mod common;

use common::MockWorld;
use port_warden::registry::{Environment, IsolationLevel, PortRange, Registry};
use port_warden::resolution::{ActionKind, ActionState, ExecuteOptions, Strategy};
use port_warden::{FinalStatus, Warden};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn warden_with(world: &Arc<MockWorld>) -> Warden {
    Warden::builder()
        .registry(Registry::builtin())
        .probe(world.clone())
        .process_control(world.clone())
        .container_control(world.clone())
        .grace_period(Duration::from_millis(50))
        .build()
        .unwrap()
}

// Dry run never touches process or container control, and leaves the
// detector's cached state untouched.
#[tokio::test]
async fn dry_run_is_side_effect_free() {
    let world = Arc::new(MockWorld::new());
    world.occupy_with_process(21001, "node", 100);
    world.occupy_with_container(21002, "legacy-web");
    let warden = warden_with(&world);

    let options = ExecuteOptions {
        strategy: Strategy::Automatic,
        dry_run: true,
        timeout: Duration::from_secs(10),
        ..ExecuteOptions::default()
    };
    let result = warden
        .resolve_conflicts("development", options)
        .await
        .unwrap();

    assert_eq!(result.status, FinalStatus::DryRunCompleted);
    assert_eq!(result.outcomes.len(), 2);
    assert!(result
        .outcomes
        .iter()
        .all(|o| o.state == ActionState::WouldExecute));
    assert!(world.graceful_sent().is_empty());
    assert!(world.force_sent().is_empty());
    assert!(world.container_stops().is_empty());

    // The cached scan survives: a follow-up read costs no new probe calls.
    let calls = world.probe_calls();
    let conflicts = warden.get_conflicts("development").await.unwrap();
    assert_eq!(conflicts.len(), 2);
    assert_eq!(world.probe_calls(), calls);
}

// Manual strategy executes nothing; the plan surfaces as recommendations.
#[tokio::test]
async fn manual_strategy_skips_everything() {
    let world = Arc::new(MockWorld::new());
    world.occupy_with_process(21001, "node", 100);
    let warden = warden_with(&world);

    let options = ExecuteOptions {
        strategy: Strategy::Manual,
        timeout: Duration::from_secs(10),
        ..ExecuteOptions::default()
    };
    let result = warden
        .resolve_conflicts("development", options)
        .await
        .unwrap();

    assert_eq!(result.actions_skipped, 1);
    assert!(world.graceful_sent().is_empty());
    assert_eq!(result.status, FinalStatus::PartiallyResolved);
    assert!(!result.recommendations.is_empty());
}

// Fallback strategy runs only fallback allocations, skipping kills.
#[tokio::test]
async fn fallback_strategy_only_allocates() {
    let world = Arc::new(MockWorld::new());
    world.occupy_with_process(21001, "node", 100);
    world.occupy_unknown(21003);
    let warden = warden_with(&world);

    let options = ExecuteOptions {
        strategy: Strategy::Fallback,
        timeout: Duration::from_secs(10),
        ..ExecuteOptions::default()
    };
    let result = warden
        .resolve_conflicts("development", options)
        .await
        .unwrap();

    assert!(world.graceful_sent().is_empty());
    let fallback = result
        .outcomes
        .iter()
        .find(|o| o.kind == ActionKind::UseFallback)
        .unwrap();
    assert_eq!(fallback.state, ActionState::Succeeded);
    assert!(fallback.fallback_port.is_some());
    let kill = result
        .outcomes
        .iter()
        .find(|o| o.kind == ActionKind::KillProcess)
        .unwrap();
    assert_eq!(kill.state, ActionState::Skipped);
}

// Exhausted fallback search is an action failure, not a process abort.
#[tokio::test]
async fn exhausted_fallback_is_recorded_not_thrown() {
    let mut registry = Registry::builtin();
    // Tiny band: api at the very top, nothing above it to fall back to.
    let mut services = BTreeMap::new();
    services.insert("api".to_string(), 21004);
    registry.environments.insert(
        "development".to_string(),
        Environment {
            name: "development".to_string(),
            range: PortRange::new(21000, 21005),
            services,
            isolation: IsolationLevel::Strict,
            auto_resolve: true,
            allow_fallback: true,
            priority: 10,
        },
    );

    let world = Arc::new(MockWorld::new());
    world.occupy_unknown(21004);
    world.occupy_unknown(21005);
    let warden = Warden::builder()
        .registry(registry)
        .probe(world.clone())
        .process_control(world.clone())
        .container_control(world.clone())
        .build()
        .unwrap();

    let options = ExecuteOptions {
        strategy: Strategy::Automatic,
        timeout: Duration::from_secs(10),
        ..ExecuteOptions::default()
    };
    let result = warden
        .resolve_conflicts("development", options)
        .await
        .unwrap();

    assert_eq!(result.actions_failed, 1);
    assert_eq!(result.status, FinalStatus::PartiallyResolved);
    assert!(result.errors.iter().any(|e| e.contains("fallback")));
}

// wait_for_release polls a bounded number of times, then fails; the plan
// is not aborted by the failure.
#[tokio::test]
async fn wait_for_release_times_out_and_plan_continues() {
    let mut registry = Registry::builtin();
    let mut services = BTreeMap::new();
    services.insert("api".to_string(), 21001);
    services.insert("web".to_string(), 21002);
    registry.environments.insert(
        "development".to_string(),
        Environment {
            name: "development".to_string(),
            range: PortRange::new(21000, 21999),
            services,
            isolation: IsolationLevel::Strict,
            auto_resolve: true,
            // Fallback disallowed: unknown occupants become waits.
            allow_fallback: false,
            priority: 10,
        },
    );

    let world = Arc::new(MockWorld::new());
    world.occupy_unknown(21001);
    world.occupy_with_process(21002, "node", 100);
    let warden = Warden::builder()
        .registry(registry)
        .probe(world.clone())
        .process_control(world.clone())
        .container_control(world.clone())
        .grace_period(Duration::from_millis(50))
        .build()
        .unwrap();

    let options = ExecuteOptions {
        strategy: Strategy::Automatic,
        max_retries: 2,
        timeout: Duration::from_secs(30),
        ..ExecuteOptions::default()
    };
    let result = warden
        .resolve_conflicts("development", options)
        .await
        .unwrap();

    let wait = result
        .outcomes
        .iter()
        .find(|o| o.kind == ActionKind::WaitForRelease)
        .unwrap();
    assert_eq!(wait.state, ActionState::Failed);

    // The failed wait did not abort the plan: the kill action also ran.
    let kill = result
        .outcomes
        .iter()
        .find(|o| o.kind == ActionKind::KillProcess)
        .unwrap();
    assert_eq!(kill.state, ActionState::Succeeded);
    assert_eq!(result.status, FinalStatus::PartiallyResolved);
}

// The overall timeout marks late actions failed instead of hanging.
#[tokio::test]
async fn overall_timeout_fails_remaining_actions() {
    let world = Arc::new(MockWorld::new());
    world.occupy_unknown(21001); // wait_for_release would poll for a while
    let mut registry = Registry::builtin();
    if let Some(env) = registry.environments.get_mut("development") {
        env.allow_fallback = false;
    }
    let warden = Warden::builder()
        .registry(registry)
        .probe(world.clone())
        .process_control(world.clone())
        .container_control(world.clone())
        .build()
        .unwrap();

    let options = ExecuteOptions {
        strategy: Strategy::Automatic,
        max_retries: 1000,
        timeout: Duration::from_millis(100),
        ..ExecuteOptions::default()
    };
    let result = warden
        .resolve_conflicts("development", options)
        .await
        .unwrap();

    assert_eq!(result.actions_failed, 1);
    assert!(result.outcomes[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("timed out"));
}

// Concurrent passes against one environment are refused up front.
#[tokio::test]
async fn concurrent_resolution_is_refused() {
    let world = Arc::new(MockWorld::new());
    world.occupy_unknown(21001);
    let mut registry = Registry::builtin();
    if let Some(env) = registry.environments.get_mut("development") {
        env.allow_fallback = false;
    }
    let warden = Arc::new(
        Warden::builder()
            .registry(registry)
            .probe(world.clone())
            .process_control(world.clone())
            .container_control(world.clone())
            .build()
            .unwrap(),
    );

    // First pass will sit in wait_for_release polls for a moment.
    let slow = ExecuteOptions {
        strategy: Strategy::Automatic,
        max_retries: 8,
        timeout: Duration::from_secs(30),
        ..ExecuteOptions::default()
    };
    let first = {
        let warden = warden.clone();
        tokio::spawn(async move { warden.resolve_conflicts("development", slow).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = warden
        .resolve_conflicts("development", ExecuteOptions::default())
        .await;
    assert!(second.is_err());

    first.await.unwrap().unwrap();
    // Slot released: a new pass is accepted.
    let replay = ExecuteOptions {
        dry_run: true,
        ..ExecuteOptions::default()
    };
    assert!(warden
        .resolve_conflicts("development", replay)
        .await
        .is_ok());
}
