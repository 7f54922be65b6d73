use std::time::Duration;

use tokio::time::Instant;
use workload_core::memory::{Behavior, Call, InMemoryControlPlane};
use workload_core::{
    DesiredState, Orchestrator, OrchestratorConfig, OrchestratorError, StoreError,
    WorkloadDescriptor,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn wd(name: &str, deps: &[&str]) -> WorkloadDescriptor {
    WorkloadDescriptor::new(name).depends_on(deps.iter().copied())
}

fn setup(catalog: Vec<WorkloadDescriptor>, initial: DesiredState) -> (InMemoryControlPlane, Orchestrator) {
    let cp = InMemoryControlPlane::new();
    cp.seed(catalog, initial);
    let orchestrator = Orchestrator::in_memory(&cp, OrchestratorConfig::default());
    (cp, orchestrator)
}

fn index_of(calls: &[Call], wanted: &Call) -> usize {
    calls
        .iter()
        .position(|c| c == wanted)
        .unwrap_or_else(|| panic!("{wanted:?} not in journal: {calls:?}"))
}

fn update(name: &str, stopped: bool) -> Call {
    Call::UpdateWorkload {
        name: name.into(),
        stopped,
    }
}

fn applied(name: &str, state: DesiredState) -> Call {
    Call::StatusApplied {
        name: name.into(),
        state,
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn dependent_starts_only_after_dependency_converged() {
    let (cp, o) = setup(vec![wd("b", &["a"]), wd("a", &[])], DesiredState::Stopped);

    o.start_all_workloads().await.unwrap();

    let calls = cp.calls();
    let a_converged = index_of(&calls, &applied("a", DesiredState::Running));
    let b_written = index_of(&calls, &update("b", false));
    assert!(index_of(&calls, &update("a", false)) < a_converged);
    assert!(a_converged < b_written);
}

#[tokio::test(start_paused = true)]
async fn every_transitive_dependency_converges_first() {
    let catalog = vec![
        wd("web", &["api", "cdn"]),
        wd("api", &["db", "cache"]),
        wd("cache", &["db"]),
        wd("cdn", &[]),
        wd("db", &[]),
    ];
    let (cp, o) = setup(catalog.clone(), DesiredState::Stopped);
    cp.set_behavior(
        "db",
        Behavior::Converge {
            delay: Duration::from_secs(3),
        },
    );

    o.start_all_workloads().await.unwrap();

    let calls = cp.calls();
    for d in &catalog {
        let written = index_of(&calls, &update(&d.name, false));
        for dep in &d.dependencies {
            assert!(index_of(&calls, &applied(dep, DesiredState::Running)) < written);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn stop_all_waits_for_dependents() {
    let (cp, o) = setup(vec![wd("b", &["a"]), wd("a", &[])], DesiredState::Running);

    o.stop_all_workloads().await.unwrap();

    let calls = cp.calls();
    assert!(index_of(&calls, &applied("b", DesiredState::Stopped)) < index_of(&calls, &update("a", true)));
    assert!(cp.workload("a").unwrap().status.stopped);
}

#[tokio::test(start_paused = true)]
async fn start_all_waits_on_already_running_workloads() {
    let (cp, o) = setup(vec![wd("a", &[]), wd("b", &["a"])], DesiredState::Running);

    o.start_all_workloads().await.unwrap();

    assert!(!cp
        .calls()
        .iter()
        .any(|c| matches!(c, Call::UpdateWorkload { .. })));
}

#[tokio::test(start_paused = true)]
async fn wide_wave_of_independent_workloads_converges() {
    let names: Vec<String> = (0..300).map(|i| format!("w{i:03}")).collect();
    let catalog = names.iter().map(|n| wd(n, &[])).collect();
    let (cp, o) = setup(catalog, DesiredState::Stopped);

    o.start_all_workloads().await.unwrap();

    let calls = cp.calls();
    for name in &names {
        index_of(&calls, &applied(name, DesiredState::Running));
    }
    assert_eq!(cp.active_subscriptions(), 0);
}

// ---------------------------------------------------------------------------
// Failure modes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cyclic_catalog_fails_the_same_way_twice() {
    let (cp, o) = setup(
        vec![wd("a", &["c"]), wd("b", &["a"]), wd("c", &["b"]), wd("d", &[])],
        DesiredState::Stopped,
    );
    let first = o.start_all_workloads().await.unwrap_err().to_string();
    let second = o.start_all_workloads().await.unwrap_err().to_string();
    assert_eq!(first, second);
    assert!(first.contains("dependency cycle detected among workloads: a, b, c"));
    assert!(cp.workload("d").unwrap().spec.stopped);
}

#[tokio::test]
async fn empty_names_make_no_collaborator_calls() {
    let (cp, o) = setup(vec![], DesiredState::Stopped);
    assert!(matches!(
        o.start_workload_with_wait("", true).await,
        Err(OrchestratorError::Validation(_))
    ));
    assert!(matches!(o.stop_workload("").await, Err(OrchestratorError::Validation(_))));
    assert!(matches!(
        o.restart_workload_with_wait("", true).await,
        Err(OrchestratorError::Validation(_))
    ));
    assert!(cp.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn permanent_conflicts_exhaust_retries() {
    let (cp, o) = setup(vec![wd("a", &[])], DesiredState::Stopped);
    cp.inject_conflicts("a", u32::MAX);

    let err = o.start_workload("a").await.unwrap_err();
    assert!(matches!(
        err.root_cause(),
        OrchestratorError::ConflictRetryExhausted { attempts: 5, .. }
    ));
    assert!(err.to_string().starts_with("failed to start a: "));
}

#[tokio::test(start_paused = true)]
async fn crash_loop_beats_a_long_timeout() {
    let (cp, o) = setup(vec![wd("a", &[])], DesiredState::Stopped);
    cp.set_behavior(
        "a",
        Behavior::CrashLoop {
            process: "server".into(),
        },
    );
    let o = o.with_wait_timeout(Duration::from_secs(3600));

    let started = Instant::now();
    let err = o.start_workload_with_wait("a", true).await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(3600));
    match err.root_cause() {
        OrchestratorError::CrashLoop { name, process, .. } => {
            assert_eq!(name, "a");
            assert_eq!(process, "server");
        }
        other => panic!("expected CrashLoop, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn crash_looping_workload_can_still_be_stopped() {
    let (cp, o) = setup(vec![wd("a", &[])], DesiredState::Running);
    cp.set_behavior(
        "a",
        Behavior::CrashLoop {
            process: "server".into(),
        },
    );
    cp.set_crash_loop("a", "server", false);

    o.stop_workload_with_wait("a", true).await.unwrap();
    let status = cp.workload("a").unwrap().status;
    assert!(status.stopped);
    assert!(status.processes.iter().all(|p| p.waiting_reason.is_none()));
}

#[tokio::test(start_paused = true)]
async fn hanging_workload_times_out_at_deadline() {
    let (cp, o) = setup(vec![wd("a", &[])], DesiredState::Stopped);
    cp.set_behavior("a", Behavior::Hang);
    let o = o.with_wait_timeout(Duration::from_secs(90));

    let started = Instant::now();
    let err = o.start_workload_with_wait("a", true).await.unwrap_err();
    assert_eq!(started.elapsed(), Duration::from_secs(90));
    assert!(matches!(err.root_cause(), OrchestratorError::TimedOut { .. }));
    assert_eq!(cp.active_subscriptions(), 0);
}

#[tokio::test]
async fn log_level_reports_every_failure() {
    let names = ["a", "b", "c", "d", "e"];
    let (cp, o) = setup(names.iter().map(|n| wd(n, &[])).collect(), DesiredState::Running);
    cp.fail_config_get("a", StoreError::Unavailable("down".into()));
    cp.fail_config_update("c", StoreError::Unavailable("down".into()));
    cp.fail_config_get("e", StoreError::Unavailable("down".into()));

    let err = o.set_log_level_in_all_workloads("WARN").await.unwrap_err();
    let OrchestratorError::Aggregate(agg) = err else {
        panic!("expected Aggregate");
    };
    assert_eq!(agg.len(), 3);
    assert_eq!(agg.workloads().collect::<Vec<_>>(), vec!["a", "c", "e"]);

    let set: Vec<&str> = names
        .iter()
        .copied()
        .filter(|n| cp.config(n).unwrap().root_log_level() == Some("WARN"))
        .collect();
    assert_eq!(set, vec!["b", "d"]);
}

#[tokio::test(start_paused = true)]
async fn restart_wait_failure_differs_from_creation_failure() {
    let (cp, o) = setup(vec![wd("svc", &[])], DesiredState::Running);
    cp.fail_restart_watch("connection reset");

    let wait_err = o.restart_workload_with_wait("svc", true).await.unwrap_err();
    assert!(wait_err
        .to_string()
        .starts_with("error waiting for svc while restarting: "));

    cp.fail_restart_create(StoreError::Unavailable("apiserver".into()));
    let create_err = o.restart_workload_with_wait("svc", true).await.unwrap_err();
    assert!(create_err.to_string().starts_with("failed to restart svc: "));
}

#[tokio::test]
async fn catalog_failure_aborts_bulk_operations() {
    let (cp, o) = setup(vec![wd("a", &[])], DesiredState::Stopped);
    cp.fail_catalog(StoreError::Unavailable("catalog offline".into()));

    let err = o.start_all_workloads().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::CatalogFetch(_)));
    assert_eq!(cp.calls(), vec![Call::ListCatalog]);
}
