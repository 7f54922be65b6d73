#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CATALOG: &str = "\
workloads:
  - name: web
    dependencies: [api]
  - name: api
    dependencies: [db]
  - name: db
";

fn workloadctl(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("workloadctl").unwrap();
    cmd.current_dir(dir.path())
        .env("WORKLOADCTL_CATALOG", dir.path().join("workloads.yaml"))
        .env_remove("RUST_LOG");
    cmd
}

fn with_catalog(yaml: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("workloads.yaml"), yaml).unwrap();
    dir
}

// ---------------------------------------------------------------------------
// workloadctl plan
// ---------------------------------------------------------------------------

#[test]
fn plan_lists_waves_dependencies_first() {
    let dir = with_catalog(CATALOG);
    let out = workloadctl(&dir).args(["plan", "--json"]).output().unwrap();
    assert!(out.status.success());

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["direction"], "start");
    assert_eq!(v["waves"], serde_json::json!([["db"], ["api"], ["web"]]));
}

#[test]
fn plan_stop_reverses() {
    let dir = with_catalog(CATALOG);
    let out = workloadctl(&dir)
        .args(["plan", "stop", "--json"])
        .output()
        .unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["waves"], serde_json::json!([["web"], ["api"], ["db"]]));
}

#[test]
fn plan_table_shows_declared_dependencies() {
    let dir = with_catalog(CATALOG);
    workloadctl(&dir)
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("WAVE"))
        .stdout(predicate::str::contains("web       api"));
}

#[test]
fn plan_fails_on_cycle() {
    let dir = with_catalog(
        "workloads:\n  - name: a\n    dependencies: [b]\n  - name: b\n    dependencies: [a]\n",
    );
    workloadctl(&dir)
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("dependency cycle detected"));
}

#[test]
fn missing_catalog_is_reported() {
    let dir = TempDir::new().unwrap();
    workloadctl(&dir)
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read catalog"));
}

// ---------------------------------------------------------------------------
// workloadctl check
// ---------------------------------------------------------------------------

#[test]
fn check_passes_clean_catalog() {
    let dir = with_catalog(CATALOG);
    workloadctl(&dir)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("3 workloads, no problems found."));
}

#[test]
fn check_warns_about_external_dependency() {
    let dir = with_catalog("workloads:\n  - name: a\n    dependencies: [ingress]\n");
    workloadctl(&dir)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("[warning] a depends on 'ingress'"));
}

#[test]
fn check_rejects_duplicate_names() {
    let dir = with_catalog("workloads:\n  - name: a\n  - name: a\n");
    workloadctl(&dir)
        .arg("check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"))
        .stderr(predicate::str::contains("check found errors"));
}

// ---------------------------------------------------------------------------
// workloadctl simulate
// ---------------------------------------------------------------------------

#[test]
fn simulate_start_all_converges_in_order() {
    let dir = with_catalog(CATALOG);
    let out = workloadctl(&dir)
        .args(["simulate", "--delay-ms", "1", "--json", "start-all"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["ok"], true);
    let converged: Vec<&str> = v["journal"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["event"] == "converged")
        .map(|e| e["workload"].as_str().unwrap())
        .collect();
    assert_eq!(converged, vec!["db", "api", "web"]);
}

#[test]
fn simulate_crash_loop_fails() {
    let dir = with_catalog(CATALOG);
    workloadctl(&dir)
        .args(["simulate", "--delay-ms", "1", "--crash", "api", "start-all"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to start all workloads"))
        .stderr(predicate::str::contains("api is crash-looping"));
}

#[test]
fn simulate_hang_times_out() {
    let dir = with_catalog(CATALOG);
    workloadctl(&dir)
        .args([
            "simulate", "--delay-ms", "1", "--hang", "db", "--timeout", "1", "start", "db",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("timed out after 1s waiting for db"));
}

#[test]
fn simulate_log_level_touches_every_workload() {
    let dir = with_catalog(CATALOG);
    workloadctl(&dir)
        .args(["simulate", "log-level", "DEBUG"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config updated").count(3));
}

#[test]
fn simulate_restart_without_wait() {
    let dir = with_catalog(CATALOG);
    workloadctl(&dir)
        .args(["simulate", "restart", "api", "--no-wait"])
        .assert()
        .success()
        .stdout(predicate::str::contains("restart requested"));
}

#[test]
fn simulate_rejects_empty_name() {
    let dir = with_catalog(CATALOG);
    workloadctl(&dir)
        .args(["simulate", "stop", ""])
        .assert()
        .failure()
        .stderr(predicate::str::contains("workload name must not be empty"));
}

// ---------------------------------------------------------------------------
// workloadctl config
// ---------------------------------------------------------------------------

#[test]
fn config_init_then_show() {
    let dir = TempDir::new().unwrap();
    workloadctl(&dir)
        .args(["config", "init"])
        .assert()
        .success();
    assert!(dir.path().join("workloadctl.yaml").exists());

    workloadctl(&dir)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    workloadctl(&dir)
        .args(["--config", "workloadctl.yaml", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("timeout_seconds: 600"));
}

#[test]
fn config_show_flags_invalid_values() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("bad.yaml"),
        "retry:\n  max_attempts: 0\n",
    )
    .unwrap();
    workloadctl(&dir)
        .args(["--config", "bad.yaml", "config", "show", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("retry.max_attempts must be at least 1"));
}
