use crate::catalog::{load_catalog, load_config};
use crate::output::{print_json, print_table};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use workload_core::memory::{Behavior, Call, InMemoryControlPlane};
use workload_core::{DesiredState, Orchestrator};

#[derive(Args)]
pub struct SimulateArgs {
    /// How long the simulated controller takes to act, in milliseconds
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,

    /// Workload whose processes crash-loop when started (repeatable)
    #[arg(long, value_name = "WORKLOAD")]
    crash: Vec<String>,

    /// Workload the simulated controller never acts on (repeatable)
    #[arg(long, value_name = "WORKLOAD")]
    hang: Vec<String>,

    /// Override the wait timeout, in seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    action: SimulateAction,
}

#[derive(Subcommand)]
pub enum SimulateAction {
    /// Start every workload, dependencies first
    StartAll,
    /// Stop every workload, dependents first
    StopAll,
    /// Start one workload
    Start {
        name: String,
        /// Return once the desired state is written
        #[arg(long)]
        no_wait: bool,
    },
    /// Stop one workload
    Stop {
        name: String,
        #[arg(long)]
        no_wait: bool,
    },
    /// Restart one workload
    Restart {
        name: String,
        #[arg(long)]
        no_wait: bool,
    },
    /// Set the root log level in every workload
    LogLevel { level: String },
}

impl SimulateAction {
    /// Workloads start out stopped only when the action is going to start them.
    fn initial_state(&self) -> DesiredState {
        match self {
            SimulateAction::StartAll | SimulateAction::Start { .. } => DesiredState::Stopped,
            _ => DesiredState::Running,
        }
    }
}

#[derive(Serialize)]
struct JournalEntry {
    step: usize,
    event: &'static str,
    workload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[derive(Serialize)]
struct SimulationOutput<'a> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    journal: &'a [JournalEntry],
}

pub fn run(
    catalog: &Path,
    config: Option<&Path>,
    args: SimulateArgs,
    json: bool,
) -> anyhow::Result<()> {
    let descriptors = load_catalog(catalog)?;
    let mut config = load_config(config)?;
    if let Some(secs) = args.timeout {
        config.wait.timeout_seconds = secs;
    }
    config.ensure_valid()?;

    let plane = InMemoryControlPlane::new();
    plane.seed(descriptors, args.action.initial_state());
    plane.set_default_behavior(Behavior::Converge {
        delay: Duration::from_millis(args.delay_ms),
    });
    for name in &args.crash {
        plane.set_behavior(
            name,
            Behavior::CrashLoop {
                process: "main".to_string(),
            },
        );
    }
    for name in &args.hang {
        plane.set_behavior(name, Behavior::Hang);
    }

    let orchestrator = Orchestrator::in_memory(&plane, config);
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = rt.block_on(async {
        match &args.action {
            SimulateAction::StartAll => orchestrator.start_all_workloads().await,
            SimulateAction::StopAll => orchestrator.stop_all_workloads().await,
            SimulateAction::Start { name, no_wait } => {
                orchestrator.start_workload_with_wait(name, !no_wait).await
            }
            SimulateAction::Stop { name, no_wait } => {
                orchestrator.stop_workload_with_wait(name, !no_wait).await
            }
            SimulateAction::Restart { name, no_wait } => orchestrator
                .restart_workload_with_wait(name, !no_wait)
                .await
                .map(|_| ()),
            SimulateAction::LogLevel { level } => {
                orchestrator.set_log_level_in_all_workloads(level).await
            }
        }
    });

    let journal = journal(&plane.calls());
    if json {
        print_json(&SimulationOutput {
            ok: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
            journal: &journal,
        })?;
    } else if journal.is_empty() {
        println!("No changes issued.");
    } else {
        let rows: Vec<Vec<String>> = journal
            .iter()
            .map(|e| {
                vec![
                    e.step.to_string(),
                    e.event.to_string(),
                    e.workload.clone(),
                    e.detail.clone().unwrap_or_default(),
                ]
            })
            .collect();
        print_table(&["STEP", "EVENT", "WORKLOAD", "DETAIL"], &rows);
    }

    result?;
    Ok(())
}

/// The calls worth showing an operator: writes, rejected writes and observed
/// convergence.
fn journal(calls: &[Call]) -> Vec<JournalEntry> {
    calls
        .iter()
        .filter_map(|call| match call {
            Call::UpdateWorkload { name, stopped } => Some((
                "desired state set",
                name.clone(),
                Some(DesiredState::from_stopped(*stopped).to_string()),
            )),
            Call::StatusApplied { name, state } => {
                Some(("converged", name.clone(), Some(state.to_string())))
            }
            Call::CreateRestart { target } => Some(("restart requested", target.clone(), None)),
            Call::UpdateConfig(name) => Some(("config updated", name.clone(), None)),
            Call::WriteRejected { kind, name, reason } => Some((
                "write rejected",
                name.clone(),
                Some(format!("{kind}: {reason}")),
            )),
            _ => None,
        })
        .enumerate()
        .map(|(i, (event, workload, detail))| JournalEntry {
            step: i + 1,
            event,
            workload,
            detail,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_keeps_writes_and_convergence() {
        let calls = vec![
            Call::ListCatalog,
            Call::GetWorkload("a".into()),
            Call::UpdateWorkload {
                name: "a".into(),
                stopped: false,
            },
            Call::SubscribeWorkload("a".into()),
            Call::StatusApplied {
                name: "a".into(),
                state: DesiredState::Running,
            },
        ];
        let entries = journal(&calls);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, "desired state set");
        assert_eq!(entries[0].detail.as_deref(), Some("running"));
        assert_eq!(entries[1].step, 2);
        assert_eq!(entries[1].event, "converged");
    }

    #[test]
    fn rejected_write_is_not_shown_as_applied() {
        let calls = vec![
            Call::WriteRejected {
                kind: "config",
                name: "a".into(),
                reason: "control plane unavailable: down".into(),
            },
            Call::UpdateConfig("b".into()),
        ];
        let entries = journal(&calls);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, "write rejected");
        assert_eq!(entries[0].workload, "a");
        assert_eq!(
            entries[0].detail.as_deref(),
            Some("config: control plane unavailable: down")
        );
        assert_eq!(entries[1].event, "config updated");
    }
}
