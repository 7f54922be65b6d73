use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Waiting reason the control plane reports for a process that keeps dying.
pub const CRASH_LOOP_REASON: &str = "CrashLoopBackOff";

/// Configuration key holding a workload's root log level.
pub const ROOT_LOG_LEVEL_KEY: &str = "logging/root";

// ---------------------------------------------------------------------------
// WorkloadDescriptor
// ---------------------------------------------------------------------------

/// Static catalog metadata for one workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadDescriptor {
    pub name: String,
    /// Workloads that must be running before this one starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl WorkloadDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }
}

// ---------------------------------------------------------------------------
// DesiredState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    Running,
    Stopped,
}

impl DesiredState {
    pub fn from_stopped(stopped: bool) -> Self {
        if stopped {
            DesiredState::Stopped
        } else {
            DesiredState::Running
        }
    }

    pub fn is_stopped(self) -> bool {
        matches!(self, DesiredState::Stopped)
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesiredState::Running => f.write_str("running"),
            DesiredState::Stopped => f.write_str("stopped"),
        }
    }
}

// ---------------------------------------------------------------------------
// ManagedWorkload
// ---------------------------------------------------------------------------

/// Mutable part of a workload; the only field the orchestrator writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub stopped: bool,
}

/// Runtime state of one managed process inside a workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub name: String,
    pub ready: bool,
    #[serde(default)]
    pub restart_count: u32,
    /// Why the process is not running, e.g. `CrashLoopBackOff`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_reason: Option<String>,
}

impl ProcessStatus {
    pub fn is_crash_looping(&self) -> bool {
        self.waiting_reason.as_deref() == Some(CRASH_LOOP_REASON)
    }
}

/// Observed state, written only by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadStatus {
    pub stopped: bool,
    pub ready: bool,
    #[serde(default)]
    pub processes: Vec<ProcessStatus>,
}

impl WorkloadStatus {
    /// Whether the observed state satisfies `desired`.
    pub fn satisfies(&self, desired: DesiredState) -> bool {
        match desired {
            DesiredState::Stopped => self.stopped,
            DesiredState::Running => !self.stopped && self.ready,
        }
    }

    /// The first process reporting a crash loop, if any.
    pub fn crash_looping_process(&self) -> Option<&ProcessStatus> {
        self.processes.iter().find(|p| p.is_crash_looping())
    }
}

/// The control-plane object for one workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedWorkload {
    pub name: String,
    pub spec: WorkloadSpec,
    pub status: WorkloadStatus,
    /// Optimistic-concurrency token; bumped by the store on every write.
    pub resource_version: u64,
}

impl ManagedWorkload {
    /// A workload that is both desired and observed in `state`.
    pub fn settled(name: impl Into<String>, state: DesiredState) -> Self {
        let stopped = state.is_stopped();
        Self {
            name: name.into(),
            spec: WorkloadSpec { stopped },
            status: WorkloadStatus {
                stopped,
                ready: !stopped,
                processes: Vec::new(),
            },
            resource_version: 1,
        }
    }

    pub fn desired_state(&self) -> DesiredState {
        DesiredState::from_stopped(self.spec.stopped)
    }
}

// ---------------------------------------------------------------------------
// RestartRequest
// ---------------------------------------------------------------------------

/// An ephemeral "restart this workload now" signal for the external controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartRequest {
    pub name: String,
    pub target: String,
    pub created_at: DateTime<Utc>,
    /// Set by the controller once the restart has been carried out.
    #[serde(default)]
    pub completed: bool,
}

impl RestartRequest {
    /// A request for `target` with a generated `<target>-<suffix>` name.
    pub fn for_workload(target: &str) -> Self {
        Self {
            name: generate_name(target),
            target: target.to_string(),
            created_at: Utc::now(),
            completed: false,
        }
    }
}

fn generate_name(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{prefix}-{suffix}")
}

// ---------------------------------------------------------------------------
// ConfigDocument
// ---------------------------------------------------------------------------

/// Per-workload key/value configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub workload: String,
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
    pub resource_version: u64,
}

impl ConfigDocument {
    pub fn new(workload: impl Into<String>) -> Self {
        Self {
            workload: workload.into(),
            entries: BTreeMap::new(),
            resource_version: 1,
        }
    }

    pub fn root_log_level(&self) -> Option<&str> {
        self.entries.get(ROOT_LOG_LEVEL_KEY).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// WatchEvent
// ---------------------------------------------------------------------------

/// One change notification from a name-filtered subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
}

impl<T> WatchEvent<T> {
    pub fn object(&self) -> &T {
        match self {
            WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o) => o,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, WatchEvent::Deleted(_))
    }
}
