use std::fmt;
use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// A failure reported by one of the control-plane collaborators.
///
/// `Clone` because watch streams fan a single error out to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("conflict writing {kind} {name}: object was modified concurrently")]
    Conflict { kind: &'static str, name: String },

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("watch error: {0}")]
    Watch(String),

    #[error("control plane unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

// ---------------------------------------------------------------------------
// Op
// ---------------------------------------------------------------------------

/// The lifecycle operation an error occurred under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Start,
    Stop,
    Restart,
    SetLogLevel,
}

impl Op {
    pub fn gerund(self) -> &'static str {
        match self {
            Op::Start => "starting",
            Op::Stop => "stopping",
            Op::Restart => "restarting",
            Op::SetLogLevel => "setting log level",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Start => "start",
            Op::Stop => "stop",
            Op::Restart => "restart",
            Op::SetLogLevel => "set log level in",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// AggregateError
// ---------------------------------------------------------------------------

/// One failed workload inside an [`AggregateError`].
#[derive(Debug)]
pub struct WorkloadFailure {
    pub workload: String,
    pub error: OrchestratorError,
}

/// Every per-workload failure of a fail-soft bulk operation.
#[derive(Debug)]
pub struct AggregateError {
    pub attempted: usize,
    pub failures: Vec<WorkloadFailure>,
}

impl AggregateError {
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn workloads(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.workload.as_str())
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} workloads failed",
            self.failures.len(),
            self.attempted
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.workload, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

// ---------------------------------------------------------------------------
// OrchestratorError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid workload catalog: {0}")]
    InvalidCatalog(String),

    #[error("dependency cycle detected among workloads: {}", .members.join(", "))]
    DependencyCycle { members: Vec<String> },

    #[error("failed to fetch workload descriptors: {0}")]
    CatalogFetch(#[source] StoreError),

    #[error("gave up updating {name} after {attempts} conflicting writes: {source}")]
    ConflictRetryExhausted {
        name: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("failed to {action} {name}: {source}")]
    Store {
        action: &'static str,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to watch {name}: {source}")]
    SubscriptionSetup {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("watch on {name} failed: {message}")]
    Watch { name: String, message: String },

    #[error("{name} is crash-looping: process {process} ({reason})")]
    CrashLoop {
        name: String,
        process: String,
        reason: String,
    },

    #[error("timed out after {timeout:?} waiting for {name}")]
    TimedOut { name: String, timeout: Duration },

    #[error("failed to {op} {name}: {source}")]
    Transition {
        op: Op,
        name: String,
        #[source]
        source: Box<OrchestratorError>,
    },

    #[error("error waiting for {name} while {}: {source}", .op.gerund())]
    Wait {
        op: Op,
        name: String,
        #[source]
        source: Box<OrchestratorError>,
    },

    #[error("failed to {op} all workloads: {source}")]
    Bulk {
        op: Op,
        #[source]
        source: Box<OrchestratorError>,
    },

    #[error("failed to set log level in all workloads: {0}")]
    Aggregate(AggregateError),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl OrchestratorError {
    /// Strip operation context and return the condition that actually fired.
    pub fn root_cause(&self) -> &OrchestratorError {
        match self {
            OrchestratorError::Transition { source, .. }
            | OrchestratorError::Wait { source, .. }
            | OrchestratorError::Bulk { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// The collaborator error underneath, if the root cause came from a store.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self.root_cause() {
            OrchestratorError::CatalogFetch(e)
            | OrchestratorError::ConflictRetryExhausted { source: e, .. }
            | OrchestratorError::Store { source: e, .. }
            | OrchestratorError::SubscriptionSetup { source: e, .. } => Some(e),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_not_found)
    }

    pub(crate) fn transition(op: Op, name: &str, source: OrchestratorError) -> Self {
        OrchestratorError::Transition {
            op,
            name: name.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn wait(op: Op, name: &str, source: OrchestratorError) -> Self {
        OrchestratorError::Wait {
            op,
            name: name.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn bulk(op: Op, source: OrchestratorError) -> Self {
        OrchestratorError::Bulk {
            op,
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
