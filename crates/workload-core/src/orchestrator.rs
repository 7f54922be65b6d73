use std::sync::Arc;
use std::time::Duration;

use crate::config::OrchestratorConfig;
use crate::error::{Op, OrchestratorError, Result};
use crate::memory::InMemoryControlPlane;
use crate::restart::RestartCoordinator;
use crate::store::ControlPlane;
use crate::transition::{validate_name, StateTransitioner};
use crate::types::{DesiredState, RestartRequest};
use crate::waiter::ConvergenceWaiter;

/// The single entry point for workload lifecycle operations.
///
/// Holds no state between calls beyond its collaborators and configuration;
/// every bulk operation re-reads the catalog. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) plane: ControlPlane,
    pub(crate) config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(plane: ControlPlane, config: OrchestratorConfig) -> Self {
        Self { plane, config }
    }

    /// An orchestrator over an [`InMemoryControlPlane`].
    pub fn in_memory(plane: &InMemoryControlPlane, config: OrchestratorConfig) -> Self {
        Self::new(ControlPlane::from_shared(Arc::new(plane.clone())), config)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// A copy of this orchestrator that waits at most `timeout`, kept to the
    /// millisecond. Zero is raised to one millisecond.
    pub fn with_wait_timeout(&self, timeout: Duration) -> Self {
        let mut copy = self.clone();
        copy.config.wait.override_timeout(timeout);
        copy
    }

    // ----- Single workload -----

    pub async fn start_workload(&self, name: &str) -> Result<()> {
        self.start_workload_with_wait(name, false).await
    }

    pub async fn start_workload_with_wait(&self, name: &str, wait: bool) -> Result<()> {
        self.change_state(Op::Start, name, DesiredState::Running, wait)
            .await
    }

    pub async fn stop_workload(&self, name: &str) -> Result<()> {
        self.stop_workload_with_wait(name, false).await
    }

    pub async fn stop_workload_with_wait(&self, name: &str, wait: bool) -> Result<()> {
        self.change_state(Op::Stop, name, DesiredState::Stopped, wait)
            .await
    }

    pub async fn restart_workload(&self, name: &str) -> Result<RestartRequest> {
        self.restart_workload_with_wait(name, false).await
    }

    pub async fn restart_workload_with_wait(
        &self,
        name: &str,
        wait: bool,
    ) -> Result<RestartRequest> {
        RestartCoordinator::new(
            self.plane.restarts.as_ref(),
            self.plane.workloads.as_ref(),
            &self.config.wait,
        )
        .restart(name, wait)
        .await
    }

    /// Set the desired state of `name`, then optionally wait for it to be
    /// observed. A workload already in `desired` is still waited on.
    pub(crate) async fn change_state(
        &self,
        op: Op,
        name: &str,
        desired: DesiredState,
        wait: bool,
    ) -> Result<()> {
        validate_name(name)?;

        StateTransitioner::new(self.plane.workloads.as_ref(), &self.config.retry)
            .set_desired_state(name, desired)
            .await
            .map_err(|e| OrchestratorError::transition(op, name, e))?;

        if wait {
            ConvergenceWaiter::new(self.plane.workloads.as_ref(), &self.config.wait)
                .wait_until_converged(name, desired)
                .await
                .map_err(|e| OrchestratorError::wait(op, name, e))?;
        }
        Ok(())
    }
}
