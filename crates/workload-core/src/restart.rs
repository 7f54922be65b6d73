use crate::config::WaitConfig;
use crate::error::{Op, OrchestratorError, Result};
use crate::store::{RestartRequestStore, WorkloadStore};
use crate::transition::validate_name;
use crate::types::RestartRequest;
use crate::waiter::ConvergenceWaiter;

/// Issues restart requests and, optionally, waits for them to be carried out.
pub struct RestartCoordinator<'a> {
    restarts: &'a dyn RestartRequestStore,
    workloads: &'a dyn WorkloadStore,
    wait: &'a WaitConfig,
}

impl<'a> RestartCoordinator<'a> {
    pub fn new(
        restarts: &'a dyn RestartRequestStore,
        workloads: &'a dyn WorkloadStore,
        wait: &'a WaitConfig,
    ) -> Self {
        Self {
            restarts,
            workloads,
            wait,
        }
    }

    pub async fn restart(&self, name: &str, wait: bool) -> Result<RestartRequest> {
        validate_name(name)?;

        let request = self
            .restarts
            .create(&RestartRequest::for_workload(name))
            .await
            .map_err(|source| {
                OrchestratorError::transition(
                    Op::Restart,
                    name,
                    OrchestratorError::Store {
                        action: "create restart request for",
                        name: name.to_string(),
                        source,
                    },
                )
            })?;
        tracing::info!(workload = %name, request = %request.name, "restart requested");

        if wait {
            ConvergenceWaiter::new(self.workloads, self.wait)
                .wait_for_restart(self.restarts, &request)
                .await
                .and_then(|outcome| outcome.into_result(name, self.wait.timeout()))
                .map_err(|e| OrchestratorError::wait(Op::Restart, name, e))?;
        }
        Ok(request)
    }
}
