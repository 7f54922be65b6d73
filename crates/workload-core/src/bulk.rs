//! Operations over every workload in the catalog.
//!
//! Start-all and stop-all walk the dependency waves with a barrier between
//! waves and stop at the first failure. Setting the log level touches every
//! workload independently and reports all failures together.

use futures::{future, stream, TryStreamExt};

use crate::error::{AggregateError, Op, OrchestratorError, Result, WorkloadFailure};
use crate::graph::DependencyGraph;
use crate::orchestrator::Orchestrator;
use crate::retry::{retry_on_conflict, RetryError};
use crate::types::{DesiredState, WorkloadDescriptor, ROOT_LOG_LEVEL_KEY};

impl Orchestrator {
    /// Start every workload, dependencies first, each one converged before
    /// anything that depends on it is touched.
    pub async fn start_all_workloads(&self) -> Result<()> {
        self.change_all(Op::Start, DesiredState::Running).await
    }

    /// Stop every workload, dependents first.
    pub async fn stop_all_workloads(&self) -> Result<()> {
        self.change_all(Op::Stop, DesiredState::Stopped).await
    }

    /// Set `logging/root` to `level` in every workload's configuration.
    ///
    /// Every workload is attempted; failures are collected into one
    /// [`OrchestratorError::Aggregate`].
    pub async fn set_log_level_in_all_workloads(&self, level: &str) -> Result<()> {
        if level.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "log level must not be empty".to_string(),
            ));
        }
        let descriptors = self.fetch_catalog().await?;

        let results = future::join_all(
            descriptors
                .iter()
                .map(|d| async move { (d.name.as_str(), self.set_log_level(&d.name, level).await) }),
        )
        .await;

        let failures: Vec<WorkloadFailure> = results
            .into_iter()
            .filter_map(|(name, result)| {
                result.err().map(|error| {
                    tracing::warn!(workload = %name, %level, error = %error, "log level update failed");
                    WorkloadFailure {
                        workload: name.to_string(),
                        error,
                    }
                })
            })
            .collect();

        if failures.is_empty() {
            tracing::info!(%level, workloads = descriptors.len(), "log level set in all workloads");
            return Ok(());
        }
        Err(OrchestratorError::Aggregate(AggregateError {
            attempted: descriptors.len(),
            failures,
        }))
    }

    async fn fetch_catalog(&self) -> Result<Vec<WorkloadDescriptor>> {
        self.plane
            .catalog
            .current_of_all()
            .await
            .map_err(OrchestratorError::CatalogFetch)
    }

    async fn change_all(&self, op: Op, desired: DesiredState) -> Result<()> {
        let descriptors = self.fetch_catalog().await?;
        let graph = DependencyGraph::build(&descriptors).map_err(|e| OrchestratorError::bulk(op, e))?;
        let waves = match desired {
            DesiredState::Running => graph.start_waves().to_vec(),
            DesiredState::Stopped => graph.stop_waves(),
        };

        let limit = self.config.bulk.max_concurrency;
        for (wave, names) in waves.iter().enumerate() {
            tracing::debug!(%op, wave, workloads = ?names, "transitioning wave");
            stream::iter(names.iter().map(Ok::<_, OrchestratorError>))
                .try_for_each_concurrent(limit, |name| self.change_state(op, name, desired, true))
                .await
                .map_err(|e| OrchestratorError::bulk(op, e))?;
        }

        tracing::info!(%op, workloads = graph.len(), waves = waves.len(), "all workloads converged");
        Ok(())
    }

    async fn set_log_level(&self, name: &str, level: &str) -> Result<()> {
        let configs = self.plane.configs.as_ref();
        let result = retry_on_conflict(&self.config.retry, |_| async move {
            let mut document = configs.get(name).await?;
            if document.root_log_level() == Some(level) {
                return Ok(document);
            }
            document
                .entries
                .insert(ROOT_LOG_LEVEL_KEY.to_string(), level.to_string());
            configs.update(&document).await
        })
        .await;

        match result {
            Ok(_) => {
                tracing::debug!(workload = %name, %level, "log level set");
                Ok(())
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                Err(OrchestratorError::ConflictRetryExhausted {
                    name: name.to_string(),
                    attempts,
                    source: last,
                })
            }
            Err(RetryError::Failed(source)) => Err(OrchestratorError::Store {
                action: "update configuration of",
                name: name.to_string(),
                source,
            }),
        }
    }
}
