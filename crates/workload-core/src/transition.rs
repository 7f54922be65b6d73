use crate::config::RetryConfig;
use crate::error::{OrchestratorError, Result};
use crate::retry::{retry_on_conflict, RetryError};
use crate::store::WorkloadStore;
use crate::types::{DesiredState, ManagedWorkload};

/// Applies a desired-state change to one workload.
///
/// Never waits for the change to take effect; that is the waiter's job.
pub struct StateTransitioner<'a> {
    store: &'a dyn WorkloadStore,
    retry: &'a RetryConfig,
}

impl<'a> StateTransitioner<'a> {
    pub fn new(store: &'a dyn WorkloadStore, retry: &'a RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Set `spec.stopped` on `name` to match `desired`.
    ///
    /// Returns `Ok(false)` without writing when the workload already has the
    /// requested desired state, `Ok(true)` after a successful write.
    pub async fn set_desired_state(&self, name: &str, desired: DesiredState) -> Result<bool> {
        validate_name(name)?;

        let current = self.store.get(name).await.map_err(|e| OrchestratorError::Store {
            action: "get",
            name: name.to_string(),
            source: e,
        })?;
        if current.desired_state() == desired {
            tracing::debug!(workload = %name, %desired, "desired state already set");
            return Ok(false);
        }

        self.update_spec_with_retry(name, current, |w| w.spec.stopped = desired.is_stopped())
            .await?;
        tracing::info!(workload = %name, %desired, "desired state updated");
        Ok(true)
    }

    /// Fetch-transform-write with conflict retry. `first` is used for the
    /// first attempt so the caller's read is not repeated.
    async fn update_spec_with_retry<F>(
        &self,
        name: &str,
        first: ManagedWorkload,
        transform: F,
    ) -> Result<ManagedWorkload>
    where
        F: Fn(&mut ManagedWorkload),
    {
        let store = self.store;
        let transform = &transform;
        let mut first = Some(first);

        let result = retry_on_conflict(self.retry, |_| {
            let prefetched = first.take();
            async move {
                let mut workload = match prefetched {
                    Some(w) => w,
                    None => store.get(name).await?,
                };
                transform(&mut workload);
                store.update_spec(&workload).await
            }
        })
        .await;

        result.map_err(|e| match e {
            RetryError::Exhausted { attempts, last } => {
                tracing::warn!(workload = %name, attempts, "conflict retries exhausted");
                OrchestratorError::ConflictRetryExhausted {
                    name: name.to_string(),
                    attempts,
                    source: last,
                }
            }
            RetryError::Failed(source) => OrchestratorError::Store {
                action: "update",
                name: name.to_string(),
                source,
            },
        })
    }
}

/// Reject empty workload names before any I/O.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(OrchestratorError::Validation(
            "workload name must not be empty".to_string(),
        ));
    }
    Ok(())
}
