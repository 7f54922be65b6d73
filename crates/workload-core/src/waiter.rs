//! Convergence waiting.
//!
//! ```text
//!            ┌──────────── event matches desired ─────────► Converged
//!            │
//! Waiting ───┼──── crash-loop seen (event or poll) ───────► CrashLooped
//!            │
//!            ├──── stream error / stream end / deleted ───► WatchError
//!            │
//!            └──── deadline ──────────────────────────────► TimedOut
//! ```
//!
//! Convergence is driven by the name-filtered watch stream. A periodic poll
//! of the workload runs alongside it only to catch crash loops that the
//! control plane does not announce with an event. Both the subscription and
//! the timers live on the stack of the wait call and are dropped on every
//! exit path.

use std::time::Duration;

use futures::StreamExt;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::WaitConfig;
use crate::error::{OrchestratorError, Result, StoreError};
use crate::store::{RestartRequestStore, WatchStream, WorkloadStore};
use crate::types::{DesiredState, ManagedWorkload, RestartRequest, WatchEvent};

// ---------------------------------------------------------------------------
// WaitOutcome
// ---------------------------------------------------------------------------

/// Terminal state of one wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Converged,
    CrashLooped { process: String, reason: String },
    WatchError(String),
    TimedOut,
}

impl WaitOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, WaitOutcome::Converged)
    }

    /// Turn every non-converged outcome into the matching error for `name`.
    pub fn into_result(self, name: &str, timeout: Duration) -> Result<()> {
        match self {
            WaitOutcome::Converged => Ok(()),
            WaitOutcome::CrashLooped { process, reason } => Err(OrchestratorError::CrashLoop {
                name: name.to_string(),
                process,
                reason,
            }),
            WaitOutcome::WatchError(message) => Err(OrchestratorError::Watch {
                name: name.to_string(),
                message,
            }),
            WaitOutcome::TimedOut => Err(OrchestratorError::TimedOut {
                name: name.to_string(),
                timeout,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ConvergenceWaiter
// ---------------------------------------------------------------------------

pub struct ConvergenceWaiter<'a> {
    workloads: &'a dyn WorkloadStore,
    config: &'a WaitConfig,
}

impl<'a> ConvergenceWaiter<'a> {
    pub fn new(workloads: &'a dyn WorkloadStore, config: &'a WaitConfig) -> Self {
        Self { workloads, config }
    }

    /// Wait for `name` to be observed in `desired`.
    ///
    /// Only subscription setup is reported as `Err`; every other way the wait
    /// can end is a [`WaitOutcome`].
    pub async fn wait_for(&self, name: &str, desired: DesiredState) -> Result<WaitOutcome> {
        let deadline = Instant::now() + self.config.timeout();
        let started = Instant::now();
        let outcome = self.wait_for_workload(name, desired, deadline).await?;
        log_outcome(name, &outcome, started);
        Ok(outcome)
    }

    /// [`wait_for`](Self::wait_for), with the outcome folded into the error.
    pub async fn wait_until_converged(&self, name: &str, desired: DesiredState) -> Result<()> {
        self.wait_for(name, desired)
            .await?
            .into_result(name, self.config.timeout())
    }

    /// Wait for a restart to be carried out and the workload to settle.
    ///
    /// First waits for the controller to complete (or remove) `request`, then
    /// for the target workload to be running again. Both phases share one
    /// deadline.
    pub async fn wait_for_restart(
        &self,
        restarts: &dyn RestartRequestStore,
        request: &RestartRequest,
    ) -> Result<WaitOutcome> {
        let deadline = Instant::now() + self.config.timeout();
        let started = Instant::now();
        let target = request.target.as_str();

        match restarts.subscribe(&request.name).await {
            Ok(events) => {
                let outcome = self
                    .watch_until(target, events, deadline, true, restart_completed)
                    .await;
                if !outcome.is_converged() {
                    log_outcome(target, &outcome, started);
                    return Ok(outcome);
                }
            }
            // Already handled and cleaned up before we could look.
            Err(StoreError::NotFound { .. }) => {
                tracing::debug!(request = %request.name, "restart request already gone");
            }
            Err(source) => {
                return Err(OrchestratorError::SubscriptionSetup {
                    name: request.name.clone(),
                    source,
                })
            }
        }

        let outcome = self
            .wait_for_workload(target, DesiredState::Running, deadline)
            .await?;
        log_outcome(target, &outcome, started);
        Ok(outcome)
    }

    async fn wait_for_workload(
        &self,
        name: &str,
        desired: DesiredState,
        deadline: Instant,
    ) -> Result<WaitOutcome> {
        let events = self.workloads.subscribe(name).await.map_err(|source| {
            OrchestratorError::SubscriptionSetup {
                name: name.to_string(),
                source,
            }
        })?;

        // Crash loops only abort a wait for Running; a crash-looping workload
        // must stay stoppable.
        let check_crash_loops = desired == DesiredState::Running;
        let outcome = self
            .watch_until(name, events, deadline, check_crash_loops, |event| {
                workload_reached(event, desired)
            })
            .await;
        Ok(outcome)
    }

    /// The state machine. `evaluate` maps each data event to a terminal
    /// outcome, or `None` to keep waiting.
    async fn watch_until<T, F>(
        &self,
        workload: &str,
        mut events: WatchStream<T>,
        deadline: Instant,
        check_crash_loops: bool,
        mut evaluate: F,
    ) -> WaitOutcome
    where
        F: FnMut(WatchEvent<T>) -> Option<WaitOutcome>,
    {
        let interval = self.config.crash_check_interval();
        let mut crash_check = tokio::time::interval_at(Instant::now() + interval, interval);
        crash_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let expired = tokio::time::sleep_until(deadline);
        tokio::pin!(expired);

        loop {
            tokio::select! {
                biased;

                event = events.next() => match event {
                    Some(Ok(event)) => {
                        if let Some(outcome) = evaluate(event) {
                            return outcome;
                        }
                    }
                    Some(Err(e)) => return WaitOutcome::WatchError(e.to_string()),
                    None => return WaitOutcome::WatchError("watch stream ended".to_string()),
                },

                _ = crash_check.tick(), if check_crash_loops => {
                    match tokio::time::timeout_at(deadline, self.poll_crash_loop(workload)).await {
                        Ok(Some(outcome)) => return outcome,
                        Ok(None) => {}
                        Err(_) => return WaitOutcome::TimedOut,
                    }
                }

                _ = &mut expired => return WaitOutcome::TimedOut,
            }
        }
    }

    async fn poll_crash_loop(&self, name: &str) -> Option<WaitOutcome> {
        match self.workloads.get(name).await {
            Ok(workload) => crash_looped(&workload),
            Err(e) => {
                // The watch stream reports anything persistent.
                tracing::debug!(workload = %name, error = %e, "crash-loop poll failed");
                None
            }
        }
    }
}

fn crash_looped(workload: &ManagedWorkload) -> Option<WaitOutcome> {
    workload
        .status
        .crash_looping_process()
        .map(|p| WaitOutcome::CrashLooped {
            process: p.name.clone(),
            reason: p.waiting_reason.clone().unwrap_or_default(),
        })
}

fn workload_reached(event: WatchEvent<ManagedWorkload>, desired: DesiredState) -> Option<WaitOutcome> {
    match event {
        WatchEvent::Deleted(w) => Some(WaitOutcome::WatchError(format!(
            "workload {} was deleted",
            w.name
        ))),
        WatchEvent::Added(w) | WatchEvent::Modified(w) => {
            if desired == DesiredState::Running {
                if let Some(outcome) = crash_looped(&w) {
                    return Some(outcome);
                }
            }
            w.status.satisfies(desired).then_some(WaitOutcome::Converged)
        }
    }
}

fn restart_completed(event: WatchEvent<RestartRequest>) -> Option<WaitOutcome> {
    match event {
        WatchEvent::Deleted(_) => Some(WaitOutcome::Converged),
        WatchEvent::Added(r) | WatchEvent::Modified(r) => r.completed.then_some(WaitOutcome::Converged),
    }
}

fn log_outcome(name: &str, outcome: &WaitOutcome, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        WaitOutcome::Converged => {
            tracing::info!(workload = %name, elapsed_ms, "workload converged")
        }
        other => tracing::warn!(workload = %name, elapsed_ms, outcome = ?other, "wait ended without convergence"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
