//! An in-memory control plane.
//!
//! Implements every collaborator trait and plays the part of the external
//! controller: desired-state writes and restart requests are acted on by
//! background tasks according to each workload's [`Behavior`]. Faults can be
//! injected per workload, and every call is appended to a journal so tests
//! can assert on ordering.
//!
//! Requires a Tokio runtime; controller reactions are spawned tasks.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{future, stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::StoreError;
use crate::store::{ConfigStore, DescriptorCatalog, RestartRequestStore, WatchStream, WorkloadStore};
use crate::types::{
    ConfigDocument, DesiredState, ManagedWorkload, ProcessStatus, RestartRequest, WatchEvent,
    WorkloadDescriptor, WorkloadStatus, CRASH_LOOP_REASON,
};

const WORKLOAD: &str = "workload";
const RESTART_REQUEST: &str = "restart request";
const CONFIG: &str = "config";

// ---------------------------------------------------------------------------
// Behavior / Call
// ---------------------------------------------------------------------------

/// How the simulated controller reacts to a workload's desired-state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Status follows the desired flag after `delay`.
    Converge { delay: Duration },
    /// Nothing ever happens.
    Hang,
    /// Stopping converges; starting leaves `process` in `CrashLoopBackOff`.
    CrashLoop { process: String },
}

impl Default for Behavior {
    fn default() -> Self {
        Behavior::Converge {
            delay: Duration::from_millis(50),
        }
    }
}

/// One entry in the call journal. Writes are journaled by outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListCatalog,
    GetWorkload(String),
    UpdateWorkload { name: String, stopped: bool },
    SubscribeWorkload(String),
    CreateRestart { target: String },
    SubscribeRestart(String),
    GetConfig(String),
    UpdateConfig(String),
    /// A workload or config write refused with a conflict or injected fault.
    WriteRejected {
        kind: &'static str,
        name: String,
        reason: String,
    },
    /// The simulated controller applied a settled status.
    StatusApplied { name: String, state: DesiredState },
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

type Event<T> = Result<WatchEvent<T>, StoreError>;

/// Room for undelivered events per watched name.
const WATCH_BUFFER: usize = 64;

/// One broadcast channel per watched name, created on first subscribe.
struct Watchers<T> {
    channels: HashMap<String, broadcast::Sender<Event<T>>>,
}

impl<T: Clone> Default for Watchers<T> {
    fn default() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }
}

impl<T: Clone> Watchers<T> {
    fn subscribe(&mut self, name: &str) -> broadcast::Receiver<Event<T>> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(WATCH_BUFFER).0)
            .subscribe()
    }

    /// Deliver to subscribers of `name` only; forget the channel once nobody
    /// listens any more.
    fn publish(&mut self, name: &str, event: WatchEvent<T>) {
        let Some(tx) = self.channels.get(name) else {
            return;
        };
        if tx.send(Ok(event)).is_err() {
            self.channels.remove(name);
        }
    }
}

#[derive(Default)]
struct Faults {
    catalog: Option<StoreError>,
    conflicts: HashMap<String, u32>,
    workload_subscribe: HashMap<String, StoreError>,
    workload_watch: HashMap<String, String>,
    restart_create: Option<StoreError>,
    restart_watch: Option<String>,
    config_get: HashMap<String, StoreError>,
    config_update: HashMap<String, StoreError>,
}

#[derive(Default)]
struct State {
    catalog: Vec<WorkloadDescriptor>,
    workloads: BTreeMap<String, ManagedWorkload>,
    restarts: BTreeMap<String, RestartRequest>,
    configs: BTreeMap<String, ConfigDocument>,
    behaviors: HashMap<String, Behavior>,
    default_behavior: Behavior,
    faults: Faults,
    calls: Vec<Call>,
    workload_watchers: Watchers<ManagedWorkload>,
    restart_watchers: Watchers<RestartRequest>,
}

impl State {
    fn behavior(&self, name: &str) -> Behavior {
        self.behaviors
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_behavior.clone())
    }

    /// Journal the outcome of a write: the write itself when it landed, a
    /// rejection otherwise.
    fn record<T>(
        &mut self,
        kind: &'static str,
        name: &str,
        outcome: &Result<T, StoreError>,
        applied: Call,
    ) {
        let call = match outcome {
            Ok(_) => applied,
            Err(e) => Call::WriteRejected {
                kind,
                name: name.to_string(),
                reason: e.to_string(),
            },
        };
        self.calls.push(call);
    }

    fn apply_spec(&mut self, workload: &ManagedWorkload) -> Result<ManagedWorkload, StoreError> {
        let name = workload.name.as_str();
        if let Some(remaining) = self.faults.conflicts.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Conflict {
                    kind: WORKLOAD,
                    name: name.to_string(),
                });
            }
        }
        let current = self
            .workloads
            .get_mut(name)
            .ok_or_else(|| not_found(WORKLOAD, name))?;
        if current.resource_version != workload.resource_version {
            return Err(StoreError::Conflict {
                kind: WORKLOAD,
                name: name.to_string(),
            });
        }
        current.spec = workload.spec.clone();
        current.resource_version += 1;
        let updated = current.clone();
        self.workload_watchers
            .publish(name, WatchEvent::Modified(updated.clone()));
        Ok(updated)
    }

    fn apply_config(&mut self, document: &ConfigDocument) -> Result<ConfigDocument, StoreError> {
        let name = document.workload.as_str();
        if let Some(e) = self.faults.config_update.get(name) {
            return Err(e.clone());
        }
        let current = self
            .configs
            .get_mut(name)
            .ok_or_else(|| not_found(CONFIG, name))?;
        if current.resource_version != document.resource_version {
            return Err(StoreError::Conflict {
                kind: CONFIG,
                name: name.to_string(),
            });
        }
        current.entries = document.entries.clone();
        current.resource_version += 1;
        Ok(current.clone())
    }
}

struct Inner {
    state: Mutex<State>,
    subscriptions: Arc<AtomicUsize>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate a workload's status, bump its version and optionally announce it.
    fn update_status<F>(&self, name: &str, publish: bool, f: F)
    where
        F: FnOnce(&mut WorkloadStatus),
    {
        let mut state = self.state();
        let Some(w) = state.workloads.get_mut(name) else {
            return;
        };
        f(&mut w.status);
        w.resource_version += 1;
        let snapshot = w.clone();
        if publish {
            state
                .workload_watchers
                .publish(name, WatchEvent::Modified(snapshot));
        }
    }

    /// Apply the settled status for `desired`, unless the spec moved on.
    fn settle(&self, name: &str, desired: DesiredState) {
        let mut state = self.state();
        let Some(w) = state.workloads.get_mut(name) else {
            return;
        };
        if w.desired_state() != desired {
            return;
        }
        let ready = !desired.is_stopped();
        w.status.stopped = desired.is_stopped();
        w.status.ready = ready;
        for p in &mut w.status.processes {
            p.ready = ready;
            p.waiting_reason = None;
        }
        w.resource_version += 1;
        let snapshot = w.clone();

        // Journal before publishing so observers never see the status first.
        state.calls.push(Call::StatusApplied {
            name: name.to_string(),
            state: desired,
        });
        state
            .workload_watchers
            .publish(name, WatchEvent::Modified(snapshot));
    }

    /// Mark a restart request completed, announce it, then delete it.
    fn complete_restart(&self, name: &str) {
        let mut state = self.state();
        let Some(mut request) = state.restarts.remove(name) else {
            return;
        };
        request.completed = true;
        state
            .restart_watchers
            .publish(name, WatchEvent::Modified(request.clone()));
        state
            .restart_watchers
            .publish(name, WatchEvent::Deleted(request));
    }
}

/// Decrements the live-subscription count when the stream is dropped.
struct SubscriptionGuard(Arc<AtomicUsize>);

impl SubscriptionGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn watch_stream<T>(
    snapshot: T,
    injected: Option<String>,
    rx: broadcast::Receiver<Event<T>>,
    guard: SubscriptionGuard,
) -> WatchStream<T>
where
    T: Clone + Send + 'static,
{
    let updates = BroadcastStream::new(rx).map(move |item| {
        let _held = &guard;
        match item {
            Ok(event) => event,
            Err(BroadcastStreamRecvError::Lagged(n)) => Err(StoreError::Watch(format!(
                "subscriber lagged behind by {n} events"
            ))),
        }
    });

    let injected = injected.map(|msg| Err(StoreError::Watch(msg)));
    stream::once(future::ready(Ok(WatchEvent::Added(snapshot))))
        .chain(stream::iter(injected))
        .chain(updates)
        .boxed()
}

// ---------------------------------------------------------------------------
// InMemoryControlPlane
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct InMemoryControlPlane {
    inner: Arc<Inner>,
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                subscriptions: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Load a catalog and create a settled workload plus an empty config
    /// document for every descriptor.
    pub fn seed(&self, descriptors: Vec<WorkloadDescriptor>, initial: DesiredState) {
        let mut state = self.inner.state();
        for d in &descriptors {
            state
                .workloads
                .insert(d.name.clone(), ManagedWorkload::settled(&d.name, initial));
            state
                .configs
                .insert(d.name.clone(), ConfigDocument::new(&d.name));
        }
        state.catalog = descriptors;
    }

    pub fn set_catalog(&self, descriptors: Vec<WorkloadDescriptor>) {
        self.inner.state().catalog = descriptors;
    }

    pub fn insert_workload(&self, workload: ManagedWorkload) {
        self.inner
            .state()
            .workloads
            .insert(workload.name.clone(), workload);
    }

    pub fn remove_workload(&self, name: &str) {
        let mut state = self.inner.state();
        if let Some(w) = state.workloads.remove(name) {
            state.workload_watchers.publish(name, WatchEvent::Deleted(w));
        }
    }

    pub fn insert_config(&self, document: ConfigDocument) {
        self.inner
            .state()
            .configs
            .insert(document.workload.clone(), document);
    }

    pub fn set_default_behavior(&self, behavior: Behavior) {
        self.inner.state().default_behavior = behavior;
    }

    pub fn set_behavior(&self, name: &str, behavior: Behavior) {
        self.inner
            .state()
            .behaviors
            .insert(name.to_string(), behavior);
    }

    /// Overwrite a workload's status and announce it.
    pub fn set_status(&self, name: &str, status: WorkloadStatus) {
        self.inner.update_status(name, true, |s| *s = status);
    }

    /// Put `process` of `name` into `CrashLoopBackOff`. With `silent`, the
    /// change is visible to `get` but produces no watch event.
    pub fn set_crash_loop(&self, name: &str, process: &str, silent: bool) {
        self.inner.update_status(name, !silent, |s| {
            s.ready = false;
            mark_crash_loop(s, process);
        });
    }

    // -- fault injection ----------------------------------------------------

    pub fn fail_catalog(&self, error: StoreError) {
        self.inner.state().faults.catalog = Some(error);
    }

    /// Make the next `count` spec writes to `name` conflict.
    pub fn inject_conflicts(&self, name: &str, count: u32) {
        self.inner
            .state()
            .faults
            .conflicts
            .insert(name.to_string(), count);
    }

    pub fn fail_workload_subscribe(&self, name: &str, error: StoreError) {
        self.inner
            .state()
            .faults
            .workload_subscribe
            .insert(name.to_string(), error);
    }

    /// Subscriptions to `name` report `message` right after the snapshot.
    pub fn fail_workload_watch(&self, name: &str, message: &str) {
        self.inner
            .state()
            .faults
            .workload_watch
            .insert(name.to_string(), message.to_string());
    }

    pub fn fail_restart_create(&self, error: StoreError) {
        self.inner.state().faults.restart_create = Some(error);
    }

    /// Restart-request subscriptions report `message` right after the snapshot.
    pub fn fail_restart_watch(&self, message: &str) {
        self.inner.state().faults.restart_watch = Some(message.to_string());
    }

    pub fn fail_config_get(&self, name: &str, error: StoreError) {
        self.inner
            .state()
            .faults
            .config_get
            .insert(name.to_string(), error);
    }

    pub fn fail_config_update(&self, name: &str, error: StoreError) {
        self.inner
            .state()
            .faults
            .config_update
            .insert(name.to_string(), error);
    }

    // -- inspection ---------------------------------------------------------

    pub fn workload(&self, name: &str) -> Option<ManagedWorkload> {
        self.inner.state().workloads.get(name).cloned()
    }

    pub fn config(&self, name: &str) -> Option<ConfigDocument> {
        self.inner.state().configs.get(name).cloned()
    }

    pub fn restart_requests(&self) -> Vec<RestartRequest> {
        self.inner.state().restarts.values().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.state().calls.clear();
    }

    /// Watch streams that have been handed out and not yet dropped.
    pub fn active_subscriptions(&self) -> usize {
        self.inner.subscriptions.load(Ordering::SeqCst)
    }

    // -- simulated controller -----------------------------------------------

    fn react_to_spec(&self, name: &str, desired: DesiredState, behavior: Behavior) {
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        match behavior {
            Behavior::Hang => {}
            Behavior::Converge { delay } => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.settle(&name, desired);
                });
            }
            Behavior::CrashLoop { process } => {
                tokio::spawn(async move {
                    if desired.is_stopped() {
                        inner.settle(&name, desired);
                    } else {
                        inner.update_status(&name, true, |s| {
                            s.stopped = false;
                            s.ready = false;
                            mark_crash_loop(s, &process);
                        });
                    }
                });
            }
        }
    }

    fn react_to_restart(&self, request: RestartRequest, behavior: Behavior) {
        let inner = Arc::clone(&self.inner);
        match behavior {
            Behavior::Hang => {}
            Behavior::Converge { delay } => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.update_status(&request.target, true, |s| s.ready = false);
                    tokio::time::sleep(delay).await;
                    inner.update_status(&request.target, true, |s| {
                        s.stopped = false;
                        s.ready = true;
                    });

                    inner.complete_restart(&request.name);
                });
            }
            Behavior::CrashLoop { process } => {
                tokio::spawn(async move {
                    inner.update_status(&request.target, true, |s| {
                        s.ready = false;
                        mark_crash_loop(s, &process);
                    });
                });
            }
        }
    }
}

fn mark_crash_loop(status: &mut WorkloadStatus, process: &str) {
    match status.processes.iter_mut().find(|p| p.name == process) {
        Some(p) => {
            p.ready = false;
            p.restart_count += 1;
            p.waiting_reason = Some(CRASH_LOOP_REASON.to_string());
        }
        None => status.processes.push(ProcessStatus {
            name: process.to_string(),
            ready: false,
            restart_count: 1,
            waiting_reason: Some(CRASH_LOOP_REASON.to_string()),
        }),
    }
}

fn not_found(kind: &'static str, name: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        name: name.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Collaborator impls
// ---------------------------------------------------------------------------

#[async_trait]
impl WorkloadStore for InMemoryControlPlane {
    async fn get(&self, name: &str) -> Result<ManagedWorkload, StoreError> {
        let mut state = self.inner.state();
        state.calls.push(Call::GetWorkload(name.to_string()));
        state
            .workloads
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(WORKLOAD, name))
    }

    async fn update_spec(&self, workload: &ManagedWorkload) -> Result<ManagedWorkload, StoreError> {
        let name = workload.name.as_str();
        let (updated, behavior) = {
            let mut state = self.inner.state();
            let outcome = state.apply_spec(workload);
            let applied = Call::UpdateWorkload {
                name: name.to_string(),
                stopped: workload.spec.stopped,
            };
            state.record(WORKLOAD, name, &outcome, applied);
            (outcome?, state.behavior(name))
        };

        self.react_to_spec(name, updated.desired_state(), behavior);
        Ok(updated)
    }

    async fn subscribe(&self, name: &str) -> Result<WatchStream<ManagedWorkload>, StoreError> {
        let mut state = self.inner.state();
        state.calls.push(Call::SubscribeWorkload(name.to_string()));
        if let Some(e) = state.faults.workload_subscribe.get(name) {
            return Err(e.clone());
        }
        let snapshot = state
            .workloads
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(WORKLOAD, name))?;
        // Subscribe while holding the lock so nothing slips between the
        // snapshot and the first update.
        let rx = state.workload_watchers.subscribe(name);
        let injected = state.faults.workload_watch.get(name).cloned();
        let guard = SubscriptionGuard::new(Arc::clone(&self.inner.subscriptions));
        Ok(watch_stream(snapshot, injected, rx, guard))
    }
}

#[async_trait]
impl RestartRequestStore for InMemoryControlPlane {
    async fn create(&self, request: &RestartRequest) -> Result<RestartRequest, StoreError> {
        let behavior = {
            let mut state = self.inner.state();
            state.calls.push(Call::CreateRestart {
                target: request.target.clone(),
            });
            if let Some(e) = &state.faults.restart_create {
                return Err(e.clone());
            }
            if state.restarts.contains_key(&request.name) {
                return Err(StoreError::AlreadyExists(request.name.clone()));
            }
            state
                .restarts
                .insert(request.name.clone(), request.clone());
            state
                .restart_watchers
                .publish(&request.name, WatchEvent::Added(request.clone()));
            state.behavior(&request.target)
        };

        self.react_to_restart(request.clone(), behavior);
        Ok(request.clone())
    }

    async fn subscribe(&self, name: &str) -> Result<WatchStream<RestartRequest>, StoreError> {
        let mut state = self.inner.state();
        state.calls.push(Call::SubscribeRestart(name.to_string()));
        let snapshot = state
            .restarts
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(RESTART_REQUEST, name))?;
        let injected = state.faults.restart_watch.clone();
        let rx = state.restart_watchers.subscribe(name);
        let guard = SubscriptionGuard::new(Arc::clone(&self.inner.subscriptions));
        Ok(watch_stream(snapshot, injected, rx, guard))
    }
}

#[async_trait]
impl DescriptorCatalog for InMemoryControlPlane {
    async fn current_of_all(&self) -> Result<Vec<WorkloadDescriptor>, StoreError> {
        let mut state = self.inner.state();
        state.calls.push(Call::ListCatalog);
        if let Some(e) = &state.faults.catalog {
            return Err(e.clone());
        }
        Ok(state.catalog.clone())
    }
}

#[async_trait]
impl ConfigStore for InMemoryControlPlane {
    async fn get(&self, workload: &str) -> Result<ConfigDocument, StoreError> {
        let mut state = self.inner.state();
        state.calls.push(Call::GetConfig(workload.to_string()));
        if let Some(e) = state.faults.config_get.get(workload) {
            return Err(e.clone());
        }
        state
            .configs
            .get(workload)
            .cloned()
            .ok_or_else(|| not_found(CONFIG, workload))
    }

    async fn update(&self, document: &ConfigDocument) -> Result<ConfigDocument, StoreError> {
        let name = document.workload.as_str();
        let mut state = self.inner.state();
        let outcome = state.apply_config(document);
        state.record(CONFIG, name, &outcome, Call::UpdateConfig(name.to_string()));
        outcome
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stale_write_conflicts() {
        let cp = InMemoryControlPlane::new();
        cp.insert_workload(ManagedWorkload::settled("a", DesiredState::Running));

        let mut first = WorkloadStore::get(&cp, "a").await.unwrap();
        let mut second = first.clone();
        first.spec.stopped = true;
        WorkloadStore::update_spec(&cp, &first).await.unwrap();

        second.spec.stopped = true;
        let err = WorkloadStore::update_spec(&cp, &second).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test(start_paused = true)]
    async fn controller_settles_after_delay() {
        let cp = InMemoryControlPlane::new();
        cp.insert_workload(ManagedWorkload::settled("a", DesiredState::Stopped));
        cp.set_behavior(
            "a",
            Behavior::Converge {
                delay: Duration::from_secs(1),
            },
        );

        let mut w = WorkloadStore::get(&cp, "a").await.unwrap();
        w.spec.stopped = false;
        WorkloadStore::update_spec(&cp, &w).await.unwrap();
        assert!(cp.workload("a").unwrap().status.stopped);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let status = cp.workload("a").unwrap().status;
        assert!(!status.stopped);
        assert!(status.ready);
        assert!(cp.calls().contains(&Call::StatusApplied {
            name: "a".into(),
            state: DesiredState::Running,
        }));
    }

    #[tokio::test]
    async fn subscription_starts_with_snapshot_and_filters_by_name() {
        let cp = InMemoryControlPlane::new();
        cp.insert_workload(ManagedWorkload::settled("a", DesiredState::Running));
        cp.insert_workload(ManagedWorkload::settled("b", DesiredState::Running));

        let mut events = WorkloadStore::subscribe(&cp, "a").await.unwrap();
        assert_eq!(cp.active_subscriptions(), 1);

        let first = events.next().await.unwrap().unwrap();
        assert!(matches!(first, WatchEvent::Added(ref w) if w.name == "a"));

        cp.set_crash_loop("b", "x", false);
        cp.set_crash_loop("a", "y", false);
        let next = events.next().await.unwrap().unwrap();
        assert_eq!(next.object().name, "a");

        drop(events);
        assert_eq!(cp.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn busy_sibling_does_not_lag_a_subscriber() {
        let cp = InMemoryControlPlane::new();
        cp.insert_workload(ManagedWorkload::settled("a", DesiredState::Running));
        cp.insert_workload(ManagedWorkload::settled("b", DesiredState::Running));

        let mut a_events = WorkloadStore::subscribe(&cp, "a").await.unwrap();
        let _b_events = WorkloadStore::subscribe(&cp, "b").await.unwrap();
        a_events.next().await.unwrap().unwrap();

        for _ in 0..(WATCH_BUFFER * 4) {
            cp.set_crash_loop("b", "x", false);
        }
        cp.set_crash_loop("a", "y", false);

        let next = a_events.next().await.unwrap().unwrap();
        assert_eq!(next.object().name, "a");
    }

    #[tokio::test]
    async fn rejected_writes_are_journaled_as_rejections() {
        let cp = InMemoryControlPlane::new();
        cp.insert_workload(ManagedWorkload::settled("a", DesiredState::Running));
        cp.insert_config(ConfigDocument::new("a"));
        cp.inject_conflicts("a", 1);
        cp.fail_config_update("a", StoreError::Unavailable("down".into()));

        let mut w = WorkloadStore::get(&cp, "a").await.unwrap();
        w.spec.stopped = true;
        assert!(WorkloadStore::update_spec(&cp, &w).await.is_err());
        let doc = ConfigStore::get(&cp, "a").await.unwrap();
        assert!(ConfigStore::update(&cp, &doc).await.is_err());

        let calls = cp.calls();
        assert!(!calls
            .iter()
            .any(|c| matches!(c, Call::UpdateWorkload { .. } | Call::UpdateConfig(_))));
        let rejected: Vec<&str> = calls
            .iter()
            .filter_map(|c| match c {
                Call::WriteRejected { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(rejected, vec![WORKLOAD, CONFIG]);

        WorkloadStore::update_spec(&cp, &w).await.unwrap();
        assert!(cp.calls().contains(&Call::UpdateWorkload {
            name: "a".into(),
            stopped: true,
        }));
    }

    #[tokio::test]
    async fn injected_watch_error_follows_snapshot() {
        let cp = InMemoryControlPlane::new();
        cp.insert_workload(ManagedWorkload::settled("a", DesiredState::Running));
        cp.fail_workload_watch("a", "boom");

        let mut events = WorkloadStore::subscribe(&cp, "a").await.unwrap();
        assert!(events.next().await.unwrap().is_ok());
        let err = events.next().await.unwrap().unwrap_err();
        assert_eq!(err, StoreError::Watch("boom".into()));
    }

    #[tokio::test]
    async fn config_update_is_versioned() {
        let cp = InMemoryControlPlane::new();
        cp.insert_config(ConfigDocument::new("a"));

        let mut doc = ConfigStore::get(&cp, "a").await.unwrap();
        doc.entries.insert("k".into(), "v".into());
        let stale = doc.clone();
        ConfigStore::update(&cp, &doc).await.unwrap();
        assert!(ConfigStore::update(&cp, &stale)
            .await
            .unwrap_err()
            .is_conflict());
        assert_eq!(cp.config("a").unwrap().entries["k"], "v");
    }

    #[tokio::test]
    async fn seed_creates_workloads_and_configs() {
        let cp = InMemoryControlPlane::new();
        cp.seed(
            vec![WorkloadDescriptor::new("a"), WorkloadDescriptor::new("b")],
            DesiredState::Stopped,
        );
        assert!(cp.workload("b").unwrap().status.stopped);
        assert!(cp.config("a").is_some());
        assert_eq!(cp.current_of_all().await.unwrap().len(), 2);
    }
}
