//! Collaborator interfaces onto the control plane.
//!
//! The orchestrator only ever talks to the outside world through these four
//! traits. Each method maps to one request against the control plane; none of
//! them retry or wait on their own.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StoreError;
use crate::types::{ConfigDocument, ManagedWorkload, RestartRequest, WatchEvent, WorkloadDescriptor};

/// A name-filtered change stream. Dropping it releases the subscription.
///
/// Implementations must yield the object's current state as the first
/// `Added` event so that a waiter never misses an already-converged object.
pub type WatchStream<T> = BoxStream<'static, Result<WatchEvent<T>, StoreError>>;

#[async_trait]
pub trait WorkloadStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<ManagedWorkload, StoreError>;

    /// Write `workload.spec` if `workload.resource_version` is still current.
    ///
    /// Returns [`StoreError::Conflict`] when another writer got there first.
    async fn update_spec(&self, workload: &ManagedWorkload) -> Result<ManagedWorkload, StoreError>;

    async fn subscribe(&self, name: &str) -> Result<WatchStream<ManagedWorkload>, StoreError>;
}

#[async_trait]
pub trait RestartRequestStore: Send + Sync {
    async fn create(&self, request: &RestartRequest) -> Result<RestartRequest, StoreError>;

    async fn subscribe(&self, name: &str) -> Result<WatchStream<RestartRequest>, StoreError>;
}

#[async_trait]
pub trait DescriptorCatalog: Send + Sync {
    async fn current_of_all(&self) -> Result<Vec<WorkloadDescriptor>, StoreError>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, workload: &str) -> Result<ConfigDocument, StoreError>;

    /// Write `document` if its `resource_version` is still current.
    async fn update(&self, document: &ConfigDocument) -> Result<ConfigDocument, StoreError>;
}

/// The capability set the orchestrator is built from.
#[derive(Clone)]
pub struct ControlPlane {
    pub workloads: Arc<dyn WorkloadStore>,
    pub restarts: Arc<dyn RestartRequestStore>,
    pub catalog: Arc<dyn DescriptorCatalog>,
    pub configs: Arc<dyn ConfigStore>,
}

impl ControlPlane {
    /// Use one value for every capability.
    pub fn from_shared<T>(backend: Arc<T>) -> Self
    where
        T: WorkloadStore + RestartRequestStore + DescriptorCatalog + ConfigStore + 'static,
    {
        Self {
            workloads: backend.clone(),
            restarts: backend.clone(),
            catalog: backend.clone(),
            configs: backend,
        }
    }
}
