//! Dependency ordering for workloads.
//!
//! A [`DependencyGraph`] is derived fresh from the catalog for every bulk
//! operation. Workloads are grouped into waves with Kahn's algorithm: wave 0
//! holds every workload without dependencies, wave `n` every workload whose
//! last dependency sits in wave `n - 1`. Within a wave, workloads keep their
//! catalog order so output is deterministic.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{OrchestratorError, Result};
use crate::types::WorkloadDescriptor;

#[derive(Debug, Clone, Serialize)]
pub struct DependencyGraph {
    /// Start waves, dependencies first.
    waves: Vec<Vec<String>>,
    /// Declared dependencies that name something outside the catalog.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    external: Vec<ExternalDependency>,
}

/// A dependency edge pointing outside the catalog; treated as satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalDependency {
    pub workload: String,
    pub dependency: String,
}

impl DependencyGraph {
    pub fn build(descriptors: &[WorkloadDescriptor]) -> Result<Self> {
        // Catalog position doubles as the tie-break key.
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(descriptors.len());
        for (i, d) in descriptors.iter().enumerate() {
            if d.name.trim().is_empty() {
                return Err(OrchestratorError::InvalidCatalog(format!(
                    "descriptor #{} has an empty name",
                    i + 1
                )));
            }
            if index.insert(d.name.as_str(), i).is_some() {
                return Err(OrchestratorError::InvalidCatalog(format!(
                    "workload '{}' is declared more than once",
                    d.name
                )));
            }
        }

        // Adjacency list: dependency → dependents
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); descriptors.len()];
        let mut in_degree: Vec<usize> = vec![0; descriptors.len()];
        let mut external = Vec::new();

        for (i, d) in descriptors.iter().enumerate() {
            let mut seen: HashSet<&str> = HashSet::new();
            for dep in &d.dependencies {
                if !seen.insert(dep.as_str()) {
                    continue;
                }
                match index.get(dep.as_str()) {
                    Some(&j) => {
                        dependents[j].push(i);
                        in_degree[i] += 1;
                    }
                    None => {
                        tracing::debug!(
                            workload = %d.name,
                            dependency = %dep,
                            "ignoring dependency outside the catalog"
                        );
                        external.push(ExternalDependency {
                            workload: d.name.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
        }

        // Peel off zero in-degree workloads one wave at a time
        let mut waves: Vec<Vec<usize>> = Vec::new();
        let mut remaining = descriptors.len();
        let mut current: Vec<usize> = (0..descriptors.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();

        while !current.is_empty() {
            remaining -= current.len();

            let mut next = Vec::new();
            for &i in &current {
                for &dependent in &dependents[i] {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }

            waves.push(current);
            next.sort_unstable();
            current = next;
        }

        if remaining > 0 {
            let members: Vec<String> = descriptors
                .iter()
                .enumerate()
                .filter(|(i, _)| in_degree[*i] > 0)
                .map(|(_, d)| d.name.clone())
                .collect();
            return Err(OrchestratorError::DependencyCycle { members });
        }

        let waves = waves
            .into_iter()
            .map(|wave| {
                wave.into_iter()
                    .map(|i| descriptors[i].name.clone())
                    .collect()
            })
            .collect();

        Ok(Self { waves, external })
    }

    /// Start waves; every workload appears after all of its dependencies.
    pub fn start_waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    /// Stop waves; every workload appears after all of its dependents.
    pub fn stop_waves(&self) -> Vec<Vec<String>> {
        self.waves
            .iter()
            .rev()
            .map(|wave| wave.iter().rev().cloned().collect())
            .collect()
    }

    pub fn start_order(&self) -> Vec<String> {
        self.waves.iter().flatten().cloned().collect()
    }

    /// Exact reverse of [`start_order`](Self::start_order).
    pub fn stop_order(&self) -> Vec<String> {
        let mut order = self.start_order();
        order.reverse();
        order
    }

    pub fn external_dependencies(&self) -> &[ExternalDependency] {
        &self.external
    }

    pub fn len(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
