use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use workload_core::{OrchestratorConfig, WorkloadDescriptor};

/// On-disk catalog: `workloads: [{name, dependencies}]`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub workloads: Vec<WorkloadDescriptor>,
}

pub fn load_catalog(path: &Path) -> anyhow::Result<Vec<WorkloadDescriptor>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog {}", path.display()))?;
    let file: CatalogFile = serde_yaml::from_str(&data)
        .with_context(|| format!("failed to parse catalog {}", path.display()))?;
    Ok(file.workloads)
}

/// The config at `path`, or defaults when no path was given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<OrchestratorConfig> {
    match path {
        Some(p) => OrchestratorConfig::load(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(OrchestratorConfig::default()),
    }
}
