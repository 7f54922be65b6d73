use crate::catalog::{load_catalog, load_config};
use crate::output::{print_json, print_warnings};
use std::path::Path;
use workload_core::config::{ConfigWarning, WarnLevel};
use workload_core::DependencyGraph;

pub fn run(catalog: &Path, config: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let descriptors = load_catalog(catalog)?;
    let config = load_config(config)?;

    let mut warnings = Vec::new();
    match DependencyGraph::build(&descriptors) {
        Ok(graph) => {
            for e in graph.external_dependencies() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "{} depends on '{}', which is not in the catalog; it will be treated as satisfied",
                        e.workload, e.dependency
                    ),
                });
            }
        }
        Err(e) => warnings.push(ConfigWarning {
            level: WarnLevel::Error,
            message: e.to_string(),
        }),
    }
    warnings.extend(config.validate());

    if json {
        print_json(&serde_json::json!({
            "workloads": descriptors.len(),
            "warnings": warnings,
        }))?;
    } else if warnings.is_empty() {
        println!("{} workloads, no problems found.", descriptors.len());
    } else {
        print_warnings(&warnings);
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("check found errors");
    }
    Ok(())
}
