use crate::catalog::load_catalog;
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::ValueEnum;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use workload_core::graph::ExternalDependency;
use workload_core::DependencyGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Start,
    Stop,
}

#[derive(Serialize)]
struct PlanOutput {
    direction: Direction,
    waves: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    external: Vec<ExternalDependency>,
}

pub fn run(catalog: &Path, direction: Direction, json: bool) -> anyhow::Result<()> {
    let descriptors = load_catalog(catalog)?;
    let graph = DependencyGraph::build(&descriptors).context("cannot order workloads")?;
    let waves = match direction {
        Direction::Start => graph.start_waves().to_vec(),
        Direction::Stop => graph.stop_waves(),
    };

    if json {
        return print_json(&PlanOutput {
            direction,
            waves,
            external: graph.external_dependencies().to_vec(),
        });
    }

    if waves.is_empty() {
        println!("Catalog is empty; nothing to {}.", verb(direction));
        return Ok(());
    }

    let deps: HashMap<&str, &[String]> = descriptors
        .iter()
        .map(|d| (d.name.as_str(), d.dependencies.as_slice()))
        .collect();
    let rows: Vec<Vec<String>> = waves
        .iter()
        .enumerate()
        .flat_map(|(i, wave)| {
            let deps = &deps;
            wave.iter().map(move |name| {
                let declared = deps.get(name.as_str()).copied().unwrap_or_default();
                vec![
                    (i + 1).to_string(),
                    name.clone(),
                    if declared.is_empty() {
                        "-".to_string()
                    } else {
                        declared.join(", ")
                    },
                ]
            })
        })
        .collect();
    print_table(&["WAVE", "WORKLOAD", "DEPENDS ON"], &rows);

    for e in graph.external_dependencies() {
        println!(
            "note: {} depends on {}, which is not in the catalog",
            e.workload, e.dependency
        );
    }
    Ok(())
}

fn verb(direction: Direction) -> &'static str {
    match direction {
        Direction::Start => "start",
        Direction::Stop => "stop",
    }
}
