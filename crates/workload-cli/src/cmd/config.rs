use crate::catalog::load_config;
use crate::output::{print_json, print_warnings};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use workload_core::OrchestratorConfig;

const DEFAULT_CONFIG_PATH: &str = "workloadctl.yaml";

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Write a config file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective config
    Show,
}

pub fn run(path: Option<&Path>, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Init { force } => init(path, force),
        ConfigSubcommand::Show => show(path, json),
    }
}

fn init(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    OrchestratorConfig::default()
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn show(path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let warnings = config.validate();

    if json {
        return print_json(&serde_json::json!({
            "config": config,
            "warnings": warnings,
        }));
    }

    print!("{}", serde_yaml::to_string(&config)?);
    if !warnings.is_empty() {
        println!();
        print_warnings(&warnings);
    }
    Ok(())
}
