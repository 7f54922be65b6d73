mod catalog;
mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, plan::Direction, simulate::SimulateArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "workloadctl",
    about = "Dependency-ordered lifecycle orchestration for managed workloads",
    version,
    propagate_version = true
)]
struct Cli {
    /// Workload catalog file
    #[arg(
        long,
        global = true,
        env = "WORKLOADCTL_CATALOG",
        default_value = "workloads.yaml"
    )]
    catalog: PathBuf,

    /// Orchestrator config file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log at debug level
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the dependency waves a bulk start or stop would walk
    Plan {
        #[arg(value_enum, default_value = "start")]
        direction: Direction,
    },

    /// Validate the catalog and the orchestrator config
    Check,

    /// Run an operation against an in-memory control plane seeded from the catalog
    Simulate(SimulateArgs),

    /// Manage the orchestrator config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Plan { direction } => cmd::plan::run(&cli.catalog, direction, cli.json),
        Commands::Check => cmd::check::run(&cli.catalog, config, cli.json),
        Commands::Simulate(args) => cmd::simulate::run(&cli.catalog, config, args, cli.json),
        Commands::Config { subcommand } => cmd::config::run(config, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
