mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tributary",
    version,
    about = "Runs loads and jobs of a Tributary ETL project"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a load or a job
    Run {
        /// Path to project YAML file
        project: PathBuf,
        /// Component to execute, e.g. `jobs.nightly` or `loads.orders`
        target: String,
        /// External variable overriding project and job variables
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = commands::parse_variable)]
        variables: Vec<(String, String)>,
        /// Print the execution result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate project configuration and component types
    Check {
        /// Path to project YAML file
        project: PathBuf,
    },
    /// Show the components a component depends on
    Deps {
        /// Path to project YAML file
        project: PathBuf,
        /// Component to inspect, e.g. `transforms.doubled`
        target: String,
        /// List the components that depend on the target instead
        #[arg(long)]
        dependents: bool,
        /// Follow dependencies transitively
        #[arg(long)]
        all: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            project,
            target,
            variables,
            json,
        } => commands::run::execute(&project, &target, variables.into_iter().collect(), json),
        Commands::Check { project } => commands::check::execute(&project),
        Commands::Deps {
            project,
            target,
            dependents,
            all,
        } => commands::deps::execute(&project, &target, dependents, all),
    }
}
