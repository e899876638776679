// Kubeforge CLI
// Plans and runs cluster bring-up from a YAML inventory

mod commands;
mod output;

use commands::plan::PlanArgs;
use commands::run::RunArgs;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

/// Bring up Kubernetes clusters across remote hosts
#[derive(Parser, Debug)]
#[command(name = "kubeforge", version, about)]
struct Cli {
    /// Log at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the execution graph and print its parallel levels
    Plan(PlanArgs),
    /// Execute the bring-up pipeline
    Run(RunArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Plan(args) => commands::plan::execute(args),
        Command::Run(args) => commands::run::execute(args).await,
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
