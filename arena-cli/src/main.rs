//! Arena CLI - Command-line interface
//!
//! Commands:
//! - generate: Build a tournament from a craft folder
//! - run: Generate a tournament and run every heat
//! - resume: Continue a saved tournament
//! - status: Show how far a saved tournament has got
//! - stop: Ask a running tournament to stop
//! - continuous: Keep the arena full until lives run out
//!
//! Without a simulator attached, heats and sessions run against a simulated
//! arena (see `sim`).

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod continuous;
mod generate;
mod run;
mod settings;
mod sim;
mod status;

use continuous::ContinuousArgs;
use generate::GenerateArgs;
use run::{ResumeArgs, RunArgs};
use settings::Settings;
use status::StatusArgs;

#[derive(Parser)]
#[command(name = "arena")]
#[command(about = "Tournament heat scheduler for vessel competitions")]
struct Cli {
    /// Tournament state file
    #[arg(long, global = true, value_name = "FILE", default_value = "tournament.state")]
    state: PathBuf,

    /// JSON settings file (generation, runner and continuous sections)
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a tournament and save it
    Generate(GenerateArgs),
    /// Generate a tournament and run it
    Run(RunArgs),
    /// Resume the saved tournament
    Resume(ResumeArgs),
    /// Show tournament progress
    Status(StatusArgs),
    /// Stop a running tournament after its current step
    Stop,
    /// Run a continuous spawning session
    Continuous(ContinuousArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.settings.as_deref())?;

    match cli.command {
        Commands::Generate(args) => generate::run(args, &cli.state, &settings),
        Commands::Run(args) => run::run(args, &cli.state, &settings).await,
        Commands::Resume(args) => run::resume(args, &cli.state, &settings).await,
        Commands::Status(args) => status::run(args, &cli.state),
        Commands::Stop => status::stop(&cli.state),
        Commands::Continuous(args) => continuous::run(args, &settings).await,
    }
}
