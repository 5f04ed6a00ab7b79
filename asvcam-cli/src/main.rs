//! asvcam CLI - Command-line interface
//!
//! Runs the capture loop, retrieves images from camera storage, and manages
//! the configuration file.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use commands::capture::CaptureArgs;
use commands::config::ConfigCommands;
use commands::replay::ReplayArgs;
use commands::retrieve::RetrieveArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "asvcam")]
#[command(
    version,
    about = "Synchronized multi-camera capture for autonomous surface vehicles",
    long_about = None
)]
struct Cli {
    /// Configuration file (default: <config dir>/asvcam/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directives (overrides config; RUST_LOG wins over both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Trigger synchronized captures on a fixed cadence
    Capture(CaptureArgs),

    /// Download (or delete) every file stored on the cameras
    Retrieve(RetrieveArgs),

    /// Download the files recorded in an event log
    Replay(ReplayArgs),

    /// Show camera storage and the current position
    Status,

    /// Write a configuration file with the default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    let runner = || CliRunner::new(cli.config.clone(), cli.log_level.as_deref());

    match cli.command {
        Commands::Capture(args) => commands::capture::run(&runner()?, args),
        Commands::Retrieve(args) => commands::retrieve::run(&runner()?, args),
        Commands::Replay(args) => commands::replay::run(&runner()?, args),
        Commands::Status => commands::status::run(&runner()?),
        Commands::Init { force } => commands::init::run(cli.config.clone(), force),
        Commands::Config { command } => commands::config::run(command, cli.config.clone()),
    }
}
