//! Configuration CLI commands.
//!
//! Provides `config path` and `config show`.

use std::path::PathBuf;

use asvcam::config::{config_file_path, ConfigFile};
use clap::Subcommand;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration, defaults included
    Show,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<PathBuf>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(config_path),
        ConfigCommands::Show => run_show(config_path),
    }
}

fn run_path(config_path: Option<PathBuf>) -> Result<(), CliError> {
    let path = match config_path {
        Some(path) => path,
        None => config_file_path()?,
    };
    println!("{}", path.display());
    Ok(())
}

fn run_show(config_path: Option<PathBuf>) -> Result<(), CliError> {
    let config = match config_path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    print!("{}", config.render());
    Ok(())
}
