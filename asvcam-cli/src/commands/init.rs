//! Init command - write a configuration file with the default settings.

use std::path::{Path, PathBuf};

use asvcam::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the init command.
///
/// An existing file is kept unless `force` is set.
pub fn run(config_path: Option<PathBuf>, force: bool) -> Result<(), CliError> {
    let path = match config_path {
        Some(path) => path,
        None => config_file_path()?,
    };

    if write_default(&path, force)? {
        println!("Configuration file: {}", path.display());
        println!();
        println!("Edit this file to describe your cameras and position service.");
        println!("CLI arguments override config file values when specified.");
    } else {
        println!("Configuration file already exists: {}", path.display());
        println!("Use --force to overwrite it with the defaults.");
    }
    Ok(())
}

/// Write the default configuration; returns false when an existing file was kept.
fn write_default(path: &Path, force: bool) -> Result<bool, CliError> {
    if path.exists() && !force {
        return Ok(false);
    }
    ConfigFile::default().save(path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_loadable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asvcam").join("config.ini");

        assert!(write_default(&path, false).unwrap());
        assert_eq!(ConfigFile::load_from(&path).unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_keeps_existing_file_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[capture]\ninterval = 2\n").unwrap();

        assert!(!write_default(&path, false).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[capture]\ninterval = 2\n");

        assert!(write_default(&path, true).unwrap());
        assert_eq!(ConfigFile::load_from(&path).unwrap(), ConfigFile::default());
    }
}
