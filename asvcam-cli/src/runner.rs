//! Shared setup for commands that talk to the cameras.

use std::path::PathBuf;
use std::sync::Arc;

use asvcam::config::{config_file_path, ConfigFile};
use asvcam::http::{HttpClient, ReqwestClient};
use asvcam::logging::{init_logging, WorkerGuard};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::CliError;

/// Loaded configuration plus the process-wide logging and runtime setup.
pub struct CliRunner {
    config: ConfigFile,
    config_path: Option<PathBuf>,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Load configuration and install logging.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Explicit config file; the default location otherwise
    /// * `log_level` - Overrides the configured level when given
    pub fn new(config_path: Option<PathBuf>, log_level: Option<&str>) -> Result<Self, CliError> {
        let config = match &config_path {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };

        let logging = match log_level {
            Some(level) => config.logging.clone().with_level(level),
            None => config.logging.clone(),
        };
        let guard = init_logging(&logging)?;

        Ok(Self {
            config,
            config_path,
            _log_guard: guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        let path = self
            .config_path
            .clone()
            .or_else(|| config_file_path().ok())
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        info!(version = asvcam::VERSION, command, config = %path, "asvcam starting");
    }

    pub fn runtime(&self) -> Result<tokio::runtime::Runtime, CliError> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)
    }

    /// Token cancelled on Ctrl+C.
    pub fn shutdown_token(&self) -> Result<CancellationToken, CliError> {
        let token = CancellationToken::new();
        let handler_token = token.clone();
        ctrlc::set_handler(move || {
            eprintln!();
            eprintln!("Received shutdown signal, stopping...");
            handler_token.cancel();
        })
        .map_err(|e| CliError::Signal(e.to_string()))?;
        Ok(token)
    }

    pub fn http_client(&self) -> Result<Arc<dyn HttpClient>, CliError> {
        Ok(Arc::new(ReqwestClient::new()?))
    }
}
