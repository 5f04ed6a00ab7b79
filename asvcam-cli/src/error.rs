//! CLI error type.

use asvcam::config::ConfigError;
use asvcam::http::HttpError;
use asvcam::logging::LoggingError;
use asvcam::replay::ReplayError;
use asvcam::retrieval::RetrievalError;
use thiserror::Error;

/// Errors surfaced to the user; every variant exits non-zero.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to set signal handler: {0}")]
    Signal(String),

    #[error("{0}")]
    Failed(String),
}
