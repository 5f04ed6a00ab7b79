//! Logging initialization.
//!
//! Installs a `tracing` subscriber with a console layer and an optional
//! non-blocking file layer. `RUST_LOG` takes precedence over the configured
//! level when it is set and valid.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
pub use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default level when neither config nor `RUST_LOG` says otherwise.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Local timestamp prefix of every log line.
const TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{0}' (expected trace, debug, info, warn, error or off)")]
    Level(String),

    #[error("invalid log directive '{value}': {source}")]
    Directive {
        value: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("failed to create log directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install log subscriber: {0}")]
    Init(String),
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// A level name or a full `EnvFilter` directive string.
    pub level: String,
    /// Optional log file, appended to in addition to the console.
    pub file: Option<PathBuf>,
    /// Colored console output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

/// Build the filter from the configured level, letting `env` override it.
pub fn build_filter(level: &str, env: Option<&str>) -> Result<EnvFilter, LoggingError> {
    if let Some(directives) = env.filter(|d| !d.trim().is_empty()) {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return Ok(filter);
        }
    }

    let level = level.trim().to_lowercase();
    if level.contains('=') || level.contains(',') {
        return EnvFilter::try_new(&level).map_err(|source| LoggingError::Directive {
            value: level.clone(),
            source,
        });
    }

    let level = if level == "warning" { "warn".to_string() } else { level };
    let filter = LevelFilter::from_str(&level).map_err(|_| LoggingError::Level(level.clone()))?;
    EnvFilter::try_new(filter.to_string())
        .map_err(|source| LoggingError::Directive { value: level, source })
}

/// Install the global subscriber.
///
/// Returns the file writer guard when a log file is configured; it must be
/// held for the life of the process so buffered lines are flushed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(&config.level, env.as_deref())?;

    let console = fmt::layer()
        .with_timer(LocalTime::new(TIME_FORMAT))
        .with_ansi(config.ansi)
        .with_target(true);

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            std::fs::create_dir_all(&dir).map_err(|source| LoggingError::Directory {
                path: dir.clone(),
                source,
            })?;
            let name = path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("asvcam.log"));

            let appender = tracing_appender::rolling::never(&dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_timer(LocalTime::new(TIME_FORMAT))
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        for level in ["trace", "DEBUG", "info", "Warn", "warning", "error", "off"] {
            assert!(build_filter(level, None).is_ok(), "{level}");
        }
    }

    #[test]
    fn test_unknown_level() {
        assert!(matches!(build_filter("verbose", None), Err(LoggingError::Level(_))));
    }

    #[test]
    fn test_directive_string() {
        let filter = build_filter("info,asvcam::retrieval=debug", None).unwrap();
        assert!(filter.to_string().contains("asvcam::retrieval=debug"));
    }

    #[test]
    fn test_env_overrides_level() {
        let filter = build_filter("info", Some("asvcam=trace")).unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("asvcam=trace"));
        assert!(!rendered.contains("info"));
    }

    #[test]
    fn test_with_level_keeps_other_settings() {
        let config = LoggingConfig {
            file: Some(PathBuf::from("asvcam.log")),
            ansi: false,
            ..LoggingConfig::default()
        }
        .with_level("debug");
        assert_eq!(config.level, "debug");
        assert_eq!(config.file, Some(PathBuf::from("asvcam.log")));
        assert!(!config.ansi);
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let filter = build_filter("debug", Some("  ")).unwrap();
        assert!(filter.to_string().contains("debug"));
    }
}
