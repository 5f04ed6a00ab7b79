//! Configuration file handling.
//!
//! Settings live in an INI file, by default
//! `<config dir>/asvcam/config.ini`. Every key is optional; missing keys
//! fall back to the values of the reference deployment (two cameras on
//! separate subnets, 5 s cadence).
//!
//! ```ini
//! [capture]
//! interval = 5
//! event_log = events.csv
//!
//! [camera.cam1]
//! url = http://192.168.1.83:80
//! expected_images = 5
//! ```

mod settings;

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{EscapePolicy, Ini, ParseOption, Properties, WriteOption};
use thiserror::Error;

use crate::logging::LoggingConfig;
use crate::retrieval::RetrievalMode;
use crate::scheduler::TimestampFormat;
use crate::supervisor::RestartPolicy;

pub use settings::{
    CameraSettings, CaptureSettings, PositionSettings, RetrievalSettings, TelemetrySettings,
    DEFAULT_CAMERAS, DEFAULT_EVENT_LOG, DEFAULT_FALLBACK_URL, DEFAULT_POSITION_ADDRESS,
};

/// Directory name below the platform config dir.
pub const CONFIG_DIR_NAME: &str = "asvcam";

/// File name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Section prefix for per-camera sections, e.g. `[camera.cam1]`.
pub const CAMERA_SECTION_PREFIX: &str = "camera.";

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config syntax: {0}")]
    Syntax(#[from] ini::ParseError),

    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("could not determine the user config directory")]
    NoConfigDir,
}

/// Default location of the configuration file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub capture: CaptureSettings,
    pub position: PositionSettings,
    pub retrieval: RetrievalSettings,
    pub telemetry: TelemetrySettings,
    pub logging: LoggingConfig,
    pub supervisor: RestartPolicy,
    /// Cameras in file order.
    pub cameras: Vec<CameraSettings>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            capture: CaptureSettings::default(),
            position: PositionSettings::default(),
            retrieval: RetrievalSettings::default(),
            telemetry: TelemetrySettings::default(),
            logging: LoggingConfig::default(),
            supervisor: RestartPolicy::default(),
            cameras: CameraSettings::defaults(),
        }
    }
}

impl ConfigFile {
    /// Load from the default location, or defaults if no file exists there.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from an explicit path, which must exist.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse INI text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        // Filters are regular expressions; backslashes must survive as written.
        let ini = Ini::load_from_str_opt(
            content,
            ParseOption {
                enabled_escape: false,
                ..ParseOption::default()
            },
        )?;
        let defaults = Self::default();

        let capture = match ini.section(Some("capture")) {
            Some(props) => CaptureSettings::from_section(props)?,
            None => defaults.capture,
        };
        let position = match ini.section(Some("position")) {
            Some(props) => PositionSettings::from_section(props)?,
            None => defaults.position,
        };
        let retrieval = match ini.section(Some("retrieval")) {
            Some(props) => RetrievalSettings::from_section(props)?,
            None => defaults.retrieval,
        };
        let telemetry = match ini.section(Some("telemetry")) {
            Some(props) => TelemetrySettings::from_section(props)?,
            None => defaults.telemetry,
        };
        let logging = match ini.section(Some("logging")) {
            Some(props) => parse_logging(props)?,
            None => defaults.logging,
        };
        let supervisor = match ini.section(Some("supervisor")) {
            Some(props) => parse_supervisor(props)?,
            None => defaults.supervisor,
        };

        let mut cameras = Vec::new();
        for (name, props) in ini.iter() {
            let Some(camera) = name.and_then(|n| n.strip_prefix(CAMERA_SECTION_PREFIX)) else {
                continue;
            };
            cameras.push(CameraSettings::from_section(camera, props)?);
        }
        if cameras.is_empty() {
            cameras = defaults.cameras;
        }

        Ok(Self {
            capture,
            position,
            retrieval,
            telemetry,
            logging,
            supervisor,
            cameras,
        })
    }

    /// Cameras with `enabled = true`.
    pub fn enabled_cameras(&self) -> impl Iterator<Item = &CameraSettings> {
        self.cameras.iter().filter(|c| c.enabled)
    }

    pub fn camera(&self, name: &str) -> Option<&CameraSettings> {
        self.cameras.iter().find(|c| c.name == name)
    }

    /// Render as an INI document.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        self.capture.write_section(&mut ini);
        self.position.write_section(&mut ini);
        self.retrieval.write_section(&mut ini);
        self.telemetry.write_section(&mut ini);

        ini.with_section(Some("logging"))
            .set("level", self.logging.level.as_str())
            .set(
                "file",
                self.logging
                    .file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            )
            .set("ansi", self.logging.ansi.to_string());

        ini.with_section(Some("supervisor"))
            .set("max_attempts", self.supervisor.max_attempts.to_string())
            .set("base_delay", format_secs(self.supervisor.base_delay));

        for camera in &self.cameras {
            camera.write_section(&mut ini);
        }
        ini
    }

    /// INI text of this configuration.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let options = WriteOption {
            escape_policy: EscapePolicy::Nothing,
            ..WriteOption::default()
        };
        // Writing into memory cannot fail.
        let _ = self.to_ini().write_to_opt(&mut buf, options);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, self.render()).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn parse_logging(props: &Properties) -> Result<LoggingConfig, ConfigError> {
    let defaults = LoggingConfig::default();
    Ok(LoggingConfig {
        level: string_or(props, "level", &defaults.level),
        file: optional_string(props, "file").map(PathBuf::from),
        ansi: parse_or(props, "logging", "ansi", defaults.ansi, parse_bool)?,
    })
}

fn parse_supervisor(props: &Properties) -> Result<RestartPolicy, ConfigError> {
    let defaults = RestartPolicy::default();
    Ok(RestartPolicy {
        max_attempts: parse_or(
            props,
            "supervisor",
            "max_attempts",
            defaults.max_attempts,
            parse_from_str,
        )?,
        base_delay: parse_or(props, "supervisor", "base_delay", defaults.base_delay, parse_secs)?,
    })
}

// =============================================================================
// Value parsing
// =============================================================================

pub(crate) fn string_or(props: &Properties, key: &str, default: &str) -> String {
    optional_string(props, key).unwrap_or_else(|| default.to_string())
}

/// Trimmed value, with empty treated as absent.
pub(crate) fn optional_string(props: &Properties, key: &str) -> Option<String> {
    props
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub(crate) fn parse_or<T>(
    props: &Properties,
    section: &str,
    key: &str,
    default: T,
    parse: fn(&str) -> Result<T, String>,
) -> Result<T, ConfigError> {
    match optional_string(props, key) {
        None => Ok(default),
        Some(value) => parse(&value).map_err(|reason| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value,
            reason,
        }),
    }
}

pub(crate) fn parse_optional<T>(
    props: &Properties,
    section: &str,
    key: &str,
    parse: fn(&str) -> Result<T, String>,
) -> Result<Option<T>, ConfigError> {
    optional_string(props, key)
        .map(|value| {
            parse(&value).map_err(|reason| ConfigError::InvalidValue {
                section: section.to_string(),
                key: key.to_string(),
                value,
                reason,
            })
        })
        .transpose()
}

pub(crate) fn parse_from_str<T>(value: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| e.to_string())
}

pub(crate) fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err("expected true or false".to_string()),
    }
}

/// Seconds as a decimal number, e.g. `5` or `0.25`.
pub(crate) fn parse_secs(value: &str) -> Result<Duration, String> {
    let secs: f64 = value.parse().map_err(|_| "expected a number of seconds".to_string())?;
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

pub(crate) fn parse_millis(value: &str) -> Result<Duration, String> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| "expected a whole number of milliseconds".to_string())
}

pub(crate) fn parse_timestamp_format(value: &str) -> Result<TimestampFormat, String> {
    value.parse()
}

pub(crate) fn parse_mode(value: &str) -> Result<RetrievalMode, String> {
    value.parse()
}

pub(crate) fn format_secs(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}", duration.as_secs())
    } else {
        format!("{}", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = ConfigFile::parse("").unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.cameras.len(), 2);
        assert_eq!(config.cameras[0].url, "http://192.168.1.83:80");
        assert_eq!(config.cameras[1].url, "http://192.168.3.83:80");
        assert_eq!(config.capture.interval, Duration::from_secs(5));
        assert_eq!(config.retrieval.min_image_size, 16_000);
        assert_eq!(config.retrieval.fallback_url.as_deref(), Some("http://192.168.10.254"));
        assert_eq!(config.position.address, "localhost:12345");
        assert_eq!(config.supervisor.max_attempts, 25);
    }

    #[test]
    fn test_parse_sections() {
        let config = ConfigFile::parse(
            r#"
[capture]
interval = 2.5
overrun_tolerance_ms = 20
timestamp_format = unix
log_position = false

[position]
enabled = no
address = 10.0.0.2:4000

[retrieval]
output_dir = /data/images
fallback_url =
max_concurrent = 4
excluded_extensions = dat, LOG

[telemetry]
enabled = true
token = abc

[logging]
level = debug
file = /var/log/asvcam.log

[supervisor]
max_attempts = 3
base_delay = 0.5

[camera.red]
url = http://10.0.0.10/
expected_images = 6
filter = SET00(1|2)
mode = delete

[camera.blue]
url = http://10.0.0.11
enabled = false
"#,
        )
        .unwrap();

        assert_eq!(config.capture.interval, Duration::from_millis(2500));
        assert_eq!(config.capture.overrun_tolerance, Duration::from_millis(20));
        assert_eq!(config.capture.timestamp_format, TimestampFormat::Unix);
        assert!(!config.capture.columns.position);
        assert!(config.capture.columns.timestamp);

        assert!(!config.position.enabled);
        assert_eq!(config.position.address, "10.0.0.2:4000");

        assert_eq!(config.retrieval.output_dir, PathBuf::from("/data/images"));
        assert_eq!(config.retrieval.fallback_url, None);
        assert_eq!(config.retrieval.max_concurrent, Some(4));
        assert_eq!(config.retrieval.excluded_extensions, vec!["dat", "log"]);

        assert!(config.telemetry.enabled);
        assert_eq!(config.telemetry.bucket, "asv_data");
        assert!(config.telemetry.influx().is_some());

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, Some(PathBuf::from("/var/log/asvcam.log")));

        assert_eq!(config.supervisor, RestartPolicy::new(3, Duration::from_millis(500)));

        let names: Vec<_> = config.cameras.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["red", "blue"]);
        let red = config.camera("red").unwrap();
        assert_eq!(red.expected_images, 6);
        assert_eq!(red.mode, RetrievalMode::Delete);
        assert_eq!(red.filter.as_deref(), Some("SET00(1|2)"));
        assert_eq!(red.device().base_url(), "http://10.0.0.10");
        assert_eq!(config.enabled_cameras().count(), 1);
    }

    #[test]
    fn test_invalid_value_names_key() {
        let err = ConfigFile::parse("[capture]\ninterval = soon\n").unwrap_err();
        match err {
            ConfigError::InvalidValue { section, key, value, .. } => {
                assert_eq!(section, "capture");
                assert_eq!(key, "interval");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_negative_duration_rejected() {
        assert!(ConfigFile::parse("[supervisor]\nbase_delay = -1\n").is_err());
    }

    #[test]
    fn test_camera_without_url_rejected() {
        let err = ConfigFile::parse("[camera.cam3]\nexpected_images = 5\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "url"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = ConfigFile::default();
        config.capture.interval = Duration::from_millis(1500);
        config.retrieval.max_concurrent = Some(8);
        config.logging.file = Some(PathBuf::from("asvcam.log"));
        config.save(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigFile::load_from(dir.path().join("absent.ini")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(Duration::from_secs(5)), "5");
        assert_eq!(format_secs(Duration::from_millis(2500)), "2.5");
    }
}
