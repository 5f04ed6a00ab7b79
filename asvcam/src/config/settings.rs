//! Typed sections of the configuration file.

use std::path::PathBuf;
use std::time::Duration;

use ini::{Ini, Properties};

use super::{
    format_secs, optional_string, parse_bool, parse_from_str, parse_millis, parse_mode,
    parse_optional, parse_or, parse_secs, parse_timestamp_format, string_or, ConfigError,
    CAMERA_SECTION_PREFIX,
};
use crate::camera::DEFAULT_CAPTURE_TIMEOUT;
use crate::device::Device;
use crate::fetch::{FetchConfig, DEFAULT_FETCH_TIMEOUT, DEFAULT_MIN_IMAGE_SIZE};
use crate::position::DEFAULT_POSITION_TIMEOUT;
use crate::recorder::EventColumns;
use crate::retrieval::{RetrievalMode, WalkerConfig, DEFAULT_EXCLUDED_EXTENSIONS, DEFAULT_MAX_DEPTH};
use crate::scheduler::{
    SchedulerConfig, TimestampFormat, DEFAULT_CAPTURE_INTERVAL, DEFAULT_OVERRUN_TOLERANCE,
};
use crate::telemetry::{InfluxConfig, DEFAULT_MEASUREMENT};

/// Cameras used when the file declares none: `(name, url)`.
pub const DEFAULT_CAMERAS: &[(&str, &str)] = &[
    ("cam1", "http://192.168.1.83:80"),
    ("cam2", "http://192.168.3.83:80"),
];

/// Bands per capture on the reference cameras.
pub const DEFAULT_EXPECTED_IMAGES: usize = 5;

pub const DEFAULT_EVENT_LOG: &str = "events.csv";

/// Secondary address the cameras answer on when their subnet route is down.
pub const DEFAULT_FALLBACK_URL: &str = "http://192.168.10.254";

pub const DEFAULT_POSITION_ADDRESS: &str = "localhost:12345";

const DEFAULT_INFLUX_URL: &str = "http://localhost:8086";
const DEFAULT_INFLUX_ORG: &str = "SailingLab";
const DEFAULT_INFLUX_BUCKET: &str = "asv_data";

// =============================================================================
// [capture]
// =============================================================================

/// Capture cadence and event log layout.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub interval: Duration,
    pub overrun_tolerance: Duration,
    pub timestamp_format: TimestampFormat,
    pub event_log: PathBuf,
    pub columns: EventColumns,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CAPTURE_INTERVAL,
            overrun_tolerance: DEFAULT_OVERRUN_TOLERANCE,
            timestamp_format: TimestampFormat::default(),
            event_log: PathBuf::from(DEFAULT_EVENT_LOG),
            columns: EventColumns::default(),
        }
    }
}

impl CaptureSettings {
    pub(crate) fn from_section(props: &Properties) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            interval: parse_or(props, "capture", "interval", d.interval, parse_secs)?,
            overrun_tolerance: parse_or(
                props,
                "capture",
                "overrun_tolerance_ms",
                d.overrun_tolerance,
                parse_millis,
            )?,
            timestamp_format: parse_or(
                props,
                "capture",
                "timestamp_format",
                d.timestamp_format,
                parse_timestamp_format,
            )?,
            event_log: optional_string(props, "event_log")
                .map(PathBuf::from)
                .unwrap_or(d.event_log),
            columns: EventColumns {
                timestamp: parse_or(
                    props,
                    "capture",
                    "log_timestamp",
                    d.columns.timestamp,
                    parse_bool,
                )?,
                position: parse_or(
                    props,
                    "capture",
                    "log_position",
                    d.columns.position,
                    parse_bool,
                )?,
            },
        })
    }

    pub(crate) fn write_section(&self, ini: &mut Ini) {
        ini.with_section(Some("capture"))
            .set("interval", format_secs(self.interval))
            .set("overrun_tolerance_ms", self.overrun_tolerance.as_millis().to_string())
            .set("timestamp_format", self.timestamp_format.to_string())
            .set("event_log", self.event_log.display().to_string())
            .set("log_timestamp", self.columns.timestamp.to_string())
            .set("log_position", self.columns.position.to_string());
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.interval,
            overrun_tolerance: self.overrun_tolerance,
            timestamp_format: self.timestamp_format,
        }
    }
}

// =============================================================================
// [position]
// =============================================================================

/// Position service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSettings {
    /// When false, captures carry the sentinel position.
    pub enabled: bool,
    /// `host:port` of the position service.
    pub address: String,
    pub timeout: Duration,
}

impl Default for PositionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            address: DEFAULT_POSITION_ADDRESS.to_string(),
            timeout: DEFAULT_POSITION_TIMEOUT,
        }
    }
}

impl PositionSettings {
    pub(crate) fn from_section(props: &Properties) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            enabled: parse_or(props, "position", "enabled", d.enabled, parse_bool)?,
            address: string_or(props, "address", &d.address),
            timeout: parse_or(props, "position", "timeout", d.timeout, parse_secs)?,
        })
    }

    pub(crate) fn write_section(&self, ini: &mut Ini) {
        ini.with_section(Some("position"))
            .set("enabled", self.enabled.to_string())
            .set("address", self.address.as_str())
            .set("timeout", format_secs(self.timeout));
    }
}

// =============================================================================
// [retrieval]
// =============================================================================

/// Local mirror and transfer settings shared by every camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalSettings {
    pub output_dir: PathBuf,
    /// Empty in the file disables the fallback.
    pub fallback_url: Option<String>,
    pub min_image_size: u64,
    pub timeout: Duration,
    pub max_concurrent: Option<usize>,
    pub max_depth: usize,
    /// Lowercase extensions skipped during enumeration.
    pub excluded_extensions: Vec<String>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            fallback_url: Some(DEFAULT_FALLBACK_URL.to_string()),
            min_image_size: DEFAULT_MIN_IMAGE_SIZE,
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_concurrent: None,
            max_depth: DEFAULT_MAX_DEPTH,
            excluded_extensions: DEFAULT_EXCLUDED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl RetrievalSettings {
    pub(crate) fn from_section(props: &Properties) -> Result<Self, ConfigError> {
        let d = Self::default();
        let fallback_url = match props.get("fallback_url") {
            // Present but blank means "no fallback".
            Some(_) => optional_string(props, "fallback_url"),
            None => d.fallback_url,
        };
        let excluded_extensions = match props.get("excluded_extensions") {
            Some(list) => list
                .split(',')
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            None => d.excluded_extensions,
        };

        Ok(Self {
            output_dir: optional_string(props, "output_dir")
                .map(PathBuf::from)
                .unwrap_or(d.output_dir),
            fallback_url,
            min_image_size: parse_or(
                props,
                "retrieval",
                "min_image_size",
                d.min_image_size,
                parse_from_str,
            )?,
            timeout: parse_or(props, "retrieval", "timeout", d.timeout, parse_secs)?,
            max_concurrent: parse_optional(props, "retrieval", "max_concurrent", parse_from_str)?,
            max_depth: parse_or(props, "retrieval", "max_depth", d.max_depth, parse_from_str)?,
            excluded_extensions,
        })
    }

    pub(crate) fn write_section(&self, ini: &mut Ini) {
        ini.with_section(Some("retrieval"))
            .set("output_dir", self.output_dir.display().to_string())
            .set("fallback_url", self.fallback_url.clone().unwrap_or_default())
            .set("min_image_size", self.min_image_size.to_string())
            .set("timeout", format_secs(self.timeout))
            .set(
                "max_concurrent",
                self.max_concurrent.map(|n| n.to_string()).unwrap_or_default(),
            )
            .set("max_depth", self.max_depth.to_string())
            .set("excluded_extensions", self.excluded_extensions.join(", "));
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            output_dir: self.output_dir.clone(),
            fallback_url: self.fallback_url.clone(),
            min_image_size: self.min_image_size,
            timeout: self.timeout,
        }
    }

    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            excluded_extensions: self.excluded_extensions.clone(),
            max_depth: self.max_depth,
            max_concurrent: self.max_concurrent.map(|n| n.max(1)),
        }
    }
}

// =============================================================================
// [telemetry]
// =============================================================================

/// Time-series sink for capture points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
    pub measurement: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: DEFAULT_INFLUX_URL.to_string(),
            org: DEFAULT_INFLUX_ORG.to_string(),
            bucket: DEFAULT_INFLUX_BUCKET.to_string(),
            token: String::new(),
            measurement: DEFAULT_MEASUREMENT.to_string(),
        }
    }
}

impl TelemetrySettings {
    pub(crate) fn from_section(props: &Properties) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            enabled: parse_or(props, "telemetry", "enabled", d.enabled, parse_bool)?,
            url: string_or(props, "url", &d.url),
            org: string_or(props, "org", &d.org),
            bucket: string_or(props, "bucket", &d.bucket),
            token: string_or(props, "token", &d.token),
            measurement: string_or(props, "measurement", &d.measurement),
        })
    }

    pub(crate) fn write_section(&self, ini: &mut Ini) {
        ini.with_section(Some("telemetry"))
            .set("enabled", self.enabled.to_string())
            .set("url", self.url.as_str())
            .set("org", self.org.as_str())
            .set("bucket", self.bucket.as_str())
            .set("token", self.token.as_str())
            .set("measurement", self.measurement.as_str());
    }

    /// Sink settings, or `None` when telemetry is disabled.
    pub fn influx(&self) -> Option<InfluxConfig> {
        self.enabled.then(|| InfluxConfig {
            url: self.url.clone(),
            org: self.org.clone(),
            bucket: self.bucket.clone(),
            token: self.token.clone(),
            measurement: self.measurement.clone(),
        })
    }
}

// =============================================================================
// [camera.<name>]
// =============================================================================

/// One camera and its retrieval preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSettings {
    pub name: String,
    pub url: String,
    pub expected_images: usize,
    /// Capture request timeout.
    pub timeout: Duration,
    pub enabled: bool,
    /// Default retrieval filter for this camera.
    pub filter: Option<String>,
    /// Default retrieval mode for this camera.
    pub mode: RetrievalMode,
}

impl CameraSettings {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            expected_images: DEFAULT_EXPECTED_IMAGES,
            timeout: DEFAULT_CAPTURE_TIMEOUT,
            enabled: true,
            filter: None,
            mode: RetrievalMode::Download,
        }
    }

    pub fn defaults() -> Vec<Self> {
        DEFAULT_CAMERAS
            .iter()
            .map(|(name, url)| Self::new(*name, *url))
            .collect()
    }

    pub(crate) fn from_section(name: &str, props: &Properties) -> Result<Self, ConfigError> {
        let section = format!("{}{}", CAMERA_SECTION_PREFIX, name);
        let url = optional_string(props, "url").ok_or_else(|| ConfigError::InvalidValue {
            section: section.clone(),
            key: "url".to_string(),
            value: String::new(),
            reason: "every camera needs a url".to_string(),
        })?;
        let d = Self::new(name, url);

        Ok(Self {
            expected_images: parse_or(
                props,
                &section,
                "expected_images",
                d.expected_images,
                parse_from_str,
            )?,
            timeout: parse_or(props, &section, "timeout", d.timeout, parse_secs)?,
            enabled: parse_or(props, &section, "enabled", d.enabled, parse_bool)?,
            filter: optional_string(props, "filter"),
            mode: parse_or(props, &section, "mode", d.mode, parse_mode)?,
            ..d
        })
    }

    pub(crate) fn write_section(&self, ini: &mut Ini) {
        ini.with_section(Some(format!("{}{}", CAMERA_SECTION_PREFIX, self.name)))
            .set("url", self.url.as_str())
            .set("expected_images", self.expected_images.to_string())
            .set("timeout", format_secs(self.timeout))
            .set("enabled", self.enabled.to_string())
            .set("filter", self.filter.clone().unwrap_or_default())
            .set("mode", self.mode.to_string());
    }

    pub fn device(&self) -> Device {
        Device::new(&self.name, &self.url, self.expected_images)
    }
}
