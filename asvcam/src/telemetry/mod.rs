//! Fire-and-forget capture telemetry.
//!
//! Each recorded capture is forwarded to a time-series store as one point
//! keyed by device, with the first image path as a field. Submission never
//! blocks the capture cycle and failures are only logged.
//!
//! # Architecture
//!
//! ```text
//! CaptureScheduler ──submit()──► TelemetrySink
//!                                  ├── NullSink   (disabled)
//!                                  └── InfluxSink ──spawn──► POST /api/v2/write
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::http::{HttpClient, HttpError};

/// Default measurement name for capture points.
pub const DEFAULT_MEASUREMENT: &str = "micasense_data";

/// Timeout for one telemetry write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// One capture as seen by the telemetry store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePoint {
    pub device: String,
    pub first_path: String,
}

impl CapturePoint {
    pub fn new(device: impl Into<String>, first_path: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            first_path: first_path.into(),
        }
    }
}

/// Destination for capture points.
pub trait TelemetrySink: Send + Sync {
    /// Hand a point to the sink; must return without waiting on I/O.
    fn submit(&self, point: CapturePoint);
}

/// Sink that drops every point.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn submit(&self, _point: CapturePoint) {}
}

/// Connection settings for an InfluxDB v2 server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfluxConfig {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
    pub measurement: String,
}

/// Writes capture points to InfluxDB using line protocol.
pub struct InfluxSink {
    config: Arc<InfluxConfig>,
    http: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl InfluxSink {
    pub fn new(config: InfluxConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            config: Arc::new(config),
            http,
            timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Write endpoint including org, bucket and second precision.
    ///
    /// Query values are form-encoded, so org and bucket names may contain
    /// spaces or reserved characters.
    pub fn write_url(&self) -> Result<String, HttpError> {
        let endpoint = format!("{}/api/v2/write", self.config.url.trim_end_matches('/'));
        let url = reqwest::Url::parse_with_params(
            &endpoint,
            [
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "s"),
            ],
        )
        .map_err(|e| HttpError::Request {
            url: endpoint.clone(),
            reason: e.to_string(),
        })?;
        Ok(url.into())
    }

    /// Render a point in line protocol (server assigns the timestamp).
    pub fn line(&self, point: &CapturePoint) -> String {
        format!(
            "{},camera={} capture=\"{}\"",
            escape_key(&self.config.measurement),
            escape_key(&point.device),
            escape_string_field(&point.first_path)
        )
    }

    /// Write a point and wait for the result.
    pub async fn write(&self, point: &CapturePoint) -> Result<(), HttpError> {
        let url = self.write_url()?;
        let headers = [
            ("Authorization", format!("Token {}", self.config.token)),
            ("Content-Type", "text/plain; charset=utf-8".to_string()),
        ];
        self.http
            .post(&url, &headers, self.line(point), self.timeout)
            .await
            .map(|_| ())
    }
}

impl TelemetrySink for InfluxSink {
    fn submit(&self, point: CapturePoint) {
        let sink = InfluxSink {
            config: Arc::clone(&self.config),
            http: Arc::clone(&self.http),
            timeout: self.timeout,
        };
        tokio::spawn(async move {
            match sink.write(&point).await {
                Ok(()) => debug!(device = %point.device, "Telemetry point written"),
                Err(e) => {
                    warn!(device = %point.device, error = %e, "Failed to write telemetry point")
                }
            }
        });
    }
}

/// Escape measurement names and tag values (commas, spaces, equals signs).
fn escape_key(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | ' ' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a string field value (double quotes and backslashes).
fn escape_string_field(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::{MockHttpClient, MockReply};

    fn config() -> InfluxConfig {
        InfluxConfig {
            url: "http://localhost:8086/".to_string(),
            org: "SailingLab".to_string(),
            bucket: "asv_data".to_string(),
            token: "secret".to_string(),
            measurement: DEFAULT_MEASUREMENT.to_string(),
        }
    }

    #[test]
    fn test_line_protocol() {
        let sink = InfluxSink::new(config(), Arc::new(MockHttpClient::new()));
        let line = sink.line(&CapturePoint::new("cam 1", "/files/SET0001/IMG \"a\".tif"));
        assert_eq!(
            line,
            "micasense_data,camera=cam\\ 1 capture=\"/files/SET0001/IMG \\\"a\\\".tif\""
        );
    }

    #[test]
    fn test_write_url() {
        let sink = InfluxSink::new(config(), Arc::new(MockHttpClient::new()));
        assert_eq!(
            sink.write_url().unwrap(),
            "http://localhost:8086/api/v2/write?org=SailingLab&bucket=asv_data&precision=s"
        );
    }

    #[test]
    fn test_write_url_encodes_query_values() {
        let mut config = config();
        config.org = "Sailing Lab&Co".to_string();
        config.bucket = "asv=data#1".to_string();
        let sink = InfluxSink::new(config, Arc::new(MockHttpClient::new()));
        assert_eq!(
            sink.write_url().unwrap(),
            "http://localhost:8086/api/v2/write\
             ?org=Sailing+Lab%26Co&bucket=asv%3Ddata%231&precision=s"
        );
    }

    #[test]
    fn test_write_url_rejects_invalid_base() {
        let mut config = config();
        config.url = "influx-server".to_string();
        let sink = InfluxSink::new(config, Arc::new(MockHttpClient::new()));
        assert!(matches!(sink.write_url(), Err(HttpError::Request { .. })));
    }

    #[tokio::test]
    async fn test_write_posts_to_server() {
        let url = "http://localhost:8086/api/v2/write?org=SailingLab&bucket=asv_data&precision=s";
        let mock = Arc::new(MockHttpClient::new().route(url, MockReply::ok("")));
        let sink = InfluxSink::new(config(), mock.clone());

        sink.write(&CapturePoint::new("cam1", "/a.tif")).await.unwrap();
        assert_eq!(mock.call_count(url), 1);
    }

    #[tokio::test]
    async fn test_submit_failure_does_not_propagate() {
        let mock = Arc::new(MockHttpClient::new());
        let sink = InfluxSink::new(config(), mock.clone());

        // No route: the spawned write fails and is only logged.
        sink.submit(CapturePoint::new("cam1", "/a.tif"));
        for _ in 0..10 {
            if !mock.calls().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(
            mock.calls(),
            vec!["http://localhost:8086/api/v2/write?org=SailingLab&bucket=asv_data&precision=s"]
        );
    }
}
