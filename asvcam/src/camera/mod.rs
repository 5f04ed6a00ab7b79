//! Camera capture client.
//!
//! [`CameraClient`] asks one device for a blocking capture and extracts the
//! stored file paths. A single call never retries: the scheduler's cadence is
//! the retry policy. Every failure is logged and surfaces as `None`.

mod types;

pub use types::{CaptureRejection, CaptureResponse, CaptureResult, StorageStatus, STATUS_COMPLETE};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::device::Device;
use crate::http::{HttpClient, HttpError};

/// Endpoint that triggers a capture and waits for it to finish.
pub const CAPTURE_ENDPOINT: &str = "capture?block=true";

/// Endpoint that reports storage and GPS status.
pub const STATUS_ENDPOINT: &str = "status";

/// Default per-request capture timeout.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(4);

/// Requests captures from one device over HTTP.
pub struct CameraClient {
    device: Device,
    http: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl CameraClient {
    /// Create a client for `device`.
    ///
    /// # Arguments
    ///
    /// * `device` - The camera to drive
    /// * `http` - Shared HTTP client
    /// * `timeout` - Bound on one capture round trip
    pub fn new(device: Device, http: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self {
            device,
            http,
            timeout,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn name(&self) -> &str {
        self.device.name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the camera to do a capture.
    ///
    /// Returns `None` on timeout, connection failure, non-success status,
    /// unparseable body, incomplete status, or an empty path set. A path
    /// count different from the expected one is only a warning; all returned
    /// paths are kept.
    pub async fn capture(&self) -> Option<CaptureResult> {
        let url = self.device.endpoint(CAPTURE_ENDPOINT);

        // The outer timeout bounds the attempt even if the client ignores its own.
        let request = self.http.get(&url, self.timeout);
        let body = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                self.log_transport_error(&url, &e);
                return None;
            }
            Err(_) => {
                self.log_transport_error(&url, &HttpError::Timeout { url: url.clone() });
                return None;
            }
        };

        let response: CaptureResponse = match serde_json::from_slice(&body) {
            Ok(response) => response,
            Err(e) => {
                error!(
                    device = %self.name(),
                    url = %url,
                    error = %e,
                    "Capture response is not valid JSON"
                );
                return None;
            }
        };

        let paths = match response.image_paths() {
            Ok(paths) => paths,
            Err(CaptureRejection::Incomplete(status)) => {
                error!(
                    device = %self.name(),
                    status = status.as_deref().unwrap_or("<missing>"),
                    "Camera failed to capture"
                );
                return None;
            }
            Err(CaptureRejection::NoPaths) => {
                error!(device = %self.name(), "Camera returned no image paths");
                return None;
            }
        };

        if response.raw_path_count() != paths.len() {
            warn!(
                device = %self.name(),
                dropped = response.raw_path_count() - paths.len(),
                "Ignoring non-string entries in raw_storage_path"
            );
        }

        if paths.len() != self.device.expected_images() {
            warn!(
                device = %self.name(),
                expected = self.device.expected_images(),
                returned = paths.len(),
                "Camera did not return the expected number of images"
            );
        }

        debug!(device = %self.name(), count = paths.len(), "Capture completed");
        Some(CaptureResult::new(self.name(), paths))
    }

    /// Query storage status; `None` when the camera is unreachable.
    pub async fn storage_status(&self) -> Option<StorageStatus> {
        let url = self.device.endpoint(STATUS_ENDPOINT);
        match self.http.get(&url, self.timeout).await {
            Ok(body) => match serde_json::from_slice(&body) {
                Ok(status) => Some(status),
                Err(e) => {
                    error!(device = %self.name(), error = %e, "Status response is not valid JSON");
                    None
                }
            },
            Err(e) => {
                self.log_transport_error(&url, &e);
                None
            }
        }
    }

    fn log_transport_error(&self, url: &str, e: &HttpError) {
        match e {
            HttpError::Timeout { .. } => warn!(
                device = %self.name(),
                url = %url,
                "Request was not completed in time, check that the camera is active and connected"
            ),
            HttpError::Connect { .. } => error!(
                device = %self.name(),
                url = %url,
                "Failed to connect, check that the camera is active and connected"
            ),
            other => error!(device = %self.name(), error = %other, "Request failed"),
        }
    }
}
