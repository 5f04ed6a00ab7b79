//! Camera response payloads and capture results.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::position::Position;

/// Status value reported by a successful blocking capture.
pub const STATUS_COMPLETE: &str = "complete";

/// Body of `GET /capture?block=true`.
///
/// Every field is optional at the wire level; [`CaptureResponse::image_paths`]
/// is the validation step that turns a malformed payload into "no capture".
#[derive(Debug, Default, Deserialize)]
pub struct CaptureResponse {
    #[serde(default)]
    pub status: Option<String>,

    /// Band identifier to stored file path, in device order.
    #[serde(default)]
    pub raw_storage_path: Option<Map<String, Value>>,
}

/// Why a capture response was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureRejection {
    /// `status` missing or not `"complete"`.
    Incomplete(Option<String>),
    /// No usable path in `raw_storage_path`.
    NoPaths,
}

impl CaptureResponse {
    /// Validate the payload and extract the stored file paths.
    ///
    /// Paths keep the order the device listed them in. Non-string entries
    /// are dropped; the caller decides whether the remaining count matches
    /// expectations.
    pub fn image_paths(&self) -> Result<Vec<String>, CaptureRejection> {
        if self.status.as_deref() != Some(STATUS_COMPLETE) {
            return Err(CaptureRejection::Incomplete(self.status.clone()));
        }

        let paths: Vec<String> = self
            .raw_storage_path
            .iter()
            .flat_map(|map| map.values())
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect();

        if paths.is_empty() {
            return Err(CaptureRejection::NoPaths);
        }
        Ok(paths)
    }

    /// Number of entries in `raw_storage_path`, including unusable ones.
    pub fn raw_path_count(&self) -> usize {
        self.raw_storage_path.as_ref().map_or(0, Map::len)
    }
}

/// Subset of `GET /status` the CLI reports.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StorageStatus {
    #[serde(default)]
    pub sd_gb_free: Option<f64>,
    #[serde(default)]
    pub sd_gb_total: Option<f64>,
    #[serde(default)]
    pub sd_status: Option<String>,
    #[serde(default)]
    pub gps_used_sats: Option<i32>,
}

/// Data collected after one successful camera capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    /// Name of the device that produced the files.
    pub source_device: String,
    /// Remote paths of the captured files; never empty.
    pub image_paths: Vec<String>,
    /// Fused vehicle position; the sentinel until the scheduler fills it in.
    pub position: Position,
}

impl CaptureResult {
    pub fn new(source_device: impl Into<String>, image_paths: Vec<String>) -> Self {
        Self {
            source_device: source_device.into(),
            image_paths,
            position: Position::sentinel(),
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// First captured path, used as the telemetry field value.
    pub fn first_path(&self) -> Option<&str> {
        self.image_paths.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> CaptureResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_complete_response_keeps_device_order() {
        let response = parse(
            r#"{"status":"complete","raw_storage_path":{
                "1":"/files/SET0001/000/IMG_0000_1.tif",
                "10":"/files/SET0001/000/IMG_0000_10.tif",
                "2":"/files/SET0001/000/IMG_0000_2.tif"}}"#,
        );
        assert_eq!(
            response.image_paths().unwrap(),
            vec![
                "/files/SET0001/000/IMG_0000_1.tif",
                "/files/SET0001/000/IMG_0000_10.tif",
                "/files/SET0001/000/IMG_0000_2.tif",
            ]
        );
    }

    #[test]
    fn test_incomplete_status_is_rejected() {
        let response = parse(r#"{"status":"pending","raw_storage_path":{"1":"/a"}}"#);
        assert_eq!(
            response.image_paths(),
            Err(CaptureRejection::Incomplete(Some("pending".to_string())))
        );
        assert_eq!(
            parse("{}").image_paths(),
            Err(CaptureRejection::Incomplete(None))
        );
    }

    #[test]
    fn test_empty_or_non_string_paths_are_rejected() {
        let empty = parse(r#"{"status":"complete","raw_storage_path":{}}"#);
        assert_eq!(empty.image_paths(), Err(CaptureRejection::NoPaths));

        let nulls = parse(r#"{"status":"complete","raw_storage_path":{"1":null}}"#);
        assert_eq!(nulls.raw_path_count(), 1);
        assert_eq!(nulls.image_paths(), Err(CaptureRejection::NoPaths));
    }

    #[test]
    fn test_capture_result_defaults_to_sentinel() {
        let result = CaptureResult::new("cam1", vec!["/a".into()]);
        assert!(result.position.is_sentinel());
        assert_eq!(result.first_path(), Some("/a"));
    }
}
