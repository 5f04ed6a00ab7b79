//! Append-only event log of recorded captures.
//!
//! One CSV row per capture:
//!
//! ```text
//! camera_name[,timestamp][,gps_latitude,gps_longitude],image_path_1,...,image_path_N
//! ```
//!
//! The optional columns are chosen once per deployment through
//! [`EventColumns`]; readers (see [`crate::replay`]) must use the same
//! choice.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use crate::camera::CaptureResult;

/// Errors raised while writing the event log.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to open event log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write event log {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to flush event log {path}: {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Optional columns of the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventColumns {
    pub timestamp: bool,
    pub position: bool,
}

impl Default for EventColumns {
    fn default() -> Self {
        Self {
            timestamp: true,
            position: true,
        }
    }
}

impl EventColumns {
    /// Columns only `camera_name,image_paths...`.
    pub fn minimal() -> Self {
        Self {
            timestamp: false,
            position: false,
        }
    }

    /// Number of leading columns before the image paths.
    pub fn leading(&self) -> usize {
        1 + usize::from(self.timestamp) + 2 * usize::from(self.position)
    }
}

/// A capture ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureEvent {
    pub capture: CaptureResult,
    /// Wall-clock stamp in the configured format.
    pub timestamp: String,
}

impl CaptureEvent {
    pub fn new(capture: CaptureResult, timestamp: impl Into<String>) -> Self {
        Self {
            capture,
            timestamp: timestamp.into(),
        }
    }

    /// Render the row for the given column layout.
    pub fn to_row(&self, columns: EventColumns) -> Vec<&str> {
        let mut row = Vec::with_capacity(columns.leading() + self.capture.image_paths.len());
        row.push(self.capture.source_device.as_str());
        if columns.timestamp {
            row.push(self.timestamp.as_str());
        }
        if columns.position {
            row.push(self.capture.position.lat.as_str());
            row.push(self.capture.position.lon.as_str());
        }
        row.extend(self.capture.image_paths.iter().map(String::as_str));
        row
    }
}

/// Sink for recorded captures.
///
/// Called once per successful capture, in cycle order.
pub trait EventRecorder: Send + Sync {
    fn record(&self, event: &CaptureEvent) -> Result<(), RecorderError>;
}

/// CSV event log appended to a file.
///
/// Each row is flushed immediately so a crash loses at most the row being
/// written.
pub struct CsvEventRecorder {
    path: PathBuf,
    columns: EventColumns,
    writer: Mutex<csv::Writer<File>>,
}

impl CsvEventRecorder {
    /// Open (or create) the log at `path` for appending.
    pub fn open(path: impl AsRef<Path>, columns: EventColumns) -> Result<Self, RecorderError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| RecorderError::Open {
                path: path.clone(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| RecorderError::Open {
                path: path.clone(),
                source,
            })?;

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);

        Ok(Self {
            path,
            columns,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> EventColumns {
        self.columns
    }
}

impl EventRecorder for CsvEventRecorder {
    fn record(&self, event: &CaptureEvent) -> Result<(), RecorderError> {
        let mut writer = self.writer.lock();
        writer
            .write_record(event.to_row(self.columns))
            .map_err(|source| RecorderError::Write {
                path: self.path.clone(),
                source,
            })?;
        writer.flush().map_err(|source| RecorderError::Flush {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;

    fn event(device: &str, paths: &[&str]) -> CaptureEvent {
        let capture = CaptureResult::new(device, paths.iter().map(|p| p.to_string()).collect())
            .with_position(Position::new("45.1", "12.3"));
        CaptureEvent::new(capture, "2024-06-01 10:00:00")
    }

    #[test]
    fn test_row_layouts() {
        let e = event("cam1", &["/a.tif", "/b.tif"]);
        assert_eq!(
            e.to_row(EventColumns::default()),
            vec!["cam1", "2024-06-01 10:00:00", "45.1", "12.3", "/a.tif", "/b.tif"]
        );
        assert_eq!(e.to_row(EventColumns::minimal()), vec!["cam1", "/a.tif", "/b.tif"]);
        assert_eq!(
            e.to_row(EventColumns {
                timestamp: false,
                position: true
            }),
            vec!["cam1", "45.1", "12.3", "/a.tif", "/b.tif"]
        );
    }

    #[test]
    fn test_leading_columns() {
        assert_eq!(EventColumns::minimal().leading(), 1);
        assert_eq!(EventColumns::default().leading(), 4);
    }

    #[test]
    fn test_csv_recorder_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("events.csv");

        let recorder = CsvEventRecorder::open(&path, EventColumns::minimal()).unwrap();
        recorder.record(&event("cam1", &["/a.tif", "/b.tif"])).unwrap();
        recorder.record(&event("cam2", &["/c.tif"])).unwrap();
        drop(recorder);

        // Reopening appends instead of truncating.
        let recorder = CsvEventRecorder::open(&path, EventColumns::minimal()).unwrap();
        recorder.record(&event("cam1", &["/d.tif"])).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "cam1,/a.tif,/b.tif\ncam2,/c.tif\ncam1,/d.tif\n");
    }

    #[test]
    fn test_csv_recorder_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as the log file.
        let result = CsvEventRecorder::open(dir.path(), EventColumns::default());
        assert!(matches!(result, Err(RecorderError::Open { .. })));
    }
}
