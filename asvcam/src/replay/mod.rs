//! Event-log replay: download exactly the files a capture run recorded.
//!
//! Rows are processed in log order; the paths of one row are fetched
//! concurrently and the row completes before the next begins. Rows naming a
//! device without a configured fetcher are logged and skipped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::fetch::{FetchClient, FetchOutcome};
use crate::position::Position;
use crate::recorder::EventColumns;

/// Errors raised while reading an event log.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to open event log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to read event log {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// One row of the event log.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedCapture {
    pub device: String,
    pub timestamp: Option<String>,
    pub position: Option<Position>,
    pub image_paths: Vec<String>,
    /// 1-based line in the log, for diagnostics.
    pub line: u64,
}

/// Totals of one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub rows: usize,
    pub unknown_device: usize,
    pub downloaded: usize,
    pub cached: usize,
    pub failed: usize,
}

/// Parse the log at `path` written with `columns`.
///
/// Rows too short to hold a single image path are skipped with a warning.
pub fn read_event_log(
    path: impl AsRef<Path>,
    columns: EventColumns,
) -> Result<Vec<LoggedCapture>, ReplayError> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|source| ReplayError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let leading = columns.leading();
    let mut captures = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|source| ReplayError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        if record.len() <= leading {
            warn!(line, fields = record.len(), "Event row has no image paths, skipping");
            continue;
        }

        let mut fields = record.iter().map(str::to_string);
        let device = fields.next().unwrap_or_default();
        let timestamp = if columns.timestamp { fields.next() } else { None };
        let position = if columns.position {
            match (fields.next(), fields.next()) {
                (Some(lat), Some(lon)) => Some(Position::new(lat, lon)),
                _ => None,
            }
        } else {
            None
        };

        captures.push(LoggedCapture {
            device,
            timestamp,
            position,
            image_paths: fields.filter(|p| !p.trim().is_empty()).collect(),
            line,
        });
    }

    debug!(path = %path.display(), rows = captures.len(), "Event log read");
    Ok(captures)
}

/// Download every logged path with the fetcher of its device.
pub async fn replay(
    captures: &[LoggedCapture],
    fetchers: &HashMap<String, Arc<FetchClient>>,
) -> ReplayReport {
    let mut report = ReplayReport::default();

    for capture in captures {
        report.rows += 1;
        let Some(fetch) = fetchers.get(&capture.device) else {
            error!(device = %capture.device, line = capture.line, "Invalid camera name");
            report.unknown_device += 1;
            continue;
        };

        let outcomes = join_all(capture.image_paths.iter().map(|path| fetch.fetch(path))).await;
        for outcome in outcomes {
            match outcome {
                Some(FetchOutcome::Downloaded { .. }) => report.downloaded += 1,
                Some(FetchOutcome::Cached { .. }) => report.cached += 1,
                None => report.failed += 1,
            }
        }
    }

    info!(
        rows = report.rows,
        downloaded = report.downloaded,
        cached = report.cached,
        failed = report.failed,
        unknown = report.unknown_device,
        "Replay finished"
    );
    report
}
