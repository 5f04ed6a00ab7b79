//! Bulk retrieval of captured files from device storage.
//!
//! A run has two phases:
//!
//! 1. [`RetrievalWalker::enumerate`] lists the device's storage recursively
//!    into a [`RemoteTree`].
//! 2. [`RetrievalWalker::apply`] walks that tree depth-first and downloads
//!    (or deletes) every file through the device's
//!    [`FetchClient`](crate::fetch::FetchClient).
//!
//! Files inside one directory are handled as a concurrent batch; batches
//! for different directories never overlap.

mod tree;
mod walker;

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use thiserror::Error;

use crate::http::HttpError;

pub use tree::{FileEntry, Listing, RemoteNode, RemoteTree};
pub use walker::{RetrievalWalker, WalkerConfig, DEFAULT_EXCLUDED_EXTENSIONS, DEFAULT_MAX_DEPTH};

/// Errors that abort a retrieval run.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The root listing could not be fetched.
    #[error("failed to list {url}: {source}")]
    Listing {
        url: String,
        #[source]
        source: HttpError,
    },

    /// The listing was not valid JSON of the expected shape.
    #[error("invalid listing from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The name filter is not a valid regular expression.
    #[error("invalid filter '{pattern}': {source}")]
    Filter {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// What to do with each file of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrievalMode {
    #[default]
    Download,
    Delete,
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "download" => Ok(RetrievalMode::Download),
            "delete" => Ok(RetrievalMode::Delete),
            other => Err(format!(
                "unknown retrieval mode '{}' (expected download or delete)",
                other
            )),
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalMode::Download => write!(f, "download"),
            RetrievalMode::Delete => write!(f, "delete"),
        }
    }
}

/// Regular-expression filter on file paths.
///
/// Matches anywhere in the candidate string (search, not full match).
#[derive(Debug, Clone)]
pub struct NameFilter {
    regex: Regex,
}

impl NameFilter {
    pub fn new(pattern: &str) -> Result<Self, RetrievalError> {
        let regex = Regex::new(pattern).map_err(|source| RetrievalError::Filter {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }
}

/// Counters for one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkReport {
    pub downloaded: usize,
    pub cached: usize,
    pub deleted: usize,
    pub directories_deleted: usize,
    pub filtered_out: usize,
    pub failed: usize,
}

impl WalkReport {
    /// Number of files the walk looked at.
    pub fn files_seen(&self) -> usize {
        self.downloaded + self.cached + self.deleted + self.filtered_out + self.failed
    }

    pub fn merge(&mut self, other: &WalkReport) {
        self.downloaded += other.downloaded;
        self.cached += other.cached;
        self.deleted += other.deleted;
        self.directories_deleted += other.directories_deleted;
        self.filtered_out += other.filtered_out;
        self.failed += other.failed;
    }
}

impl fmt::Display for WalkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} cached, {} deleted ({} directories), {} filtered, {} failed",
            self.downloaded,
            self.cached,
            self.deleted,
            self.directories_deleted,
            self.filtered_out,
            self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_uses_search_semantics() {
        let filter = NameFilter::new("SET00(1|2)").unwrap();
        assert!(filter.matches("/data/cam1/SET0012/000/IMG_0000_1.tif"));
        assert!(!filter.matches("/data/cam1/SET0030/000/IMG_0000_1.tif"));
        assert_eq!(filter.pattern(), "SET00(1|2)");
    }

    #[test]
    fn test_invalid_filter() {
        let err = NameFilter::new("SET(").unwrap_err();
        assert!(matches!(err, RetrievalError::Filter { .. }));
        assert!(err.to_string().contains("SET("));
    }

    #[test]
    fn test_mode_parse_and_display() {
        assert_eq!("Delete".parse::<RetrievalMode>(), Ok(RetrievalMode::Delete));
        assert_eq!("download".parse::<RetrievalMode>(), Ok(RetrievalMode::Download));
        assert!("purge".parse::<RetrievalMode>().is_err());
        assert_eq!(RetrievalMode::Delete.to_string(), "delete");
    }

    #[test]
    fn test_report_merge() {
        let mut total = WalkReport {
            downloaded: 2,
            failed: 1,
            ..Default::default()
        };
        total.merge(&WalkReport {
            cached: 3,
            filtered_out: 1,
            ..Default::default()
        });
        assert_eq!(total.files_seen(), 7);
        assert_eq!(
            total.to_string(),
            "2 downloaded, 3 cached, 0 deleted (0 directories), 1 filtered, 1 failed"
        );
    }
}
