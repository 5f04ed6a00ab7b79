//! Recursive listing and depth-first application over a device's storage.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::tree::{FileEntry, Listing, RemoteTree};
use super::{NameFilter, RetrievalError, RetrievalMode, WalkReport};
use crate::device::{join_url, FILES_PREFIX};
use crate::fetch::{FetchClient, FetchOutcome};
use crate::http::BoxFuture;

/// Extensions skipped during enumeration (diagnostic dumps).
pub const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] = &["dat"];

/// Deepest directory level that is listed.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Entry names that are never descended into or fetched.
const EXCLUDED_DIRECTORIES: &[&str] = &["System Volume Information", ".", ".."];

/// Walker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerConfig {
    /// Lowercase extensions (without dot) left out of the tree.
    pub excluded_extensions: Vec<String>,
    pub max_depth: usize,
    /// Cap on concurrent requests within one directory batch.
    pub max_concurrent: Option<usize>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            excluded_extensions: DEFAULT_EXCLUDED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_concurrent: None,
        }
    }
}

impl WalkerConfig {
    pub fn with_max_concurrent(mut self, limit: usize) -> Self {
        self.max_concurrent = Some(limit.max(1));
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Result of handling one file.
enum FileOutcome {
    Downloaded,
    Cached,
    Deleted,
    FilteredOut,
    Failed,
}

/// Enumerates and retrieves (or purges) one device's stored files.
pub struct RetrievalWalker {
    fetch: Arc<FetchClient>,
    config: WalkerConfig,
}

impl RetrievalWalker {
    pub fn new(fetch: Arc<FetchClient>, config: WalkerConfig) -> Self {
        Self { fetch, config }
    }

    pub fn fetch_client(&self) -> &Arc<FetchClient> {
        &self.fetch
    }

    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// Enumerate then apply.
    pub async fn run(
        &self,
        mode: RetrievalMode,
        filter: Option<&NameFilter>,
    ) -> Result<WalkReport, RetrievalError> {
        let tree = self.enumerate().await?;
        info!(
            device = %self.fetch.device().name(),
            files = tree.file_count(),
            mode = %mode,
            "Remote tree enumerated"
        );
        let report = self.apply(&tree, mode, filter).await;
        info!(device = %self.fetch.device().name(), summary = %report, "Retrieval finished");
        Ok(report)
    }

    /// List the device storage recursively.
    ///
    /// Only a failure of the root listing is an error; unreadable
    /// subdirectories become empty subtrees.
    pub async fn enumerate(&self) -> Result<RemoteTree, RetrievalError> {
        let root = self.list("").await?;
        Ok(self.build(root, String::new(), 0).await)
    }

    /// Walk `tree` depth-first, subdirectories before the files beside them.
    pub async fn apply(
        &self,
        tree: &RemoteTree,
        mode: RetrievalMode,
        filter: Option<&NameFilter>,
    ) -> WalkReport {
        let mut report = WalkReport::default();
        self.apply_directory(tree, String::new(), mode, filter, &mut report)
            .await;
        report
    }

    fn listing_url(&self, route: &str) -> String {
        join_url(
            self.fetch.device().base_url(),
            &format!("{}{}", FILES_PREFIX, route),
        )
    }

    async fn list(&self, route: &str) -> Result<Listing, RetrievalError> {
        let url = self.listing_url(route);
        debug!(device = %self.fetch.device().name(), url = %url, "Listing directory");

        let body = self
            .fetch
            .http()
            .get(&url, self.fetch.config().timeout)
            .await
            .map_err(|source| RetrievalError::Listing {
                url: url.clone(),
                source,
            })?;

        serde_json::from_slice(&body).map_err(|source| RetrievalError::Parse { url, source })
    }

    fn build<'a>(
        &'a self,
        listing: Listing,
        route: String,
        depth: usize,
    ) -> BoxFuture<'a, RemoteTree> {
        Box::pin(async move {
            let mut tree = RemoteTree::new();

            for name in listing.directories {
                if name.is_empty() || EXCLUDED_DIRECTORIES.contains(&name.as_str()) {
                    continue;
                }
                let child = format!("{}/{}", route, name);
                if depth + 1 > self.config.max_depth {
                    warn!(
                        device = %self.fetch.device().name(),
                        path = %child,
                        max_depth = self.config.max_depth,
                        "Directory exceeds maximum depth, skipping"
                    );
                    continue;
                }
                let subtree = match self.list(&child).await {
                    Ok(sub) => self.build(sub, child, depth + 1).await,
                    Err(e) => {
                        warn!(
                            device = %self.fetch.device().name(),
                            error = %e,
                            "Failed to list subdirectory"
                        );
                        RemoteTree::new()
                    }
                };
                tree.insert_directory(name, subtree);
            }

            for entry in listing.files {
                if self.is_excluded_file(&entry) {
                    continue;
                }
                tree.insert_file(entry);
            }

            tree
        })
    }

    fn is_excluded_file(&self, entry: &FileEntry) -> bool {
        if entry.name.is_empty() || EXCLUDED_DIRECTORIES.contains(&entry.name.as_str()) {
            return true;
        }
        entry.extension().is_some_and(|ext| {
            self.config
                .excluded_extensions
                .iter()
                .any(|x| x.eq_ignore_ascii_case(&ext))
        })
    }

    fn apply_directory<'a>(
        &'a self,
        tree: &'a RemoteTree,
        route: String,
        mode: RetrievalMode,
        filter: Option<&'a NameFilter>,
        report: &'a mut WalkReport,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for (name, subtree) in tree.directories() {
                self.apply_directory(subtree, format!("{}/{}", route, name), mode, filter, report)
                    .await;
            }

            let paths: Vec<String> =
                tree.files().map(|f| format!("{}/{}", route, f.name)).collect();
            if !paths.is_empty() {
                let limit = self.config.max_concurrent.unwrap_or(paths.len()).max(1);
                let outcomes: Vec<FileOutcome> = stream::iter(paths)
                    .map(|path| self.apply_file(path, mode, filter))
                    .buffer_unordered(limit)
                    .collect()
                    .await;

                for outcome in outcomes {
                    match outcome {
                        FileOutcome::Downloaded => report.downloaded += 1,
                        FileOutcome::Cached => report.cached += 1,
                        FileOutcome::Deleted => report.deleted += 1,
                        FileOutcome::FilteredOut => report.filtered_out += 1,
                        FileOutcome::Failed => report.failed += 1,
                    }
                }
            }

            if mode == RetrievalMode::Delete && !route.is_empty() {
                if filter.is_some_and(|f| !f.matches(&route)) {
                    debug!(path = %route, "Directory filtered out");
                } else if self.fetch.delete(&route).await {
                    report.directories_deleted += 1;
                }
            }
        })
    }

    async fn apply_file(
        &self,
        remote: String,
        mode: RetrievalMode,
        filter: Option<&NameFilter>,
    ) -> FileOutcome {
        match mode {
            RetrievalMode::Download => {
                let local = self.fetch.local_path(&remote);
                let candidate = local.to_string_lossy();
                if let Some(f) = filter.filter(|f| !f.matches(&candidate)) {
                    debug!(path = %candidate, filter = %f.pattern(), "Image filtered out");
                    return FileOutcome::FilteredOut;
                }
                match self.fetch.fetch(&remote).await {
                    Some(FetchOutcome::Downloaded { .. }) => FileOutcome::Downloaded,
                    Some(FetchOutcome::Cached { .. }) => FileOutcome::Cached,
                    None => FileOutcome::Failed,
                }
            }
            RetrievalMode::Delete => {
                if let Some(f) = filter.filter(|f| !f.matches(&remote)) {
                    debug!(path = %remote, filter = %f.pattern(), "Image filtered out");
                    return FileOutcome::FilteredOut;
                }
                if self.fetch.delete(&remote).await {
                    FileOutcome::Deleted
                } else {
                    FileOutcome::Failed
                }
            }
        }
    }
}
