//! Cache-aware file download and deletion for one device.
//!
//! # Download flow
//!
//! ```text
//! remote path ──► local path ──► exists and > min size? ──yes──► Cached
//!                                       │ no
//!                                       ▼
//!                              GET primary/files/<path> ──ok──► write ──► Downloaded
//!                                       │ fail
//!                                       ▼
//!                              GET fallback/files/<path> ──ok──► write ──► Downloaded
//!                                       │ fail
//!                                       ▼
//!                                     None
//! ```
//!
//! Nothing escapes [`FetchClient::fetch`]: transport and filesystem errors
//! are logged and become `None`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::device::{delete_url, file_url, relative_remote_path, Device};
use crate::http::HttpClient;

/// Files at or below this size are treated as incomplete (bytes).
pub const DEFAULT_MIN_IMAGE_SIZE: u64 = 16_000;

/// Default timeout for one file transfer.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A plausible local copy already existed; no network call was made.
    Cached { path: PathBuf },
    /// The file was transferred and written to `path`.
    Downloaded { path: PathBuf, bytes: Vec<u8> },
}

impl FetchOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FetchOutcome::Cached { path } | FetchOutcome::Downloaded { path, .. } => path,
        }
    }

    pub fn was_transferred(&self) -> bool {
        matches!(self, FetchOutcome::Downloaded { .. })
    }
}

/// Fetch settings shared by every device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Root of the local mirror; each device gets a subdirectory.
    pub output_dir: PathBuf,
    /// Secondary base URL tried once when the primary fails.
    pub fallback_url: Option<String>,
    /// Minimum size for a local file to count as a cache hit.
    pub min_image_size: u64,
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            fallback_url: None,
            min_image_size: DEFAULT_MIN_IMAGE_SIZE,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Downloads and deletes files on one device.
pub struct FetchClient {
    device: Device,
    http: Arc<dyn HttpClient>,
    config: FetchConfig,
    in_flight: Mutex<HashSet<PathBuf>>,
}

/// Removes a path from the in-flight set when dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.path);
    }
}

impl FetchClient {
    pub fn new(device: Device, http: Arc<dyn HttpClient>, config: FetchConfig) -> Self {
        Self {
            device,
            http,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Client used for every request to this device.
    pub fn http(&self) -> &Arc<dyn HttpClient> {
        &self.http
    }

    /// Root of this device's local mirror.
    pub fn device_dir(&self) -> PathBuf {
        self.config.output_dir.join(self.device.name())
    }

    /// Deterministic local path for a remote file.
    ///
    /// Paths without a usable segment (`/files/`, `..`) map to
    /// [`device_dir`](Self::device_dir) and are refused by [`fetch`](Self::fetch).
    pub fn local_path(&self, remote_path: &str) -> PathBuf {
        let mut path = self.device_dir();
        for segment in path_segments(remote_path) {
            path.push(segment);
        }
        path
    }

    async fn cached_size(&self, path: &Path) -> Option<u64> {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        let plausible = metadata.is_file() && metadata.len() > self.config.min_image_size;
        plausible.then_some(metadata.len())
    }

    /// Download `remote_path` unless a plausible local copy exists.
    pub async fn fetch(&self, remote_path: &str) -> Option<FetchOutcome> {
        if path_segments(remote_path).next().is_none() {
            error!(
                device = %self.device.name(),
                remote = %remote_path,
                "Remote path names no file, skipping"
            );
            return None;
        }
        let path = self.local_path(remote_path);

        if self.cached_size(&path).await.is_some() {
            info!(
                device = %self.device.name(),
                path = %path.display(),
                "Image is already saved, skipping"
            );
            return Some(FetchOutcome::Cached { path });
        }

        let _guard = self.claim(&path)?;

        let bytes = self.download(remote_path).await?;

        if let Err(e) = write_file(&path, &bytes, &self.device_dir()).await {
            error!(
                device = %self.device.name(),
                path = %path.display(),
                error = %e,
                "Failed to save image"
            );
            return None;
        }

        info!(
            device = %self.device.name(),
            remote = %remote_path,
            path = %path.display(),
            size = bytes.len(),
            "Saved image"
        );
        Some(FetchOutcome::Downloaded { path, bytes })
    }

    /// Delete `remote_path` (file or directory) on the device.
    ///
    /// The fallback address is not used for deletion.
    pub async fn delete(&self, remote_path: &str) -> bool {
        let url = delete_url(self.device.base_url(), remote_path);
        match self.http.get(&url, self.config.timeout).await {
            Ok(_) => {
                info!(device = %self.device.name(), remote = %remote_path, "Deleted remote entry");
                true
            }
            Err(e) => {
                error!(
                    device = %self.device.name(),
                    remote = %remote_path,
                    error = %e,
                    "Failed to delete remote entry"
                );
                false
            }
        }
    }

    fn claim(&self, path: &Path) -> Option<InFlightGuard<'_>> {
        if !self.in_flight.lock().insert(path.to_path_buf()) {
            debug!(path = %path.display(), "Fetch already in flight, skipping");
            return None;
        }
        Some(InFlightGuard {
            set: &self.in_flight,
            path: path.to_path_buf(),
        })
    }

    /// Primary first, then exactly one attempt at the fallback.
    async fn download(&self, remote_path: &str) -> Option<Vec<u8>> {
        let primary = file_url(self.device.base_url(), remote_path);
        let primary_error = match self.http.get(&primary, self.config.timeout).await {
            Ok(bytes) => return Some(bytes),
            Err(e) => e,
        };
        warn!(device = %self.device.name(), error = %primary_error, "Primary address failed");

        let Some(fallback_base) = &self.config.fallback_url else {
            error!(device = %self.device.name(), url = %primary, "Failed to get image");
            return None;
        };

        let fallback = file_url(fallback_base, remote_path);
        match self.http.get(&fallback, self.config.timeout).await {
            Ok(bytes) => {
                debug!(device = %self.device.name(), url = %fallback, "Used fallback address");
                Some(bytes)
            }
            Err(e) => {
                error!(
                    device = %self.device.name(),
                    url = %primary,
                    fallback_error = %e,
                    "Failed to get image"
                );
                None
            }
        }
    }
}

/// Usable segments of a remote path, relative to the storage root.
fn path_segments(remote_path: &str) -> impl Iterator<Item = &str> {
    relative_remote_path(remote_path)
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
}

/// Write `bytes` to `path`, creating parents and replacing a directory in
/// the way. The mirror root `keep` is never replaced.
async fn write_file(path: &Path, bytes: &[u8], keep: &Path) -> std::io::Result<()> {
    if path == keep {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "refusing to replace the device directory",
        ));
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false) {
        tokio::fs::remove_dir_all(path).await?;
    }
    tokio::fs::write(path, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::{MockHttpClient, MockReply};

    const PRIMARY: &str = "http://cam1.local/files/SET0001/000/IMG_0000_1.tif";
    const FALLBACK: &str = "http://192.168.10.254/files/SET0001/000/IMG_0000_1.tif";
    const REMOTE: &str = "/files/SET0001/000/IMG_0000_1.tif";

    fn client(mock: Arc<MockHttpClient>, dir: &Path, fallback: bool) -> FetchClient {
        FetchClient::new(
            Device::new("cam1", "http://cam1.local", 5),
            mock,
            FetchConfig {
                output_dir: dir.to_path_buf(),
                fallback_url: fallback.then(|| "http://192.168.10.254".to_string()),
                min_image_size: 16,
                timeout: Duration::from_secs(10),
            },
        )
    }

    #[test]
    fn test_local_path_layout() {
        let fetch = client(Arc::new(MockHttpClient::new()), Path::new("/data"), false);
        assert_eq!(
            fetch.local_path(REMOTE),
            PathBuf::from("/data/cam1/SET0001/000/IMG_0000_1.tif")
        );
        assert_eq!(
            fetch.local_path("SET0001/000/IMG_0000_1.tif"),
            fetch.local_path(REMOTE)
        );
        // Parent references never escape the device directory.
        assert_eq!(fetch.local_path("/files/../x.tif"), PathBuf::from("/data/cam1/x.tif"));
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockHttpClient::new().route(PRIMARY, MockReply::ok(vec![7u8; 64])));
        let fetch = client(mock.clone(), dir.path(), true);

        let outcome = fetch.fetch(REMOTE).await.unwrap();
        assert!(outcome.was_transferred());
        assert_eq!(std::fs::read(outcome.path()).unwrap(), vec![7u8; 64]);
        assert_eq!(mock.call_count(FALLBACK), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network_until_file_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockHttpClient::new().route(PRIMARY, MockReply::ok(vec![1u8; 64])));
        let fetch = client(mock.clone(), dir.path(), false);

        let first = fetch.fetch(REMOTE).await.unwrap();
        let second = fetch.fetch(REMOTE).await.unwrap();
        assert!(!second.was_transferred());
        assert_eq!(mock.calls().len(), 1);

        std::fs::remove_file(first.path()).unwrap();
        assert!(fetch.fetch(REMOTE).await.unwrap().was_transferred());
        assert_eq!(mock.call_count(PRIMARY), 2);
    }

    #[tokio::test]
    async fn test_small_local_file_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockHttpClient::new().route(PRIMARY, MockReply::ok(vec![1u8; 64])));
        let fetch = client(mock.clone(), dir.path(), false);

        let path = fetch.local_path(REMOTE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"trunc").unwrap();

        assert!(fetch.fetch(REMOTE).await.unwrap().was_transferred());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_primary_failure_retries_fallback_once() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(
            MockHttpClient::new()
                .route(PRIMARY, MockReply::status(PRIMARY, 503))
                .route(FALLBACK, MockReply::ok(vec![2u8; 64])),
        );
        let fetch = client(mock.clone(), dir.path(), true);

        assert!(fetch.fetch(REMOTE).await.unwrap().was_transferred());
        assert_eq!(mock.call_count(PRIMARY), 1);
        assert_eq!(mock.call_count(FALLBACK), 1);
    }

    #[tokio::test]
    async fn test_both_addresses_fail() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockHttpClient::new());
        let fetch = client(mock.clone(), dir.path(), true);

        assert!(fetch.fetch(REMOTE).await.is_none());
        assert_eq!(mock.calls(), vec![PRIMARY.to_string(), FALLBACK.to_string()]);
        assert!(!fetch.local_path(REMOTE).exists());
    }

    #[tokio::test]
    async fn test_directory_in_the_way_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockHttpClient::new().route(PRIMARY, MockReply::ok(vec![3u8; 64])));
        let fetch = client(mock, dir.path(), false);

        let path = fetch.local_path(REMOTE);
        std::fs::create_dir_all(path.join("stale")).unwrap();

        fetch.fetch(REMOTE).await.unwrap();
        assert!(std::fs::metadata(&path).unwrap().is_file());
    }

    #[tokio::test]
    async fn test_path_without_file_leaves_mirror_intact() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(
            MockHttpClient::new()
                .route(PRIMARY, MockReply::ok(vec![4u8; 64]))
                .route("http://cam1.local/files/..", MockReply::ok(vec![9u8; 64]))
                .route("http://cam1.local/files/", MockReply::ok(vec![9u8; 64])),
        );
        let fetch = client(mock.clone(), dir.path(), false);

        let saved = fetch.fetch(REMOTE).await.unwrap();
        assert_eq!(fetch.local_path("/files/.."), fetch.device_dir());

        for remote in ["/files/..", "/files/", "/files/./..", ".."] {
            assert!(fetch.fetch(remote).await.is_none(), "{remote}");
        }
        assert_eq!(mock.calls(), vec![PRIMARY.to_string()]);
        assert!(fetch.device_dir().is_dir());
        assert_eq!(std::fs::read(saved.path()).unwrap(), vec![4u8; 64]);
    }

    #[tokio::test]
    async fn test_write_file_refuses_device_dir() {
        let dir = tempfile::tempdir().unwrap();
        let device_dir = dir.path().join("cam1");
        std::fs::create_dir_all(device_dir.join("SET0001")).unwrap();

        assert!(write_file(&device_dir, b"body", &device_dir).await.is_err());
        assert!(device_dir.join("SET0001").is_dir());
    }

    #[tokio::test]
    async fn test_delete_uses_primary_only() {
        let dir = tempfile::tempdir().unwrap();
        let delete = "http://cam1.local/deletefile/SET0001/000/IMG_0000_1.tif";
        let mock = Arc::new(MockHttpClient::new().route(delete, MockReply::ok("ok")));
        let fetch = client(mock.clone(), dir.path(), true);

        assert!(fetch.delete(REMOTE).await);
        assert!(!fetch.delete("/files/missing.tif").await);
        assert_eq!(mock.calls().len(), 2);
    }
}
