//! Device identity and the remote path convention shared by capture and
//! retrieval.
//!
//! Cameras report captured files as paths rooted at their storage endpoint,
//! e.g. `/files/SET0012/000/IMG_0003_1.tif`, while directory listings yield
//! paths relative to `/files`. Everything downstream works on the relative
//! form (`SET0012/000/IMG_0003_1.tif`) produced by [`relative_remote_path`].

use std::fmt;

/// Storage endpoint prefix used by the cameras' file API.
pub const FILES_PREFIX: &str = "files";

/// Endpoint prefix for file deletion.
pub const DELETE_PREFIX: &str = "deletefile";

/// One independently addressable imaging unit.
///
/// Immutable after construction; clone it into every component that needs
/// the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    name: String,
    base_url: String,
    expected_images: usize,
}

impl Device {
    /// Create a device.
    ///
    /// # Arguments
    ///
    /// * `name` - Identity used in logs, event rows and the local cache layout
    /// * `base_url` - Device HTTP root, e.g. `http://192.168.1.83:80`
    /// * `expected_images` - Advisory number of files per capture
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        expected_images: usize,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: trim_base(base_url.into()),
            expected_images,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn expected_images(&self) -> usize {
        self.expected_images
    }

    /// Absolute URL of an endpoint below the device root.
    pub fn endpoint(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.base_url)
    }
}

/// Normalize a remote path to its form relative to the storage root.
///
/// Strips leading slashes and a leading `files/` segment, so both capture
/// responses and listing-derived paths map to the same key.
pub fn relative_remote_path(path: &str) -> &str {
    let trimmed = path.trim_start_matches('/');
    match trimmed.strip_prefix(FILES_PREFIX) {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => trimmed,
    }
}

/// Join a base URL and a path with exactly one separating slash.
pub fn join_url(base: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.trim_end_matches('/').to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path)
    }
}

/// URL of a stored file below an arbitrary base (primary or fallback).
pub fn file_url(base: &str, remote_path: &str) -> String {
    join_url(
        base,
        &format!("{}/{}", FILES_PREFIX, relative_remote_path(remote_path)),
    )
}

/// URL that deletes a stored file or directory.
pub fn delete_url(base: &str, remote_path: &str) -> String {
    join_url(
        base,
        &format!("{}/{}", DELETE_PREFIX, relative_remote_path(remote_path)),
    )
}

fn trim_base(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
