//! Indexed file metadata.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Metadata of one path inside an image.
///
/// Captured once while the image is indexed and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Last path segment.
    pub name: String,
    /// Relative, `/`-separated, no leading or trailing slash.
    pub path: String,
    /// Size in bytes.
    pub length: u64,
    pub last_modified: SystemTime,
    pub is_directory: bool,
}

impl FileEntry {
    /// Entry for a regular file at `path`.
    pub fn file(path: impl Into<String>, length: u64, last_modified: SystemTime) -> Self {
        Self::new(path.into(), length, last_modified, false)
    }

    /// Entry for a directory at `path`.
    pub fn directory(path: impl Into<String>, length: u64, last_modified: SystemTime) -> Self {
        Self::new(path.into(), length, last_modified, true)
    }

    fn new(path: String, length: u64, last_modified: SystemTime, is_directory: bool) -> Self {
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            name,
            path,
            length,
            last_modified,
            is_directory,
        }
    }
}
