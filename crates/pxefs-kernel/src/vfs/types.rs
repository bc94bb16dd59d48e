//! Core VFS types.
//!
//! Protocol-neutral attribute and directory entry shapes. The NFS binding
//! converts these into its wire structs; nothing here knows about XDR.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use pxefs_types::FileEntry;

/// Permission bits reported for every object. The namespace is read-only,
/// but kernels and init binaries served as a root filesystem need `x`.
pub const DEFAULT_PERM: u32 = 0o755;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// File attributes (metadata).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttr {
    /// Encoded handle, also used as the inode number.
    pub handle: u64,
    /// Size in bytes.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Unix permissions.
    pub perm: u32,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last access time.
    pub atime: SystemTime,
    /// Last status change time.
    pub ctime: SystemTime,
    /// Number of hard links.
    pub nlink: u32,
}

impl FileAttr {
    /// Synthetic directory: zero size, zero timestamps.
    ///
    /// Used for the namespace root and for image roots, which have no
    /// backing entry of their own.
    pub fn synthetic_directory(handle: u64) -> Self {
        Self {
            handle,
            size: 0,
            kind: FileType::Directory,
            perm: DEFAULT_PERM,
            mtime: SystemTime::UNIX_EPOCH,
            atime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
            nlink: 1,
        }
    }

    /// Attributes copied from an indexed entry.
    ///
    /// The last-modified time stands in for access and change time too.
    pub fn from_entry(handle: u64, entry: &FileEntry) -> Self {
        let kind = if entry.is_directory {
            FileType::Directory
        } else {
            FileType::File
        };
        Self {
            handle,
            size: entry.length,
            kind,
            perm: DEFAULT_PERM,
            mtime: entry.last_modified,
            atime: entry.last_modified,
            ctime: entry.last_modified,
            nlink: 1,
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Directory entry, ready for a protocol listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Encoded handle of the entry.
    pub handle: u64,
    pub attr: FileAttr,
}

/// One page of a directory listing.
#[derive(Debug, Clone, Default)]
pub struct DirPage {
    pub entries: Vec<DirEntry>,
    /// No entries remain after this page.
    pub end: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_synthetic_directory() {
        let attr = FileAttr::synthetic_directory(1);
        assert!(attr.is_dir());
        assert_eq!(attr.size, 0);
        assert_eq!(attr.mtime, SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn test_attr_from_entry() {
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let entry = FileEntry::file("boot/vmlinuz", 4096, mtime);
        let attr = FileAttr::from_entry(0x0100_0003, &entry);
        assert!(attr.is_file());
        assert_eq!(attr.size, 4096);
        assert_eq!(attr.mtime, mtime);
        assert_eq!(attr.atime, mtime);
        assert_eq!(attr.ctime, mtime);
        assert_eq!(attr.handle, 0x0100_0003);
    }
}
