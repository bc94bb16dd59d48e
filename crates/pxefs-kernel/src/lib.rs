//! pxefs kernel: the format-agnostic content layer.
//!
//! - [`ImageRegistry`] - the validated, immutable image catalog
//! - [`vfs::ContentRepository`] - per-image, per-format index and reader
//! - [`vfs::ContentDirectory`] - routes content operations to repositories
//! - [`vfs::Namespace`] - handle/path resolution for network filesystems

pub mod registry;
pub mod vfs;

pub use registry::{ImageRegistry, RegistryError};
pub use vfs::{
    ContentDirectory, ContentError, ContentRepository, ContentResult, DirEntry, DirPage, FileAttr,
    FileType, Namespace,
};
