//! Read-only content layer.
//!
//! Key components:
//!
//! - [`ContentRepository`] - one image's index and reader, per format
//! - [`ContentDirectory`] - routes operations to repositories by image name
//! - [`Namespace`] - 64-bit handle ↔ path resolution across all images
//! - [`DirectoryRepository`] / [`IsoRepository`] - the two formats
//!
//! ## Design Decisions
//!
//! - **Index once, never mutate**: every repository walks its source in
//!   `init` and answers every later query from immutable maps.
//! - **Flat paths**: directory structure is a prefix scan, not a tree.
//! - **Handles are namespaced**: the image id occupies the upper bits of
//!   every handle inside it, so no global table is needed to route one.
//! - **Root image transparency**: the root image's top-level content is
//!   listed directly under the namespace root.

pub mod backends;
mod content_dir;
mod error;
mod index;
mod namespace;
mod ops;
mod types;

pub use backends::{DirectoryRepository, IsoRepository};
pub use content_dir::ContentDirectory;
pub use error::{ContentError, ContentResult, TeardownFailure};
pub use index::{ContentIndex, ContentIndexBuilder, EntryMeta, IndexedEntry, is_direct_child, normalize_path};
pub use namespace::Namespace;
pub use ops::ContentRepository;
pub use types::{DEFAULT_PERM, DirEntry, DirPage, FileAttr, FileType};
