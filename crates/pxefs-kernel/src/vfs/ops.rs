//! Content repository trait.
//!
//! One implementation per image format. Paths are relative to the image
//! root: `/`-separated, no leading or trailing slash.

use async_trait::async_trait;

use pxefs_types::{FileEntry, Image};

use super::ContentResult;

/// Per-image index and reader.
///
/// Lifecycle: constructed for one [`Image`], [`init`](Self::init) exactly
/// once (blocking: walks the whole source), queried concurrently, then
/// [`destroy`](Self::destroy) once at shutdown. Query methods take `&self`
/// and never mutate the index.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// The image this repository serves.
    fn image(&self) -> &Image;

    /// Open the source and build the index.
    ///
    /// Fails with a configuration error if the source is missing or
    /// unreadable, or if called twice.
    fn init(&mut self) -> ContentResult<()>;

    /// Release held resources. Queries after this may fail.
    fn destroy(&self) -> ContentResult<()>;

    // ========================================================================
    // Index queries
    // ========================================================================

    fn file_entry(&self, path: &str) -> ContentResult<FileEntry>;

    /// Size in bytes of `path`.
    fn size(&self, path: &str) -> ContentResult<u64>;

    /// Returns true if `path` is indexed. Always false before init.
    fn exists(&self, path: &str) -> bool;

    /// Encoded file handle of `path`.
    fn path_to_id(&self, path: &str) -> ContentResult<u64>;

    /// Path of an encoded file handle, `None` if it is not ours.
    fn id_to_path(&self, id: u64) -> Option<String>;

    /// Paths exactly one level below `prefix`, sorted.
    fn list_children(&self, prefix: &str) -> ContentResult<Vec<String>>;

    // ========================================================================
    // Reading
    // ========================================================================

    /// Read up to `len` bytes of `path` starting at `offset`.
    ///
    /// Returns fewer bytes at end of file and none past it. Reading a
    /// directory is an I/O error.
    async fn read_range(&self, path: &str, offset: u64, len: usize) -> ContentResult<Vec<u8>>;

    /// Read the whole content of `path`.
    async fn read_all(&self, path: &str) -> ContentResult<Vec<u8>> {
        let size = self.size(path)?;
        let len = usize::try_from(size).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{path} does not fit in memory"))
        })?;
        self.read_range(path, 0, len).await
    }
}
