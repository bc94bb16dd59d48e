//! Plain directory tree repository.
//!
//! Serves a host directory as an image. The tree is walked once at init;
//! files added afterwards are not visible, and metadata reflects the walk.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use walkdir::WalkDir;

use pxefs_types::{FileEntry, Image};

use crate::vfs::error::{ContentError, ContentResult};
use crate::vfs::index::{ContentIndex, ContentIndexBuilder, EntryMeta};
use crate::vfs::ops::ContentRepository;

/// Repository for a [`pxefs_types::ImageFormat::Directory`] image.
///
/// The index source locator is the absolute host path of each entry.
#[derive(Debug)]
pub struct DirectoryRepository {
    image: Image,
    index: Option<ContentIndex<PathBuf>>,
}

impl DirectoryRepository {
    pub fn new(image: Image) -> Self {
        Self { image, index: None }
    }

    /// The directory being served.
    pub fn root(&self) -> &Path {
        &self.image.location
    }

    fn index(&self) -> ContentResult<&ContentIndex<PathBuf>> {
        self.index.as_ref().ok_or_else(|| {
            ContentError::configuration(format!("image {} is not initialized", self.image.name))
        })
    }

    fn walk(&self) -> ContentResult<ContentIndex<PathBuf>> {
        let root = self.root();
        if !root.is_dir() {
            return Err(ContentError::configuration(format!(
                "image {}: {} is not a readable directory",
                self.image.name,
                root.display()
            )));
        }

        let mut builder = ContentIndexBuilder::new(&self.image);
        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .min_depth(1);

        for entry in walker {
            let entry = entry.map_err(|e| {
                ContentError::configuration(format!("image {}: walk failed: {e}", self.image.name))
            })?;
            let meta = entry.metadata().map_err(|e| {
                ContentError::configuration(format!(
                    "image {}: cannot stat {}: {e}",
                    self.image.name,
                    entry.path().display()
                ))
            })?;

            // min_depth(1) guarantees every entry is below root.
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_string_lossy();
            let meta = EntryMeta {
                length: meta.len(),
                last_modified: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
                is_directory: meta.is_dir(),
            };
            builder.insert(&relative, meta, entry.path().to_path_buf())?;
        }

        Ok(builder.finish())
    }
}

#[async_trait]
impl ContentRepository for DirectoryRepository {
    fn image(&self) -> &Image {
        &self.image
    }

    fn init(&mut self) -> ContentResult<()> {
        if self.index.is_some() {
            return Err(ContentError::configuration(format!(
                "image {} initialized twice",
                self.image.name
            )));
        }
        let index = self.walk()?;
        tracing::info!(image = %self.image.name, entries = index.len(), root = %self.root().display(), "indexed directory");
        self.index = Some(index);
        Ok(())
    }

    fn destroy(&self) -> ContentResult<()> {
        // Files are opened per read; nothing is held.
        Ok(())
    }

    fn file_entry(&self, path: &str) -> ContentResult<FileEntry> {
        self.index()?.file_entry(path)
    }

    fn size(&self, path: &str) -> ContentResult<u64> {
        self.index()?.size(path)
    }

    fn exists(&self, path: &str) -> bool {
        self.index.as_ref().is_some_and(|index| index.contains(path))
    }

    fn path_to_id(&self, path: &str) -> ContentResult<u64> {
        self.index()?.path_to_id(path)
    }

    fn id_to_path(&self, id: u64) -> Option<String> {
        self.index.as_ref()?.id_to_path(id).map(str::to_string)
    }

    fn list_children(&self, prefix: &str) -> ContentResult<Vec<String>> {
        Ok(self.index()?.list_children(prefix))
    }

    async fn read_range(&self, path: &str, offset: u64, len: usize) -> ContentResult<Vec<u8>> {
        let indexed = self.index()?.get(path)?;
        if indexed.entry.is_directory {
            return Err(ContentError::is_a_directory(path));
        }

        let mut file = fs::File::open(&indexed.source).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;

        let mut buffer = Vec::with_capacity(len.min(1 << 20));
        file.take(len as u64).read_to_end(&mut buffer).await?;
        Ok(buffer)
    }
}
