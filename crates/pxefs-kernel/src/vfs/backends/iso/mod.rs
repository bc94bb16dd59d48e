//! ISO9660 image repository.
//!
//! The image file is opened once at init and kept open until `destroy`.
//! Reads are positioned (`pread`) on a blocking thread, so concurrent
//! readers share one descriptor without seeking.

mod volume;

#[cfg(test)]
mod builder;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use pxefs_types::{FileEntry, Image};

use crate::vfs::error::{ContentError, ContentResult};
use crate::vfs::index::{ContentIndex, ContentIndexBuilder, EntryMeta};
use crate::vfs::ops::ContentRepository;

use volume::Extent;

/// Repository for a [`pxefs_types::ImageFormat::Iso`] image.
#[derive(Debug)]
pub struct IsoRepository {
    image: Image,
    file: Mutex<Option<Arc<File>>>,
    index: Option<ContentIndex<Vec<Extent>>>,
}

impl IsoRepository {
    pub fn new(image: Image) -> Self {
        Self {
            image,
            file: Mutex::new(None),
            index: None,
        }
    }

    fn index(&self) -> ContentResult<&ContentIndex<Vec<Extent>>> {
        self.index.as_ref().ok_or_else(|| {
            ContentError::configuration(format!("image {} is not initialized", self.image.name))
        })
    }

    fn open_file(&self) -> ContentResult<Arc<File>> {
        self.file.lock().clone().ok_or_else(|| {
            ContentError::Io(io::Error::other(format!("image {} is closed", self.image.name)))
        })
    }

    fn configuration(&self, what: &str, e: io::Error) -> ContentError {
        ContentError::configuration(format!(
            "image {}: {what} {}: {e}",
            self.image.name,
            self.image.location.display()
        ))
    }
}

/// Map a byte range of a file onto `(image offset, length)` reads.
fn segments(extents: &[Extent], mut offset: u64, mut len: u64) -> Vec<(u64, usize)> {
    let mut out = Vec::new();
    for extent in extents {
        if len == 0 {
            break;
        }
        if offset >= extent.length {
            offset -= extent.length;
            continue;
        }
        let n = (extent.length - offset).min(len);
        out.push((extent.start + offset, n as usize));
        len -= n;
        offset = 0;
    }
    out
}

#[async_trait]
impl ContentRepository for IsoRepository {
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

        let file = File::open(&self.image.location).map_err(|e| self.configuration("cannot open", e))?;
        let volume = volume::read_primary(&file).map_err(|e| self.configuration("not an ISO9660 image", e))?;

        let mut builder = ContentIndexBuilder::new(&self.image);
        let mut failure = None;
        volume::walk(&file, &volume, |entry| {
            let meta = EntryMeta {
                length: entry.size,
                last_modified: entry.recorded,
                is_directory: entry.is_directory,
            };
            builder.insert(&entry.path, meta, entry.extents).map_err(|e| {
                let msg = e.to_string();
                failure = Some(e);
                io::Error::other(msg)
            })?;
            Ok(())
        })
        .map_err(|e| failure.take().unwrap_or_else(|| self.configuration("cannot read", e)))?;

        let index = builder.finish();
        tracing::info!(image = %self.image.name, entries = index.len(), location = %self.image.location.display(), "indexed iso");
        self.index = Some(index);
        *self.file.lock() = Some(Arc::new(file));
        Ok(())
    }

    fn destroy(&self) -> ContentResult<()> {
        if self.file.lock().take().is_some() {
            tracing::debug!(image = %self.image.name, "closed iso");
        }
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
        let size = indexed.entry.length;
        if offset >= size || len == 0 {
            return Ok(Vec::new());
        }

        let plan = segments(&indexed.source, offset, (len as u64).min(size - offset));
        let file = self.open_file()?;

        let data = tokio::task::spawn_blocking(move || -> io::Result<Vec<u8>> {
            let mut out = Vec::with_capacity(plan.iter().map(|(_, n)| n).sum());
            for (at, n) in plan {
                let start = out.len();
                out.resize(start + n, 0);
                file.read_exact_at(&mut out[start..], at)?;
            }
            Ok(out)
        })
        .await
        .map_err(io::Error::other)??;

        Ok(data)
    }
}
