//! Namespace: the virtual filesystem seen by network clients.
//!
//! Joins every image under one root. Each image appears as a directory
//! named after it, except the root image whose top-level entries appear
//! directly under the namespace root. Handles are the flat `u64`s of
//! [`pxefs_types::Handle`]; every request decodes its handle first and
//! branches on the three kinds.
//!
//! Path form: `image/some/path` for ordinary images, `some/path` for the
//! root image. Leading and trailing slashes are ignored.

use std::io;
use std::sync::Arc;

use pxefs_types::{Handle, Image, ROOT_HANDLE};

use super::content_dir::ContentDirectory;
use super::error::{ContentError, ContentResult};
use super::types::{DirEntry, DirPage, FileAttr};
use crate::registry::ImageRegistry;

/// A decoded, resolved handle.
#[derive(Debug, Clone)]
enum Location<'a> {
    Root,
    ImageRoot(&'a Image),
    Entry { image: &'a Image, path: String },
}

/// Read-only virtual filesystem over all registered images.
///
/// Holds no mutable state; clones share the same registry and content.
#[derive(Debug, Clone)]
pub struct Namespace {
    registry: Arc<ImageRegistry>,
    content: Arc<ContentDirectory>,
}

impl Namespace {
    pub fn new(registry: Arc<ImageRegistry>, content: Arc<ContentDirectory>) -> Self {
        Self { registry, content }
    }

    pub fn registry(&self) -> &ImageRegistry {
        &self.registry
    }

    pub fn content(&self) -> &ContentDirectory {
        &self.content
    }

    /// Shared handle to the content directory, kept alive past the namespace.
    pub fn shared_content(&self) -> Arc<ContentDirectory> {
        Arc::clone(&self.content)
    }

    pub fn root_handle(&self) -> u64 {
        ROOT_HANDLE
    }

    /// Constant directory verifier; listings never change.
    pub fn directory_verifier(&self) -> [u8; 8] {
        [0; 8]
    }

    fn is_root_image(&self, image: &Image) -> bool {
        self.registry.root().is_some_and(|root| root.id == image.id)
    }

    fn unknown(handle: u64) -> ContentError {
        ContentError::not_found(format!("handle {handle:016x}"))
    }

    fn locate(&self, handle: u64) -> ContentResult<Location<'_>> {
        match Handle::decode(handle).ok_or_else(|| Self::unknown(handle))? {
            Handle::Root => Ok(Location::Root),
            Handle::Image(id) => self
                .registry
                .get(id)
                .map(Location::ImageRoot)
                .ok_or_else(|| Self::unknown(handle)),
            Handle::File { image: id, .. } => {
                let image = self.registry.get(id).ok_or_else(|| Self::unknown(handle))?;
                let path = self
                    .content
                    .id_to_path(image, handle)?
                    .ok_or_else(|| Self::unknown(handle))?;
                Ok(Location::Entry { image, path })
            }
        }
    }

    fn handle_of(&self, location: &Location<'_>) -> ContentResult<u64> {
        match location {
            Location::Root => Ok(ROOT_HANDLE),
            Location::ImageRoot(image) => Ok(image.id.get()),
            Location::Entry { image, path } => self.content.path_to_id(image, path),
        }
    }

    /// Resolve a namespace path without touching the indexes.
    fn locate_path<'a>(&'a self, path: &str) -> ContentResult<Location<'a>> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Ok(Location::Root);
        }

        let (candidate, rest) = match path.split_once('/') {
            Some((candidate, rest)) => (candidate, Some(rest)),
            None => (path, None),
        };
        if let Some(image) = self.registry.by_name(candidate) {
            return Ok(match rest {
                Some(rest) => Location::Entry {
                    image,
                    path: rest.to_string(),
                },
                None => Location::ImageRoot(image),
            });
        }

        match self.registry.root() {
            Some(image) => Ok(Location::Entry {
                image,
                path: path.to_string(),
            }),
            None => Err(ContentError::not_found(path)),
        }
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Namespace path of a handle.
    ///
    /// The namespace root and the root image's top directory are both `""`.
    pub fn handle_to_path(&self, handle: u64) -> ContentResult<String> {
        Ok(match self.locate(handle)? {
            Location::Root => String::new(),
            Location::ImageRoot(image) if self.is_root_image(image) => String::new(),
            Location::ImageRoot(image) => image.name.clone(),
            Location::Entry { image, path } if self.is_root_image(image) => path,
            Location::Entry { image, path } => format!("{}/{}", image.name, path),
        })
    }

    /// Handle of a namespace path.
    ///
    /// A first segment naming an image selects that image; anything else
    /// is looked up inside the root image.
    pub fn path_to_handle(&self, path: &str) -> ContentResult<u64> {
        let location = self.locate_path(path)?;
        self.handle_of(&location)
    }

    /// Handle of `name` inside directory `dir`. Understands `.` and `..`.
    pub fn lookup(&self, dir: u64, name: &str) -> ContentResult<u64> {
        let location = self.locate(dir)?;
        let found = match (name, location) {
            (".", location) => self.handle_of(&location),
            ("..", _) => self.parent_of(dir),
            (name, Location::Root) => self.path_to_handle(name),
            (name, Location::ImageRoot(image)) => self.content.path_to_id(image, name),
            (name, Location::Entry { image, path }) => {
                self.content.path_to_id(image, &format!("{path}/{name}"))
            }
        };
        if let Err(e) = &found {
            tracing::debug!(dir = %format!("{dir:016x}"), %name, error = %e, "lookup failed");
        }
        found
    }

    /// Handle of the directory containing `handle`.
    ///
    /// The namespace root is its own parent. Top-level entries of the root
    /// image have the namespace root as parent.
    pub fn parent_of(&self, handle: u64) -> ContentResult<u64> {
        match self.locate(handle)? {
            Location::Root | Location::ImageRoot(_) => Ok(ROOT_HANDLE),
            Location::Entry { image, path } => match path.rsplit_once('/') {
                Some((parent, _)) => self.content.path_to_id(image, parent),
                None if self.is_root_image(image) => Ok(ROOT_HANDLE),
                None => Ok(image.id.get()),
            },
        }
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Attributes of a handle.
    ///
    /// The namespace root and image roots are synthetic directories. So is a
    /// top-level root image entry named like an image, since that name
    /// stands for the image at the namespace root.
    pub fn getattr(&self, handle: u64) -> ContentResult<FileAttr> {
        match self.locate(handle)? {
            Location::Root | Location::ImageRoot(_) => Ok(FileAttr::synthetic_directory(handle)),
            Location::Entry { image, path }
                if self.is_root_image(image)
                    && !path.contains('/')
                    && self.registry.by_name(&path).is_some() =>
            {
                Ok(FileAttr::synthetic_directory(handle))
            }
            Location::Entry { image, path } => {
                let entry = self.content.get_file_entry(image, &path)?;
                Ok(FileAttr::from_entry(handle, &entry))
            }
        }
    }

    /// Attributes of a namespace path.
    pub fn stat_path(&self, path: &str) -> ContentResult<FileAttr> {
        self.getattr(self.path_to_handle(path)?)
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// Direct children of a directory handle, sorted by name.
    pub fn list(&self, handle: u64) -> ContentResult<Vec<DirEntry>> {
        let mut entries = match self.locate(handle)? {
            Location::Root => self.list_root()?,
            Location::ImageRoot(image) => self.list_image(image, "")?,
            Location::Entry { image, path } => {
                let entry = self.content.get_file_entry(image, &path)?;
                if !entry.is_directory {
                    return Err(ContentError::Io(io::Error::new(
                        io::ErrorKind::NotADirectory,
                        path,
                    )));
                }
                self.list_image(image, &path)?
            }
        };
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn list_root(&self) -> ContentResult<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for image in self.registry.images() {
            if self.is_root_image(image) {
                continue;
            }
            entries.push(DirEntry {
                name: image.name.clone(),
                handle: image.id.get(),
                attr: FileAttr::synthetic_directory(image.id.get()),
            });
        }
        if let Some(root) = self.registry.root() {
            // Image names shadow same-named root image entries.
            for entry in self.list_image(root, "")? {
                if self.registry.by_name(&entry.name).is_none() {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    fn list_image(&self, image: &Image, prefix: &str) -> ContentResult<Vec<DirEntry>> {
        self.content
            .list_children(image, prefix)?
            .into_iter()
            .map(|path| {
                let handle = self.content.path_to_id(image, &path)?;
                let entry = self.content.get_file_entry(image, &path)?;
                Ok(DirEntry {
                    name: entry.name.clone(),
                    handle,
                    attr: FileAttr::from_entry(handle, &entry),
                })
            })
            .collect()
    }

    /// One page of a listing.
    ///
    /// `cookie` is the handle of the last entry already returned, `0` to
    /// start from the beginning.
    pub fn read_dir(&self, handle: u64, cookie: u64, max: usize) -> ContentResult<DirPage> {
        let entries = self.list(handle)?;
        let start = if cookie == 0 {
            0
        } else {
            entries
                .iter()
                .position(|entry| entry.handle == cookie)
                .map(|i| i + 1)
                .ok_or_else(|| ContentError::not_found(format!("cookie {cookie:016x}")))?
        };
        let page: Vec<DirEntry> = entries.iter().skip(start).take(max).cloned().collect();
        let end = start + page.len() >= entries.len();
        Ok(DirPage { entries: page, end })
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Read up to `count` bytes at `offset`; the flag is true at end of file.
    pub async fn read(&self, handle: u64, offset: u64, count: usize) -> ContentResult<(Vec<u8>, bool)> {
        match self.locate(handle)? {
            Location::Root | Location::ImageRoot(_) => {
                Err(ContentError::is_a_directory(format!("{handle:016x}")))
            }
            Location::Entry { image, path } => {
                let size = self.content.get_size(image, &path)?;
                let data = self.content.read_range(image, &path, offset, count).await?;
                let eof = offset.saturating_add(data.len() as u64) >= size;
                Ok((data, eof))
            }
        }
    }

    // ========================================================================
    // Mutation (unsupported)
    // ========================================================================

    pub fn create(&self, _dir: u64, _name: &str) -> ContentResult<FileAttr> {
        Err(ContentError::unsupported("create"))
    }

    pub fn mkdir(&self, _dir: u64, _name: &str) -> ContentResult<FileAttr> {
        Err(ContentError::unsupported("mkdir"))
    }

    pub fn remove(&self, _dir: u64, _name: &str) -> ContentResult<()> {
        Err(ContentError::unsupported("remove"))
    }

    pub fn rename(&self, _from_dir: u64, _from: &str, _to_dir: u64, _to: &str) -> ContentResult<()> {
        Err(ContentError::unsupported("rename"))
    }

    pub fn write(&self, _handle: u64, _offset: u64, _data: &[u8]) -> ContentResult<FileAttr> {
        Err(ContentError::unsupported("write"))
    }

    pub fn symlink(&self, _dir: u64, _name: &str, _target: &str) -> ContentResult<FileAttr> {
        Err(ContentError::unsupported("symlink"))
    }

    pub fn link(&self, _handle: u64, _dir: u64, _name: &str) -> ContentResult<FileAttr> {
        Err(ContentError::unsupported("link"))
    }

    pub fn setattr(&self, _handle: u64) -> ContentResult<FileAttr> {
        Err(ContentError::unsupported("setattr"))
    }

    pub fn set_acl(&self, _handle: u64) -> ContentResult<()> {
        Err(ContentError::unsupported("set_acl"))
    }
}
