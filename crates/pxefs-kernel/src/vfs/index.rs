//! Flat per-image content index.
//!
//! Every format repository walks its source exactly once and records each
//! path in three maps built together: path → source entry, path → file id,
//! and file id → path. The index is never mutated after the walk, so it is
//! shared across protocol worker threads without locking.
//!
//! Directory structure is not materialized. Listing a directory is a scan
//! for paths exactly one segment deeper than the requested prefix.

use std::collections::HashMap;
use std::time::SystemTime;

use pxefs_types::{FileEntry, Image, ImageId, ORDINAL_LIMIT};

use super::error::{ContentError, ContentResult};

/// Normalize a path discovered in an image source or requested by a client:
/// `\` becomes `/`, leading and trailing slashes are stripped.
pub fn normalize_path(raw: &str) -> String {
    raw.replace('\\', "/").trim_matches('/').to_string()
}

/// Returns true if `path` is exactly one segment below `prefix`.
///
/// An empty prefix (or `/`) selects top-level entries. The prefix must be
/// followed by a `/`: a plain string-prefix test would also list sibling
/// `ab/x` under `a`, which is not a child of `a`.
pub fn is_direct_child(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim().trim_matches('/');
    if prefix.is_empty() {
        return !path.trim().is_empty() && !path.contains('/');
    }
    match path.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('/')) {
        Some(rest) => !rest.is_empty() && !rest.contains('/'),
        None => false,
    }
}

/// Metadata recorded for one path during a walk.
#[derive(Debug, Clone, Copy)]
pub struct EntryMeta {
    pub length: u64,
    pub last_modified: SystemTime,
    pub is_directory: bool,
}

/// An indexed path with its format-specific source locator.
#[derive(Debug, Clone)]
pub struct IndexedEntry<S> {
    pub entry: FileEntry,
    pub source: S,
}

/// Immutable path ↔ id index for one image.
#[derive(Debug)]
pub struct ContentIndex<S> {
    image: ImageId,
    image_name: String,
    sources: HashMap<String, IndexedEntry<S>>,
    ids: HashMap<String, u64>,
    paths: HashMap<u64, String>,
}

impl<S> ContentIndex<S> {
    /// The owning image.
    pub fn image(&self) -> ImageId {
        self.image
    }

    /// Number of indexed paths.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Returns true if `path` is indexed.
    pub fn contains(&self, path: &str) -> bool {
        self.sources.contains_key(key(path))
    }

    /// Look up an indexed entry with its source locator.
    pub fn get(&self, path: &str) -> ContentResult<&IndexedEntry<S>> {
        self.sources.get(key(path)).ok_or_else(|| self.missing(path))
    }

    pub fn file_entry(&self, path: &str) -> ContentResult<FileEntry> {
        self.get(path).map(|indexed| indexed.entry.clone())
    }

    pub fn size(&self, path: &str) -> ContentResult<u64> {
        self.get(path).map(|indexed| indexed.entry.length)
    }

    /// Encoded file handle of `path`.
    pub fn path_to_id(&self, path: &str) -> ContentResult<u64> {
        self.ids
            .get(key(path))
            .copied()
            .ok_or_else(|| self.missing(path))
    }

    /// Path of an encoded file handle, if it belongs to this index.
    pub fn id_to_path(&self, id: u64) -> Option<&str> {
        self.paths.get(&id).map(String::as_str)
    }

    /// Direct children of `prefix`, sorted.
    pub fn list_children(&self, prefix: &str) -> Vec<String> {
        let mut children: Vec<String> = self
            .sources
            .keys()
            .filter(|path| is_direct_child(path, prefix))
            .cloned()
            .collect();
        children.sort();
        children
    }

    /// All indexed paths, unordered.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    fn missing(&self, path: &str) -> ContentError {
        ContentError::not_found(format!("{} in image {}", path, self.image_name))
    }
}

fn key(path: &str) -> &str {
    path.trim_matches('/')
}

/// Builds a [`ContentIndex`] from a single walk of an image source.
///
/// Ordinals are assigned in insertion order starting at 1.
#[derive(Debug)]
pub struct ContentIndexBuilder<S> {
    index: ContentIndex<S>,
    next_ordinal: u32,
}

impl<S> ContentIndexBuilder<S> {
    pub fn new(image: &Image) -> Self {
        Self {
            index: ContentIndex {
                image: image.id,
                image_name: image.name.clone(),
                sources: HashMap::new(),
                ids: HashMap::new(),
                paths: HashMap::new(),
            },
            next_ordinal: 1,
        }
    }

    /// Record one discovered path.
    ///
    /// Returns the assigned handle, or `None` when the path normalizes to
    /// the empty root entry or was already indexed.
    pub fn insert(&mut self, raw_path: &str, meta: EntryMeta, source: S) -> ContentResult<Option<u64>> {
        let path = normalize_path(raw_path);
        if path.trim().is_empty() {
            return Ok(None);
        }
        if self.index.sources.contains_key(&path) {
            tracing::debug!(image = %self.index.image_name, %path, "skipping duplicate path");
            return Ok(None);
        }
        if self.next_ordinal >= ORDINAL_LIMIT {
            return Err(ContentError::configuration(format!(
                "image {} has more than {} entries",
                self.index.image_name,
                ORDINAL_LIMIT - 1
            )));
        }

        let handle = self
            .index
            .image
            .file(self.next_ordinal)
            .map_err(|e| ContentError::configuration(e.to_string()))?
            .encode();
        self.next_ordinal += 1;

        tracing::debug!(image = %self.index.image_name, %path, handle = %format!("{handle:016x}"), "indexed");

        let entry = if meta.is_directory {
            FileEntry::directory(path.clone(), meta.length, meta.last_modified)
        } else {
            FileEntry::file(path.clone(), meta.length, meta.last_modified)
        };
        self.index.ids.insert(path.clone(), handle);
        self.index.paths.insert(handle, path.clone());
        self.index.sources.insert(path, IndexedEntry { entry, source });
        Ok(Some(handle))
    }

    pub fn finish(self) -> ContentIndex<S> {
        self.index
    }
}
