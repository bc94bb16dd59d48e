//! Aggregate content directory.
//!
//! Routes content operations to the repository of the named image and owns
//! every repository's lifecycle.

use std::collections::HashMap;

use pxefs_types::{FileEntry, Image};

use super::backends;
use super::error::{ContentError, ContentResult, TeardownFailure};
use super::ops::ContentRepository;

/// One initialized repository per image, keyed by image name.
///
/// Built once before any protocol server starts and then shared read-only.
#[derive(Default)]
pub struct ContentDirectory {
    repositories: HashMap<String, Box<dyn ContentRepository>>,
    /// Registration order, for listing and teardown.
    order: Vec<String>,
}

impl std::fmt::Debug for ContentDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentDirectory")
            .field("images", &self.order)
            .finish()
    }
}

impl ContentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct and initialize a repository for every image.
    ///
    /// Fails fast on the first unreadable source or duplicate name; the
    /// repositories initialized so far are torn down before returning.
    pub fn init_all<'a>(images: impl IntoIterator<Item = &'a Image>) -> ContentResult<Self> {
        let mut directory = Self::new();
        for image in images {
            if let Err(e) = directory.register(backends::for_image(image.clone())) {
                if let Err(teardown) = directory.destroy_all() {
                    tracing::warn!(error = %teardown, "cleanup after failed init");
                }
                return Err(e);
            }
        }
        Ok(directory)
    }

    /// Initialize `repository` and add it under its image's name.
    pub fn register(&mut self, mut repository: Box<dyn ContentRepository>) -> ContentResult<()> {
        let name = repository.image().name.clone();
        if self.repositories.contains_key(&name) {
            return Err(ContentError::configuration(format!("duplicate image name {name}")));
        }

        tracing::debug!(image = %name, format = %repository.image().format, "initializing");
        if let Err(e) = repository.init() {
            if let Err(cleanup) = repository.destroy() {
                tracing::warn!(image = %name, error = %cleanup, "destroy after failed init");
            }
            return Err(e);
        }

        self.order.push(name.clone());
        self.repositories.insert(name, repository);
        Ok(())
    }

    /// Destroy every repository, continuing past failures.
    ///
    /// Returns all failures together as [`ContentError::Teardown`].
    pub fn destroy_all(&self) -> ContentResult<()> {
        let mut failures = Vec::new();
        for name in &self.order {
            let Some(repository) = self.repositories.get(name) else {
                continue;
            };
            match repository.destroy() {
                Ok(()) => tracing::debug!(image = %name, "destroyed"),
                Err(error) => {
                    tracing::warn!(image = %name, %error, "destroy failed");
                    failures.push(TeardownFailure {
                        image: name.clone(),
                        error,
                    });
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ContentError::Teardown(failures))
        }
    }

    /// Registered images, in registration order.
    pub fn images(&self) -> impl Iterator<Item = &Image> {
        self.order
            .iter()
            .filter_map(|name| self.repositories.get(name))
            .map(|repository| repository.image())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The repository serving `image`.
    pub fn repository(&self, image: &Image) -> ContentResult<&dyn ContentRepository> {
        self.repositories
            .get(&image.name)
            .map(|repository| repository.as_ref())
            .ok_or_else(|| ContentError::not_found(format!("image {}", image.name)))
    }

    // ========================================================================
    // Per-image operations
    // ========================================================================

    pub fn get_file_entry(&self, image: &Image, path: &str) -> ContentResult<FileEntry> {
        self.repository(image)?.file_entry(path)
    }

    pub fn get_size(&self, image: &Image, path: &str) -> ContentResult<u64> {
        self.repository(image)?.size(path)
    }

    /// Never fails: unknown images and paths are simply absent.
    pub fn exists(&self, image: &Image, path: &str) -> bool {
        self.repository(image)
            .map(|repository| repository.exists(path))
            .unwrap_or(false)
    }

    pub fn path_to_id(&self, image: &Image, path: &str) -> ContentResult<u64> {
        self.repository(image)?.path_to_id(path)
    }

    /// `Ok(None)` when the image is known but the id is not.
    pub fn id_to_path(&self, image: &Image, id: u64) -> ContentResult<Option<String>> {
        Ok(self.repository(image)?.id_to_path(id))
    }

    pub fn list_children(&self, image: &Image, prefix: &str) -> ContentResult<Vec<String>> {
        self.repository(image)?.list_children(prefix)
    }

    pub async fn read_range(
        &self,
        image: &Image,
        path: &str,
        offset: u64,
        len: usize,
    ) -> ContentResult<Vec<u8>> {
        self.repository(image)?.read_range(path, offset, len).await
    }
}
