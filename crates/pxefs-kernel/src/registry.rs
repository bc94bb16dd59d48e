//! Image registry: the validated, immutable catalog.

use std::collections::HashMap;

use thiserror::Error;

use pxefs_types::{Image, ImageId, ORDINAL_MASK};

use crate::vfs::ContentError;

/// Catalog validation failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("image {name}: id {id:#x} must be non-zero with the low 24 bits clear")]
    InvalidId { name: String, id: u64 },

    #[error("image name {0:?} must be non-empty and contain no '/'")]
    InvalidName(String),

    #[error("image id {id:#x} is used by both {first} and {second}")]
    DuplicateId { id: u64, first: String, second: String },

    #[error("image name {0} is used twice")]
    DuplicateName(String),

    #[error("both {first} and {second} are marked root")]
    MultipleRoots { first: String, second: String },
}

impl From<RegistryError> for ContentError {
    fn from(e: RegistryError) -> Self {
        ContentError::Configuration(e.to_string())
    }
}

/// All registered images, in catalog order.
#[derive(Debug, Clone, Default)]
pub struct ImageRegistry {
    images: Vec<Image>,
    by_id: HashMap<ImageId, usize>,
    by_name: HashMap<String, usize>,
    root: Option<usize>,
}

impl ImageRegistry {
    /// Validate a catalog.
    pub fn new(images: Vec<Image>) -> Result<Self, RegistryError> {
        let mut by_id: HashMap<ImageId, usize> = HashMap::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut root: Option<usize> = None;

        for (i, image) in images.iter().enumerate() {
            let raw = image.id.get();
            if raw == 0 || raw & ORDINAL_MASK != 0 {
                return Err(RegistryError::InvalidId {
                    name: image.name.clone(),
                    id: raw,
                });
            }
            if image.name.trim().is_empty() || image.name.contains('/') {
                return Err(RegistryError::InvalidName(image.name.clone()));
            }
            if let Some(&first) = by_id.get(&image.id) {
                return Err(RegistryError::DuplicateId {
                    id: raw,
                    first: images[first].name.clone(),
                    second: image.name.clone(),
                });
            }
            if by_name.contains_key(&image.name) {
                return Err(RegistryError::DuplicateName(image.name.clone()));
            }
            if image.is_root {
                if let Some(first) = root {
                    return Err(RegistryError::MultipleRoots {
                        first: images[first].name.clone(),
                        second: image.name.clone(),
                    });
                }
                root = Some(i);
            }
            by_id.insert(image.id, i);
            by_name.insert(image.name.clone(), i);
        }

        Ok(Self {
            images,
            by_id,
            by_name,
            root,
        })
    }

    pub fn get(&self, id: ImageId) -> Option<&Image> {
        self.by_id.get(&id).map(|&i| &self.images[i])
    }

    pub fn by_name(&self, name: &str) -> Option<&Image> {
        self.by_name.get(name).map(|&i| &self.images[i])
    }

    /// The image mounted transparently at the namespace root.
    pub fn root(&self) -> Option<&Image> {
        self.root.map(|i| &self.images[i])
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
