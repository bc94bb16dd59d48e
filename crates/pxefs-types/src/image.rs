//! Image catalog records.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::handle::{Handle, ImageId};

/// Source format of an image.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageFormat {
    /// An ISO9660 image file.
    #[serde(alias = "LOCAL_ISO")]
    Iso,
    /// A plain directory tree.
    #[serde(alias = "LOCAL_DIR")]
    Directory,
}

/// One registered boot-content source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub format: ImageFormat,
    /// Path to the `.iso` file or the directory.
    pub location: PathBuf,
    /// Mounted transparently at the namespace root.
    #[serde(default, rename = "root", alias = "isRoot")]
    pub is_root: bool,
}

impl Image {
    /// Create a non-root image with an empty description.
    pub fn new(
        id: ImageId,
        name: impl Into<String>,
        format: ImageFormat,
        location: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            format,
            location: location.into(),
            is_root: false,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark as the root image.
    pub fn as_root(mut self) -> Self {
        self.is_root = true;
        self
    }

    /// Handle of the image's top directory.
    pub fn handle(&self) -> Handle {
        Handle::Image(self.id)
    }
}
