//! Format repositories.
//!
//! Each implements [`ContentRepository`](super::ContentRepository) for one
//! [`ImageFormat`].

mod directory;
mod iso;

pub use directory::DirectoryRepository;
pub use iso::IsoRepository;

use pxefs_types::{Image, ImageFormat};

use super::ContentRepository;

/// Construct the repository for an image's declared format.
pub fn for_image(image: Image) -> Box<dyn ContentRepository> {
    match image.format {
        ImageFormat::Iso => Box::new(IsoRepository::new(image)),
        ImageFormat::Directory => Box::new(DirectoryRepository::new(image)),
    }
}
