//! Shared data model for pxefs.
//!
//! This crate is the leaf of the workspace: image catalog records, indexed
//! file entries, and the 64-bit handle space that both the NFS binding and
//! the TFTP engine address content with. It performs no I/O.
//!
//! # Handle Space
//!
//! ```text
//! 0x0000000000000001                  namespace root
//! 0x0000_00AB_CD00_0000               image root   (tag | 0)
//! 0x0000_00AB_CD00_002A               file         (tag | ordinal)
//!   \_______ tag _______/\ ordinal /
//!        upper 40 bits     low 24 bits
//! ```
//!
//! |---------------|------------------------------------------------|
//! | Type          | Purpose                                        |
//! |---------------|------------------------------------------------|
//! | [`Image`]     | One catalog record (ISO file or directory)     |
//! | [`ImageId`]   | Validated namespace tag of an image            |
//! | [`Handle`]    | Tagged root / image-root / file handle         |
//! | [`FileEntry`] | Metadata of one indexed path inside an image   |
//! |---------------|------------------------------------------------|

pub mod entry;
pub mod handle;
pub mod image;

pub use entry::FileEntry;
pub use handle::{Handle, HandleError, ImageId, ORDINAL_LIMIT, ORDINAL_MASK, ROOT_HANDLE};
pub use image::{Image, ImageFormat};
