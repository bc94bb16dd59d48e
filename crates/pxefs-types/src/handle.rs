//! Typed 64-bit handles.
//!
//! NFS file handles and inode numbers are flat integers, so the three kinds
//! of addressable object are packed into one `u64`. Internally everything
//! works with the [`Handle`] enum; the integer form only exists at protocol
//! boundaries via [`Handle::encode`] / [`Handle::decode`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved handle of the synthetic namespace root.
pub const ROOT_HANDLE: u64 = 1;

/// Low bits reserved for per-image ordinals.
pub const ORDINAL_MASK: u64 = 0x00FF_FFFF;

/// Exclusive upper bound for file ordinals.
pub const ORDINAL_LIMIT: u32 = 0x00FF_FFFF;

/// Invalid image id or ordinal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("image id {0:#x} has an empty namespace tag")]
    EmptyTag(u64),
    #[error("image id {0:#x} uses the reserved low 24 bits")]
    ReservedBits(u64),
    #[error("ordinal {0} is outside 1..{ORDINAL_LIMIT}")]
    OrdinalOutOfRange(u32),
}

/// An image's namespace tag.
///
/// Guaranteed non-zero in the upper 40 bits and zero in the low 24, so an
/// image id never collides with the id of a file inside it.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ImageId(u64);

impl ImageId {
    /// Validate a raw image id.
    pub fn new(raw: u64) -> Result<Self, HandleError> {
        if raw & ORDINAL_MASK != 0 {
            return Err(HandleError::ReservedBits(raw));
        }
        if raw == 0 {
            return Err(HandleError::EmptyTag(raw));
        }
        Ok(Self(raw))
    }

    /// The owning image of any raw handle, if its tag is non-empty.
    pub fn of(raw: u64) -> Option<Self> {
        Self::new(raw & !ORDINAL_MASK).ok()
    }

    /// The raw id value.
    pub fn get(self) -> u64 {
        self.0
    }

    /// Handle of the file with `ordinal` inside this image.
    pub fn file(self, ordinal: u32) -> Result<Handle, HandleError> {
        if ordinal == 0 || ordinal >= ORDINAL_LIMIT {
            return Err(HandleError::OrdinalOutOfRange(ordinal));
        }
        Ok(Handle::File {
            image: self,
            ordinal,
        })
    }
}

impl TryFrom<u64> for ImageId {
    type Error = HandleError;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<ImageId> for u64 {
    fn from(id: ImageId) -> u64 {
        id.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageId({:#x})", self.0)
    }
}

/// A decoded handle.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Handle {
    /// The synthetic namespace root.
    Root,
    /// The top directory of an image.
    Image(ImageId),
    /// An indexed path inside an image.
    File { image: ImageId, ordinal: u32 },
}

impl Handle {
    /// Flatten to the wire representation.
    pub fn encode(self) -> u64 {
        match self {
            Handle::Root => ROOT_HANDLE,
            Handle::Image(image) => image.get(),
            Handle::File { image, ordinal } => image.get() | u64::from(ordinal),
        }
    }

    /// Classify a wire handle.
    ///
    /// Returns `None` for values that cannot have been produced by
    /// [`Handle::encode`]: zero, an empty tag, or the reserved max ordinal.
    pub fn decode(raw: u64) -> Option<Self> {
        if raw == ROOT_HANDLE {
            return Some(Handle::Root);
        }
        let image = ImageId::of(raw)?;
        // Masked to 24 bits, always fits.
        let ordinal = (raw & ORDINAL_MASK) as u32;
        match ordinal {
            0 => Some(Handle::Image(image)),
            o if o < ORDINAL_LIMIT => Some(Handle::File { image, ordinal: o }),
            _ => None,
        }
    }

    /// The image this handle belongs to (`None` for the namespace root).
    pub fn image(&self) -> Option<ImageId> {
        match self {
            Handle::Root => None,
            Handle::Image(image) | Handle::File { image, .. } => Some(*image),
        }
    }
}

impl From<Handle> for u64 {
    fn from(handle: Handle) -> u64 {
        handle.encode()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.encode())
    }
}
