//! Content error types.

use std::fmt;
use std::io;
use thiserror::Error;

/// One failed resource release during shutdown.
#[derive(Debug)]
pub struct TeardownFailure {
    /// Image whose repository failed to close.
    pub image: String,
    pub error: ContentError,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.image, self.error)
    }
}

/// Content layer error type.
#[derive(Debug, Error)]
pub enum ContentError {
    /// Invalid catalog or unreadable image source. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unknown path, handle or image.
    #[error("not found: {0}")]
    NotFound(String),

    /// Mutating operation on the read-only namespace.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// Underlying read error from an image source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// One or more repositories failed to release their resources.
    #[error("{} repositories failed to close: {}", .0.len(), join_failures(.0))]
    Teardown(Vec<TeardownFailure>),
}

fn join_failures(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ContentError {
    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(op: impl Into<String>) -> Self {
        Self::Unsupported(op.into())
    }

    /// Create an Io error for reading a directory as a file.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::Io(io::Error::new(io::ErrorKind::IsADirectory, path.into()))
    }

    /// Returns true for NotFound.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContentError::NotFound(_))
    }
}

/// Convert ContentError to std::io::Error for compatibility.
impl From<ContentError> for io::Error {
    fn from(e: ContentError) -> Self {
        match e {
            ContentError::Configuration(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            ContentError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            ContentError::Unsupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            ContentError::Io(e) => e,
            e @ ContentError::Teardown(_) => io::Error::other(e.to_string()),
        }
    }
}

/// Content result type.
pub type ContentResult<T> = Result<T, ContentError>;
