//! Error types for the compress crate.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for compression operations.
pub type Result<T> = std::result::Result<T, CompressError>;

/// Errors that can occur while compressing an upload.
///
/// A file that is already under budget is not an error; see
/// [`CompressionResult::unchanged`](crate::CompressionResult::unchanged).
#[derive(Debug, Error)]
pub enum CompressError {
    /// Stat, read, write, rename or unlink failure
    #[error("Storage error on {}: {source}", path.display())]
    Storage {
        /// Path the operation was applied to
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Source file is not a decodable image
    #[error("Cannot decode {}: {source}", path.display())]
    Decode {
        /// Source image path
        path: PathBuf,
        /// Decoder error
        #[source]
        source: image::ImageError,
    },

    /// Codec failure while writing an encoded image
    #[error("Cannot encode {}: {source}", path.display())]
    Encode {
        /// Temp path being written
        path: PathBuf,
        /// Encoder error
        #[source]
        source: image::ImageError,
    },

    /// Invalid or unparsable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error code for integration with upload handlers that persist failure reasons.
/// Range: 12xxx for compression errors.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CompressErrorCode {
    /// Storage failure
    Storage = 12001,
    /// Decode failure
    Decode = 12002,
    /// Encode failure
    Encode = 12003,
    /// Configuration failure
    Config = 12004,
}

impl CompressError {
    /// Returns the error code for this error.
    pub fn code(&self) -> CompressErrorCode {
        match self {
            CompressError::Storage { .. } => CompressErrorCode::Storage,
            CompressError::Decode { .. } => CompressErrorCode::Decode,
            CompressError::Encode { .. } => CompressErrorCode::Encode,
            CompressError::Config(_) => CompressErrorCode::Config,
        }
    }

    pub(crate) fn storage(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        CompressError::Storage {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn decode(path: impl AsRef<Path>, source: image::ImageError) -> Self {
        CompressError::Decode {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn encode(path: impl AsRef<Path>, source: image::ImageError) -> Self {
        CompressError::Encode {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = CompressError::storage(
            "/uploads/a.jpg",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(err.code(), CompressErrorCode::Storage);
        assert_eq!(err.code() as u32, 12001);
        assert_eq!(CompressError::Config("bad".into()).code() as u32, 12004);
    }

    #[test]
    fn test_storage_message_names_path() {
        let err = CompressError::storage(
            "/uploads/a.jpg",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("/uploads/a.jpg"));
        assert!(message.contains("denied"));
    }
}
