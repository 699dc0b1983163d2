//! File size measurement.

use crate::error::{CompressError, Result};
use std::path::Path;

/// Bytes per kilobyte.
pub const KB: f64 = 1024.0;

/// Size of a file on disk in bytes.
pub fn size_bytes(path: &Path) -> Result<u64> {
    std::fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(|e| CompressError::storage(path, e))
}

/// Size of a file on disk in kilobytes (fractional).
pub fn size_kb(path: &Path) -> Result<f64> {
    size_bytes(path).map(|bytes| bytes as f64 / KB)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_size_kb_fractional() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("half.bin");
        std::fs::write(&path, vec![0u8; 1536]).unwrap();

        assert_eq!(size_bytes(&path).unwrap(), 1536);
        assert_eq!(size_kb(&path).unwrap(), 1.5);
    }

    #[test]
    fn test_missing_file_is_storage_error() {
        let err = size_kb(Path::new("/nonexistent/upload.jpg")).unwrap_err();
        assert!(matches!(err, CompressError::Storage { .. }));
    }
}
