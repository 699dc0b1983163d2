//! Batch compression with per-item failure isolation.
//!
//! Every input yields exactly one [`BatchItemOutcome`], in input order. With
//! the `parallel` feature and `batch.workers > 1`, items run on a bounded
//! rayon pool; items that touch the same file never run at the same time.

use crate::config::ImageClass;
use crate::engine::{CompressionRequest, CompressionResult, Compressor};
use crate::error::CompressErrorCode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

#[cfg(feature = "parallel")]
use crate::replace::temp_path_for;
#[cfg(feature = "parallel")]
use std::path::Path;

/// Input item for batch compression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    /// Caller-supplied identifier, e.g. the original filename
    pub identifier: String,
    /// The upload to compress
    pub request: CompressionRequest,
}

impl BatchItem {
    /// Create a new batch item.
    pub fn new(
        identifier: impl Into<String>,
        source_path: impl Into<PathBuf>,
        image_class: ImageClass,
        declared_mime_type: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            request: CompressionRequest::new(source_path, image_class, declared_mime_type),
        }
    }
}

/// Result of one batch item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchItemOutcome {
    /// The item compressed (or was already within budget)
    Success {
        /// Item identifier
        identifier: String,
        /// Compression result
        result: CompressionResult,
    },
    /// The item failed; the rest of the batch was unaffected
    Failure {
        /// Item identifier
        identifier: String,
        /// Rendered error
        error: String,
        /// Error code
        code: CompressErrorCode,
    },
}

impl BatchItemOutcome {
    /// Identifier of the item this outcome belongs to.
    pub fn identifier(&self) -> &str {
        match self {
            BatchItemOutcome::Success { identifier, .. }
            | BatchItemOutcome::Failure { identifier, .. } => identifier,
        }
    }

    /// Whether the item succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, BatchItemOutcome::Success { .. })
    }

    /// The compression result, if the item succeeded.
    pub fn result(&self) -> Option<&CompressionResult> {
        match self {
            BatchItemOutcome::Success { result, .. } => Some(result),
            BatchItemOutcome::Failure { .. } => None,
        }
    }
}

impl Compressor {
    /// Compress every item, isolating failures.
    ///
    /// Returns one outcome per input, in input order.
    pub fn compress_batch(&self, items: Vec<BatchItem>) -> Vec<BatchItemOutcome> {
        let workers = self.config().batch.workers;
        info!(items = items.len(), workers, "starting batch");

        #[cfg(feature = "parallel")]
        if workers > 1 && items.len() > 1 {
            return self.compress_parallel(&items, workers);
        }

        items.iter().map(|item| self.compress_item(item)).collect()
    }

    fn compress_item(&self, item: &BatchItem) -> BatchItemOutcome {
        match self.compress_request(&item.request) {
            Ok(result) => BatchItemOutcome::Success {
                identifier: item.identifier.clone(),
                result,
            },
            Err(e) => {
                warn!(identifier = %item.identifier, error = %e, "batch item failed");
                BatchItemOutcome::Failure {
                    identifier: item.identifier.clone(),
                    code: e.code(),
                    error: e.to_string(),
                }
            }
        }
    }

    #[cfg(feature = "parallel")]
    fn compress_parallel(&self, items: &[BatchItem], workers: usize) -> Vec<BatchItemOutcome> {
        use rayon::prelude::*;

        let pool = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool,
            Err(e) => {
                warn!(error = %e, "failed to build worker pool, running sequentially");
                return items.iter().map(|item| self.compress_item(item)).collect();
            }
        };

        let mut outcomes: Vec<Option<BatchItemOutcome>> = vec![None; items.len()];
        for wave in path_waves(items) {
            let done: Vec<(usize, BatchItemOutcome)> = pool.install(|| {
                wave.par_iter()
                    .map(|&index| (index, self.compress_item(&items[index])))
                    .collect()
            });
            for (index, outcome) in done {
                outcomes[index] = Some(outcome);
            }
        }

        outcomes.into_iter().flatten().collect()
    }
}

/// Group item indices into waves in which no two items touch the same file.
///
/// An item touches its source path and the preferred temp sibling of that
/// path, so `photo.png` and `photo_compressed.png` never share a wave. Each
/// item lands in the first wave after every earlier item it conflicts with.
#[cfg(feature = "parallel")]
fn path_waves(items: &[BatchItem]) -> Vec<Vec<usize>> {
    use std::collections::HashMap;

    let mut next_free: HashMap<PathBuf, usize> = HashMap::new();
    let mut waves: Vec<Vec<usize>> = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let source = &item.request.source_path;
        let keys = [conflict_key(source), conflict_key(&temp_path_for(source))];

        let wave = keys
            .iter()
            .filter_map(|key| next_free.get(key))
            .copied()
            .max()
            .unwrap_or(0);
        for key in keys {
            next_free.insert(key, wave + 1);
        }

        if waves.len() <= wave {
            waves.resize_with(wave + 1, Vec::new);
        }
        waves[wave].push(index);
    }

    waves
}

/// Canonical form of a path that may not exist yet.
#[cfg(feature = "parallel")]
fn conflict_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|dir| dir.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressionConfig;
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_gradient(path: &std::path::Path, width: u32, height: u32) {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
        }))
        .save(path)
        .unwrap();
    }

    fn small_target() -> Compressor {
        Compressor::new(CompressionConfig {
            target_size_bytes: 2 * 1024,
            ..CompressionConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_failure_does_not_abort_batch() {
        let temp = TempDir::new().unwrap();
        let mut items = Vec::new();
        for i in 0..5 {
            let path = temp.path().join(format!("item-{}.png", i));
            if i == 2 {
                std::fs::write(&path, vec![0u8; 16 * 1024]).unwrap();
            } else {
                write_gradient(&path, 256, 256);
            }
            items.push(BatchItem::new(format!("item-{}.png", i), path, ImageClass::Product, "image/png"));
        }

        let outcomes = small_target().compress_batch(items);

        assert_eq!(outcomes.len(), 5);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.identifier(), format!("item-{}.png", i));
            assert_eq!(outcome.is_success(), i != 2);
        }
        assert!(matches!(
            &outcomes[2],
            BatchItemOutcome::Failure { code: CompressErrorCode::Decode, .. }
        ));
    }

    #[test]
    fn test_missing_file_becomes_failure() {
        let outcomes = Compressor::default().compress_batch(vec![BatchItem::new(
            "ghost.jpg",
            "/nonexistent/ghost.jpg",
            ImageClass::Logo,
            "image/jpeg",
        )]);

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result().is_none());
        assert!(matches!(
            &outcomes[0],
            BatchItemOutcome::Failure { code: CompressErrorCode::Storage, .. }
        ));
    }

    #[test]
    fn test_empty_batch() {
        assert!(Compressor::default().compress_batch(Vec::new()).is_empty());
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = BatchItemOutcome::Failure {
            identifier: "a.jpg".into(),
            error: "boom".into(),
            code: CompressErrorCode::Encode,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["identifier"], "a.jpg");
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_path_waves_separate_duplicates() {
        let items = vec![
            BatchItem::new("a", "/uploads/a.jpg", ImageClass::Product, "image/jpeg"),
            BatchItem::new("b", "/uploads/b.jpg", ImageClass::Product, "image/jpeg"),
            BatchItem::new("a-again", "/uploads/a.jpg", ImageClass::Product, "image/jpeg"),
            BatchItem::new("c", "/uploads/c.jpg", ImageClass::Product, "image/jpeg"),
            BatchItem::new("a-third", "/uploads/a.jpg", ImageClass::Product, "image/jpeg"),
        ];

        assert_eq!(path_waves(&items), vec![vec![0, 1, 3], vec![2], vec![4]]);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_path_waves_separate_source_from_temp_sibling() {
        let items = vec![
            BatchItem::new("photo", "/uploads/photo.png", ImageClass::Product, "image/png"),
            BatchItem::new("sibling", "/uploads/photo_compressed.png", ImageClass::Product, "image/png"),
            BatchItem::new("other", "/uploads/other.png", ImageClass::Product, "image/png"),
        ];

        assert_eq!(path_waves(&items), vec![vec![0, 2], vec![1]]);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_batch_keeps_sibling_upload() {
        let temp = TempDir::new().unwrap();
        let photo = temp.path().join("photo.png");
        let sibling = temp.path().join("photo_compressed.png");
        write_gradient(&photo, 200, 150);
        write_gradient(&sibling, 120, 90);

        let compressor = Compressor::new(CompressionConfig {
            target_size_bytes: 1024,
            batch: crate::config::BatchConfig { workers: 2 },
            ..CompressionConfig::default()
        })
        .unwrap();
        let outcomes = compressor.compress_batch(vec![
            BatchItem::new("photo.png", &photo, ImageClass::Product, "image/jpeg"),
            BatchItem::new("photo_compressed.png", &sibling, ImageClass::Product, "image/jpeg"),
        ]);

        assert!(outcomes.iter().all(|o| o.is_success()));
        let photo_img = image::open(&photo).unwrap();
        let sibling_img = image::open(&sibling).unwrap();
        assert_eq!((photo_img.width(), photo_img.height()), (200, 150));
        assert_eq!((sibling_img.width(), sibling_img.height()), (120, 90));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_batch_preserves_order() {
        let temp = TempDir::new().unwrap();
        let items: Vec<BatchItem> = (0..6)
            .map(|i| {
                let path = temp.path().join(format!("p{}.png", i));
                write_gradient(&path, 128 + i * 16, 128);
                BatchItem::new(format!("p{}", i), path, ImageClass::Category, "image/webp")
            })
            .collect();

        let compressor = Compressor::new(CompressionConfig {
            target_size_bytes: 1024,
            batch: crate::config::BatchConfig { workers: 3 },
            ..CompressionConfig::default()
        })
        .unwrap();
        let outcomes = compressor.compress_batch(items);

        let identifiers: Vec<&str> = outcomes.iter().map(|o| o.identifier()).collect();
        assert_eq!(identifiers, vec!["p0", "p1", "p2", "p3", "p4", "p5"]);
        assert!(outcomes.iter().all(|o| o.is_success()));
    }
}
