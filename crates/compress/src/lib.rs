//! Upload-time image compression for storefront assets.
//!
//! This crate provides:
//! - Size probing of stored uploads
//! - Per-class dimension caps (product, logo, avatar, ...)
//! - Output codec selection from the declared MIME type
//! - Fit-inside resizing that never upscales
//! - Adaptive quality search against a soft size target
//! - Temp-file staging with rename-based replacement
//! - Batch compression with per-item failure isolation and summary stats
//!
//! # Example
//! ```no_run
//! use std::path::Path;
//! use upload_compress::{Compressor, ImageClass};
//!
//! let compressor = Compressor::default();
//! let result = compressor.compress(Path::new("uploads/shoe.jpg"), ImageClass::Product, "image/jpeg")?;
//! println!("{:.1} KB -> {:.1} KB", result.original_size_kb, result.final_size_kb);
//! # Ok::<(), upload_compress::CompressError>(())
//! ```

#![warn(missing_docs)]

mod alpha;
pub mod batch;
mod codec;
mod config;
mod engine;
mod error;
pub mod probe;
pub mod replace;
pub mod resize;
pub mod search;
pub mod stats;

pub use batch::{BatchItem, BatchItemOutcome};
pub use codec::{sniff, Codec};
pub use config::{BatchConfig, CompressionConfig, DimensionCap, FormatQuality, ImageClass, FALLBACK_CAP};
pub use engine::{compression_ratio_pct, CompressionRequest, CompressionResult, Compressor};
pub use error::{CompressError, CompressErrorCode, Result};
pub use resize::{fit_within, Dimensions, ResizePlan};
pub use stats::BatchSummary;
