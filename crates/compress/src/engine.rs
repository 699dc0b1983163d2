//! Single-image compression pipeline.

use crate::codec::Codec;
use crate::config::{CompressionConfig, ImageClass};
use crate::error::{CompressError, Result};
use crate::probe;
use crate::replace;
use crate::resize::{self, Dimensions};
use crate::search::{self, SearchParams};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

/// One upload to compress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionRequest {
    /// File on durable storage; replaced in place on success
    pub source_path: PathBuf,
    /// Use case selecting the dimension cap
    pub image_class: ImageClass,
    /// MIME type declared by the uploader; selects the output codec
    pub declared_mime_type: String,
}

impl CompressionRequest {
    /// Create a new request.
    pub fn new(
        source_path: impl Into<PathBuf>,
        image_class: ImageClass,
        declared_mime_type: impl Into<String>,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            image_class,
            declared_mime_type: declared_mime_type.into(),
        }
    }
}

/// Outcome of a successful compression call.
///
/// `final_size_kb <= original_size_kb` always holds; when `was_compressed` is
/// false the file was left untouched and `attempts` is 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionResult {
    /// Whether the original was replaced by a re-encoded file
    pub was_compressed: bool,
    /// Size before compression, in KB
    pub original_size_kb: f64,
    /// Size after compression, in KB
    pub final_size_kb: f64,
    /// Size reduction relative to the original, in percent
    pub compression_ratio_pct: f64,
    /// Wall time of the call
    pub processing_time_ms: u64,
    /// Encodes performed
    pub attempts: u32,
    /// Quality of the accepted encode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_quality: Option<u8>,
    /// Codec of the accepted encode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<Codec>,
    /// Decoded dimensions of the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_dimensions: Option<Dimensions>,
    /// Dimensions written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_dimensions: Option<Dimensions>,
}

impl CompressionResult {
    /// Result for a file that was left as is.
    pub fn unchanged(size_kb: f64, processing_time_ms: u64) -> Self {
        Self {
            was_compressed: false,
            original_size_kb: size_kb,
            final_size_kb: size_kb,
            compression_ratio_pct: 0.0,
            processing_time_ms,
            attempts: 0,
            final_quality: None,
            codec: None,
            original_dimensions: None,
            final_dimensions: None,
        }
    }

    /// Kilobytes saved.
    pub fn saved_kb(&self) -> f64 {
        self.original_size_kb - self.final_size_kb
    }
}

/// Size reduction in percent, rounded to two decimals.
pub fn compression_ratio_pct(original_kb: f64, final_kb: f64) -> f64 {
    if original_kb <= 0.0 {
        return 0.0;
    }
    ((1.0 - final_kb / original_kb) * 100.0 * 100.0).round() / 100.0
}

/// Compression engine holding an immutable configuration.
///
/// Cheap to clone; clones share the configuration.
#[derive(Debug, Clone)]
pub struct Compressor {
    config: Arc<CompressionConfig>,
}

impl Compressor {
    /// Create an engine after validating `config`.
    pub fn new(config: CompressionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Compress one upload in place.
    pub fn compress(
        &self,
        source_path: &Path,
        image_class: ImageClass,
        declared_mime_type: &str,
    ) -> Result<CompressionResult> {
        let _span = info_span!(
            "compress",
            path = %source_path.display(),
            class = %image_class,
        )
        .entered();
        let started = Instant::now();

        let original_size_kb = probe::size_kb(source_path)?;
        let codec = Codec::from_mime(declared_mime_type);
        let params = SearchParams::from_config(&self.config, codec);

        if !params.needs_compression(original_size_kb) {
            debug!(original_size_kb, target_kb = params.target_kb, "already within budget");
            return Ok(CompressionResult::unchanged(original_size_kb, elapsed_ms(started)));
        }

        let img = decode(source_path)?;
        let original_dimensions = Dimensions::of(&img);
        let cap = self.config.dimension_cap(image_class);
        let plan = resize::fit_within(original_dimensions, cap);
        debug!(?original_dimensions, ?cap, ?plan, "resize plan");
        let resized = resize::apply(img, plan);
        let final_dimensions = Dimensions::of(&resized);

        let temp = replace::reserve(source_path)?;
        let outcome = search::run(&params, |quality| encode_and_measure(codec, &resized, quality, &temp));
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                replace::discard(&temp);
                return Err(e);
            }
        };

        if outcome.final_size_kb > original_size_kb {
            warn!(
                original_size_kb,
                final_size_kb = outcome.final_size_kb,
                attempts = outcome.attempts,
                "re-encode is larger than the original, keeping original"
            );
            info!(
                %codec,
                original_size_kb,
                discarded_size_kb = outcome.final_size_kb,
                attempts = outcome.attempts,
                quality = outcome.final_quality,
                "image left unchanged"
            );
            replace::discard(&temp);
            return Ok(CompressionResult::unchanged(original_size_kb, elapsed_ms(started)));
        }

        replace::commit(&temp, source_path)?;

        let result = CompressionResult {
            was_compressed: true,
            original_size_kb,
            final_size_kb: outcome.final_size_kb,
            compression_ratio_pct: compression_ratio_pct(original_size_kb, outcome.final_size_kb),
            processing_time_ms: elapsed_ms(started),
            attempts: outcome.attempts,
            final_quality: Some(outcome.final_quality),
            codec: Some(codec),
            original_dimensions: Some(original_dimensions),
            final_dimensions: Some(final_dimensions),
        };

        if !outcome.target_met {
            warn!(
                final_size_kb = result.final_size_kb,
                target_kb = params.target_kb,
                "target size not reached, keeping best effort"
            );
        }
        info!(
            %codec,
            original_size_kb = result.original_size_kb,
            final_size_kb = result.final_size_kb,
            ratio_pct = result.compression_ratio_pct,
            attempts = result.attempts,
            quality = outcome.final_quality,
            elapsed_ms = result.processing_time_ms,
            "image compressed"
        );

        Ok(result)
    }

    /// Compress the upload described by `request`.
    pub fn compress_request(&self, request: &CompressionRequest) -> Result<CompressionResult> {
        self.compress(
            &request.source_path,
            request.image_class,
            &request.declared_mime_type,
        )
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self {
            config: Arc::new(CompressionConfig::default()),
        }
    }
}

fn decode(path: &Path) -> Result<DynamicImage> {
    image::io::Reader::open(path)
        .map_err(|e| CompressError::storage(path, e))?
        .with_guessed_format()
        .map_err(|e| CompressError::storage(path, e))?
        .decode()
        .map_err(|e| CompressError::decode(path, e))
}

fn encode_and_measure(codec: Codec, img: &DynamicImage, quality: u8, temp: &Path) -> Result<f64> {
    codec.write_file(img, quality, temp)?;
    probe::size_kb(temp)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
