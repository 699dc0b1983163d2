//! Output codec selection and encoding.
//!
//! The codec is chosen from the caller's declared MIME type, never from the
//! file contents: `webp` → WebP, `png` → PNG, anything else → JPEG.

use crate::alpha::{flatten_alpha, has_alpha_channel, WHITE};
use crate::error::{CompressError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::{WebPEncoder, WebPQuality};
use image::{ColorType, DynamicImage, ImageEncoder, ImageResult};
use std::fmt;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Output encoders supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// JPEG, the fallback for unknown MIME types
    Jpeg,
    /// PNG (lossless; quality does not change the output)
    Png,
    /// Lossy WebP
    WebP,
}

impl Codec {
    /// Every supported codec.
    pub const ALL: [Codec; 3] = [Codec::Jpeg, Codec::Png, Codec::WebP];

    /// Select a codec from a declared MIME type.
    ///
    /// # Example
    /// ```
    /// use upload_compress::Codec;
    ///
    /// assert_eq!(Codec::from_mime("image/webp"), Codec::WebP);
    /// assert_eq!(Codec::from_mime("image/png"), Codec::Png);
    /// assert_eq!(Codec::from_mime(""), Codec::Jpeg);
    /// ```
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.contains("webp") {
            Codec::WebP
        } else if mime.contains("png") {
            Codec::Png
        } else {
            Codec::Jpeg
        }
    }

    /// Get the MIME type for this codec.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Codec::Jpeg => "image/jpeg",
            Codec::Png => "image/png",
            Codec::WebP => "image/webp",
        }
    }

    /// Get common file extensions for this codec.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Codec::Jpeg => &["jpg", "jpeg"],
            Codec::Png => &["png"],
            Codec::WebP => &["webp"],
        }
    }

    /// Encode `img` at `quality` into `writer`.
    pub fn encode<W: Write>(&self, img: &DynamicImage, quality: u8, writer: W) -> ImageResult<()> {
        let (width, height) = (img.width(), img.height());
        match self {
            Codec::Jpeg => {
                let rgb = flatten_alpha(img, WHITE);
                let mut encoder = JpegEncoder::new_with_quality(writer, quality);
                encoder.encode(rgb.as_raw(), width, height, ColorType::Rgb8)
            }
            Codec::Png => {
                let encoder = PngEncoder::new_with_quality(
                    writer,
                    CompressionType::Best,
                    PngFilter::Adaptive,
                );
                match img {
                    DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
                        let rgba = img.to_rgba8();
                        encoder.write_image(rgba.as_raw(), width, height, ColorType::Rgba8)
                    }
                    _ => encoder.write_image(img.as_bytes(), width, height, img.color()),
                }
            }
            Codec::WebP => {
                #[allow(deprecated)]
                let encoder = WebPEncoder::new_with_quality(writer, WebPQuality::lossy(quality));
                if has_alpha_channel(img) {
                    let rgba = img.to_rgba8();
                    encoder.encode(rgba.as_raw(), width, height, ColorType::Rgba8)
                } else {
                    let rgb = img.to_rgb8();
                    encoder.encode(rgb.as_raw(), width, height, ColorType::Rgb8)
                }
            }
        }
    }

    /// Encode `img` into an existing file at `path`, replacing its content,
    /// and fsync it.
    ///
    /// Never creates a file: `path` must have been claimed beforehand (see
    /// [`replace::reserve`](crate::replace::reserve)). The file is fully on
    /// disk when this returns `Ok`.
    pub fn write_file(&self, img: &DynamicImage, quality: u8, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| CompressError::storage(path, e))?;
        let mut writer = BufWriter::new(file);

        self.encode(img, quality, &mut writer)
            .map_err(|e| CompressError::encode(path, e))?;

        let file = writer
            .into_inner()
            .map_err(|e| CompressError::storage(path, e.into_error()))?;
        file.sync_all().map_err(|e| CompressError::storage(path, e))
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Codec::Jpeg => "jpeg",
            Codec::Png => "png",
            Codec::WebP => "webp",
        })
    }
}

/// Detect a supported codec from the leading bytes of a file.
///
/// Used by callers that have no declared MIME type. Returns `None` for
/// anything that is not JPEG, PNG or WebP.
///
/// # Example
/// ```
/// use upload_compress::{sniff, Codec};
///
/// let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
/// assert_eq!(sniff(&png), Some(Codec::Png));
/// ```
pub fn sniff(header: &[u8]) -> Option<Codec> {
    // JPEG: FF D8 FF
    if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(Codec::Jpeg);
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if header.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(Codec::Png);
    }

    // WebP: RIFF....WEBP
    if header.len() >= 12 && header.starts_with(b"RIFF") && &header[8..12] == b"WEBP" {
        return Some(Codec::WebP);
    }

    None
}
