//! Compression configuration and the per-class dimension policy.
//!
//! A [`CompressionConfig`] is built once (defaults, or TOML via
//! [`CompressionConfig::load`]) and then shared read-only by every
//! compression call.

use crate::codec::Codec;
use crate::error::{CompressError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Bounding box used when neither the class nor the default class has an entry.
pub const FALLBACK_CAP: DimensionCap = DimensionCap {
    width: 1920,
    height: 1920,
};

/// Use case of an upload. Selects the dimension cap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageClass {
    /// Product photo (the default class)
    #[default]
    Product,
    /// User or store logo
    Logo,
    /// Business profile logo
    BusinessLogo,
    /// Announcement artwork
    Announcement,
    /// Category tile
    Category,
    /// Profile avatar
    Avatar,
    /// Business profile banner
    BusinessBanner,
    /// Storefront welcome background
    WelcomeBackground,
}

impl ImageClass {
    /// Every known class, in table order.
    pub const ALL: [ImageClass; 8] = [
        ImageClass::Product,
        ImageClass::Logo,
        ImageClass::BusinessLogo,
        ImageClass::Announcement,
        ImageClass::Category,
        ImageClass::Avatar,
        ImageClass::BusinessBanner,
        ImageClass::WelcomeBackground,
    ];

    /// Key used in the dimension table.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageClass::Product => "product",
            ImageClass::Logo => "logo",
            ImageClass::BusinessLogo => "business_logo",
            ImageClass::Announcement => "announcement",
            ImageClass::Category => "category",
            ImageClass::Avatar => "avatar",
            ImageClass::BusinessBanner => "business_banner",
            ImageClass::WelcomeBackground => "welcome_background",
        }
    }

    /// Resolve a caller-supplied tag. Unrecognized tags resolve to `Product`.
    ///
    /// # Example
    /// ```
    /// use upload_compress::ImageClass;
    ///
    /// assert_eq!(ImageClass::from_tag("business-banner"), ImageClass::BusinessBanner);
    /// assert_eq!(ImageClass::from_tag("poster"), ImageClass::Product);
    /// ```
    pub fn from_tag(tag: &str) -> Self {
        let normalized = tag.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|class| class.as_str() == normalized)
            .unwrap_or(ImageClass::Product)
    }
}

impl fmt::Display for ImageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ImageClass {
    fn from(tag: &str) -> Self {
        ImageClass::from_tag(tag)
    }
}

/// Maximum width/height bounding box. Written as `[width, height]` in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct DimensionCap {
    /// Maximum width in pixels
    pub width: u32,
    /// Maximum height in pixels
    pub height: u32,
}

impl DimensionCap {
    /// Create a new bounding box.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for DimensionCap {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl From<DimensionCap> for (u32, u32) {
    fn from(cap: DimensionCap) -> Self {
        (cap.width, cap.height)
    }
}

/// Starting quality per output codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatQuality {
    /// JPEG starting quality
    #[serde(default = "default_jpeg_quality")]
    pub jpeg: u8,
    /// PNG starting quality
    #[serde(default = "default_png_quality")]
    pub png: u8,
    /// WebP starting quality
    #[serde(default = "default_webp_quality")]
    pub webp: u8,
}

impl FormatQuality {
    /// Starting quality for a codec.
    pub fn for_codec(&self, codec: Codec) -> u8 {
        match codec {
            Codec::Jpeg => self.jpeg,
            Codec::Png => self.png,
            Codec::WebP => self.webp,
        }
    }
}

impl Default for FormatQuality {
    fn default() -> Self {
        Self {
            jpeg: default_jpeg_quality(),
            png: default_png_quality(),
            webp: default_webp_quality(),
        }
    }
}

/// Batch execution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Concurrent workers. 1 runs the batch sequentially.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// Engine configuration. Immutable once handed to a [`Compressor`](crate::Compressor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Soft upper bound for the output size, in bytes
    #[serde(default = "default_target_size_bytes")]
    pub target_size_bytes: u64,

    /// Lowest quality the search may use
    #[serde(default = "default_quality_floor")]
    pub quality_floor: u8,

    /// Quality decrement between attempts
    #[serde(default = "default_quality_step")]
    pub quality_step: u8,

    /// Retries after the initial encode
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Dimension table entry used for unknown classes
    #[serde(default = "default_class")]
    pub default_class: String,

    /// Starting quality per codec
    #[serde(default)]
    pub quality: FormatQuality,

    /// Bounding box per class name. Entries given in TOML override the built-in table.
    #[serde(default = "default_dimensions", deserialize_with = "merge_dimensions")]
    pub dimensions: BTreeMap<String, DimensionCap>,

    /// Batch execution settings
    #[serde(default)]
    pub batch: BatchConfig,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            target_size_bytes: default_target_size_bytes(),
            quality_floor: default_quality_floor(),
            quality_step: default_quality_step(),
            max_retry_attempts: default_max_retry_attempts(),
            default_class: default_class(),
            quality: FormatQuality::default(),
            dimensions: default_dimensions(),
            batch: BatchConfig::default(),
        }
    }
}

impl CompressionConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CompressError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CompressError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CompressError::Config(format!("Failed to render config: {}", e)))
    }

    /// Check value ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.target_size_bytes == 0 {
            return Err(CompressError::Config("target_size_bytes must be positive".into()));
        }
        if self.quality_step == 0 {
            return Err(CompressError::Config("quality_step must be positive".into()));
        }
        if !(1..=100).contains(&self.quality_floor) {
            return Err(CompressError::Config(format!(
                "quality_floor must be within 1..=100, got {}",
                self.quality_floor
            )));
        }
        for codec in Codec::ALL {
            let quality = self.quality.for_codec(codec);
            if !(1..=100).contains(&quality) {
                return Err(CompressError::Config(format!(
                    "{} quality must be within 1..=100, got {}",
                    codec, quality
                )));
            }
            if quality < self.quality_floor {
                return Err(CompressError::Config(format!(
                    "{} quality {} is below quality_floor {}",
                    codec, quality, self.quality_floor
                )));
            }
        }
        if let Some((name, _)) = self
            .dimensions
            .iter()
            .find(|(_, cap)| cap.width == 0 || cap.height == 0)
        {
            return Err(CompressError::Config(format!(
                "dimension cap for '{}' must be non-zero",
                name
            )));
        }
        if self.batch.workers == 0 {
            return Err(CompressError::Config("batch.workers must be at least 1".into()));
        }
        Ok(())
    }

    /// Target size in kilobytes.
    pub fn target_size_kb(&self) -> f64 {
        self.target_size_bytes as f64 / 1024.0
    }

    /// Bounding box for a class; unknown entries fall back to the default class.
    pub fn dimension_cap(&self, class: ImageClass) -> DimensionCap {
        self.dimensions
            .get(class.as_str())
            .or_else(|| self.dimensions.get(&self.default_class))
            .copied()
            .unwrap_or(FALLBACK_CAP)
    }

    /// Starting quality for a codec.
    pub fn starting_quality(&self, codec: Codec) -> u8 {
        self.quality.for_codec(codec)
    }
}

fn default_target_size_bytes() -> u64 {
    600 * 1024
}

fn default_quality_floor() -> u8 {
    60
}

fn default_quality_step() -> u8 {
    10
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_class() -> String {
    ImageClass::Product.as_str().to_string()
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_png_quality() -> u8 {
    90
}

fn default_webp_quality() -> u8 {
    85
}

fn default_workers() -> usize {
    1
}

fn default_dimensions() -> BTreeMap<String, DimensionCap> {
    [
        (ImageClass::Product, DimensionCap::new(1920, 1920)),
        (ImageClass::Logo, DimensionCap::new(512, 512)),
        (ImageClass::BusinessLogo, DimensionCap::new(512, 512)),
        (ImageClass::Announcement, DimensionCap::new(1920, 1080)),
        (ImageClass::Category, DimensionCap::new(800, 800)),
        (ImageClass::Avatar, DimensionCap::new(400, 400)),
        (ImageClass::BusinessBanner, DimensionCap::new(1920, 600)),
        (ImageClass::WelcomeBackground, DimensionCap::new(1920, 1080)),
    ]
    .into_iter()
    .map(|(class, cap)| (class.as_str().to_string(), cap))
    .collect()
}

fn merge_dimensions<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, DimensionCap>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<String, DimensionCap>::deserialize(deserializer)?;
    let mut table = default_dimensions();
    table.extend(overrides);
    Ok(table)
}
