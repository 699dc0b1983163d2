//! Fit-inside resizing with the image crate.

use crate::config::DimensionCap;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of a decoded image.
    pub fn of(img: &DynamicImage) -> Self {
        Self::new(img.width(), img.height())
    }
}

/// Outcome of fitting an image into a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    /// Image already fits; skip resampling
    Keep,
    /// Resample to these dimensions
    Scale(Dimensions),
}

impl ResizePlan {
    /// Dimensions after applying the plan to `original`.
    pub fn target(&self, original: Dimensions) -> Dimensions {
        match self {
            ResizePlan::Keep => original,
            ResizePlan::Scale(target) => *target,
        }
    }
}

/// Compute dimensions that fit inside `cap`, preserving aspect ratio.
///
/// Never upscales: an image that already fits yields [`ResizePlan::Keep`].
///
/// # Example
/// ```
/// use upload_compress::{fit_within, DimensionCap, Dimensions, ResizePlan};
///
/// let plan = fit_within(Dimensions::new(3000, 2000), DimensionCap::new(1920, 1920));
/// assert_eq!(plan, ResizePlan::Scale(Dimensions::new(1920, 1280)));
///
/// let plan = fit_within(Dimensions::new(800, 600), DimensionCap::new(1920, 1920));
/// assert_eq!(plan, ResizePlan::Keep);
/// ```
pub fn fit_within(original: Dimensions, cap: DimensionCap) -> ResizePlan {
    if original.width <= cap.width && original.height <= cap.height {
        return ResizePlan::Keep;
    }

    let ratio = f64::min(
        cap.width as f64 / original.width as f64,
        cap.height as f64 / original.height as f64,
    );
    let width = ((original.width as f64 * ratio).round() as u32).clamp(1, cap.width.max(1));
    let height = ((original.height as f64 * ratio).round() as u32).clamp(1, cap.height.max(1));

    ResizePlan::Scale(Dimensions::new(width, height))
}

/// Apply a plan to a decoded image using Lanczos3 resampling.
pub fn apply(img: DynamicImage, plan: ResizePlan) -> DynamicImage {
    match plan {
        ResizePlan::Keep => img,
        ResizePlan::Scale(target) => img.resize_exact(target.width, target.height, FilterType::Lanczos3),
    }
}
