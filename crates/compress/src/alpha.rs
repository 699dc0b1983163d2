//! Alpha channel flattening for codecs without transparency.

use image::{DynamicImage, Rgb, RgbImage};

/// Background used when flattening transparent uploads for JPEG output.
pub const WHITE: [u8; 3] = [255, 255, 255];

/// Composite an image over a solid background, dropping the alpha channel.
pub fn flatten_alpha(img: &DynamicImage, background: [u8; 3]) -> RgbImage {
    if !has_alpha_channel(img) {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut output = RgbImage::new(rgba.width(), rgba.height());

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let blend = |channel: u8, bg: u8| {
            (channel as f32 * alpha + bg as f32 * (1.0 - alpha)).round() as u8
        };
        output.put_pixel(
            x,
            y,
            Rgb([
                blend(r, background[0]),
                blend(g, background[1]),
                blend(b, background[2]),
            ]),
        );
    }

    output
}

/// Check if an image has an alpha channel
pub fn has_alpha_channel(img: &DynamicImage) -> bool {
    img.color().has_alpha()
}
