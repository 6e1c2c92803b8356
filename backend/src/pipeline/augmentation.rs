//! Test-time augmentation: a fixed set of geometric variants of one image.

use image::imageops::{self, FilterType};
use ndarray::{Array3, s};

use super::error::PipelineError;
use super::normalizer::{DecodedImage, from_rgb_image, to_rgb_image};

pub const ROTATION_DEGREES: f64 = 5.0;
pub const ZOOM_FACTOR: f64 = 0.9;

/// Identity, mirror, -5 degrees, +5 degrees, center zoom. Always five.
pub fn augment(decoded: &DecodedImage) -> Result<Vec<DecodedImage>, PipelineError> {
    Ok(vec![
        decoded.clone(),
        mirror(decoded),
        rotate(decoded, -ROTATION_DEGREES),
        rotate(decoded, ROTATION_DEGREES),
        center_zoom(decoded, ZOOM_FACTOR)?,
    ])
}

pub fn mirror(decoded: &DecodedImage) -> DecodedImage {
    decoded.slice(s![.., ..;-1, ..]).to_owned()
}

/// Rotates about the image center, counter-clockwise for positive angles.
/// Samples outside the source are clamped to the nearest edge pixel so the
/// corners are filled with image content instead of a constant color.
pub fn rotate(decoded: &DecodedImage, degrees: f64) -> DecodedImage {
    let (height, width, channels) = decoded.dim();
    if height == 0 || width == 0 {
        return decoded.clone();
    }

    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = (width as f64 - 1.0) / 2.0;
    let cy = (height as f64 - 1.0) / 2.0;
    let max_x = (width - 1) as f64;
    let max_y = (height - 1) as f64;

    let mut rotated = Array3::<u8>::zeros((height, width, channels));
    for y in 0..height {
        for x in 0..width {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let src_x = (cx + dx * cos - dy * sin).clamp(0.0, max_x);
            let src_y = (cy + dx * sin + dy * cos).clamp(0.0, max_y);

            let x0 = src_x.floor() as usize;
            let y0 = src_y.floor() as usize;
            let x1 = (x0 + 1).min(width - 1);
            let y1 = (y0 + 1).min(height - 1);
            let fx = src_x - x0 as f64;
            let fy = src_y - y0 as f64;

            for c in 0..channels {
                let top = f64::from(decoded[[y0, x0, c]]) * (1.0 - fx)
                    + f64::from(decoded[[y0, x1, c]]) * fx;
                let bottom = f64::from(decoded[[y1, x0, c]]) * (1.0 - fx)
                    + f64::from(decoded[[y1, x1, c]]) * fx;
                let value = top * (1.0 - fy) + bottom * fy;
                rotated[[y, x, c]] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    rotated
}

/// Crops a centered square of `factor * min(H, W)` and scales it back to H x W.
pub fn center_zoom(decoded: &DecodedImage, factor: f64) -> Result<DecodedImage, PipelineError> {
    let (height, width, _) = decoded.dim();
    let side = ((height.min(width) as f64 * factor) as usize).max(1);
    let top = (height.saturating_sub(side)) / 2;
    let left = (width.saturating_sub(side)) / 2;

    let cropped = decoded
        .slice(s![top..top + side, left..left + side, ..])
        .to_owned();
    let zoomed = imageops::resize(
        &to_rgb_image(&cropped)?,
        width as u32,
        height as u32,
        FilterType::Triangle,
    );
    from_rgb_image(zoomed)
}
