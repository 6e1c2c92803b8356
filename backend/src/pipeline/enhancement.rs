//! Photometric ensemble: the original image plus four mild enhancements
//! (contrast, brightness, sharpening, saturation).

use image::imageops;
use ndarray::{Array2, Axis, Zip, s};

use super::error::PipelineError;
use super::normalizer::{DecodedImage, from_rgb_image, to_rgb_image};

pub const CONTRAST_FACTOR: f64 = 1.2;
pub const BRIGHTNESS_FACTOR: f64 = 1.1;
pub const SATURATION_FACTOR: f64 = 1.1;

/// 3x3 sharpen kernel; `filter3x3` divides by its sum (16).
#[rustfmt::skip]
const SHARPEN_KERNEL: [f32; 9] = [
    -2.0, -2.0, -2.0,
    -2.0, 32.0, -2.0,
    -2.0, -2.0, -2.0,
];

pub fn enhance(decoded: &DecodedImage) -> Result<Vec<DecodedImage>, PipelineError> {
    Ok(vec![
        decoded.clone(),
        adjust_contrast(decoded, CONTRAST_FACTOR),
        adjust_brightness(decoded, BRIGHTNESS_FACTOR),
        sharpen(decoded)?,
        adjust_saturation(decoded, SATURATION_FACTOR),
    ])
}

fn to_sample(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// ITU-R 601-2 luma per pixel.
fn luma(decoded: &DecodedImage) -> Array2<f64> {
    decoded.map_axis(Axis(2), |pixel| {
        if pixel.len() < 3 {
            return pixel.iter().map(|&v| f64::from(v)).sum::<f64>() / pixel.len().max(1) as f64;
        }
        (299.0 * f64::from(pixel[0]) + 587.0 * f64::from(pixel[1]) + 114.0 * f64::from(pixel[2]))
            / 1000.0
    })
}

/// Scales the distance of every sample from the mean gray level.
pub fn adjust_contrast(decoded: &DecodedImage, factor: f64) -> DecodedImage {
    let mean = luma(decoded).mean().unwrap_or(0.0).round();
    decoded.mapv(|v| to_sample(mean + factor * (f64::from(v) - mean)))
}

pub fn adjust_brightness(decoded: &DecodedImage, factor: f64) -> DecodedImage {
    decoded.mapv(|v| to_sample(f64::from(v) * factor))
}

/// Scales the distance of every channel from its pixel's gray level.
pub fn adjust_saturation(decoded: &DecodedImage, factor: f64) -> DecodedImage {
    let gray = luma(decoded);
    let mut saturated = decoded.clone();
    for mut channel in saturated.axis_iter_mut(Axis(2)) {
        Zip::from(&mut channel).and(&gray).for_each(|sample, &l| {
            *sample = to_sample(l + factor * (f64::from(*sample) - l));
        });
    }
    saturated
}

/// Border rows and columns keep their source samples.
pub fn sharpen(decoded: &DecodedImage) -> Result<DecodedImage, PipelineError> {
    let (height, width, _) = decoded.dim();
    if height < 3 || width < 3 {
        return Ok(decoded.clone());
    }

    let filtered = imageops::filter3x3(&to_rgb_image(decoded)?, &SHARPEN_KERNEL);
    let mut sharpened = from_rgb_image(filtered)?;
    sharpened
        .slice_mut(s![0, .., ..])
        .assign(&decoded.slice(s![0, .., ..]));
    sharpened
        .slice_mut(s![height - 1, .., ..])
        .assign(&decoded.slice(s![height - 1, .., ..]));
    sharpened
        .slice_mut(s![.., 0, ..])
        .assign(&decoded.slice(s![.., 0, ..]));
    sharpened
        .slice_mut(s![.., width - 1, ..])
        .assign(&decoded.slice(s![.., width - 1, ..]));
    Ok(sharpened)
}
