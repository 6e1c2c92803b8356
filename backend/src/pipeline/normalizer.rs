//! Turns uploaded bytes into the fixed-size tensor the classifier expects.
//!
//! The framing policy is a deterministic center square crop followed by a
//! high-quality resize to 224x224 and scaling to `[0, 1]`. Everything that
//! can vary lives in [`NormalizerConfig`], which carries a version number so
//! a change of preprocessing is always an explicit configuration change.

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use ndarray::{Array3, Array4, Axis};
use serde::{Deserialize, Serialize};

use super::error::PipelineError;

pub const TARGET_SIZE: u32 = 224;
pub const TENSOR_SHAPE: [usize; 4] = [1, TARGET_SIZE as usize, TARGET_SIZE as usize, 3];

/// RGB samples in (height, width, channel) order.
pub type DecodedImage = Array3<u8>;
/// Batched NHWC tensor, batch size always 1.
pub type NormalizedTensor = Array4<f32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    #[default]
    Lanczos3,
    CatmullRom,
}

impl ResizeFilter {
    fn filter_type(self) -> FilterType {
        match self {
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropPolicy {
    #[default]
    CenterSquare,
}

/// Per-channel `(x - mean) / std` applied after scaling to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelNormalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl ChannelNormalization {
    pub fn imagenet() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizerConfig {
    pub version: u32,
    pub resize_filter: ResizeFilter,
    pub crop: CropPolicy,
    pub channel_normalization: Option<ChannelNormalization>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            version: 1,
            resize_filter: ResizeFilter::default(),
            crop: CropPolicy::default(),
            channel_normalization: None,
        }
    }
}

/// Output of [`ImageNormalizer::normalize`]: the classifier input plus the
/// framed 224x224 samples that quality scoring and augmentation work on.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub tensor: NormalizedTensor,
    pub decoded: DecodedImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub left: u32,
    pub top: u32,
    pub side: u32,
}

/// Largest centered square; offsets are floored.
pub fn center_square(width: u32, height: u32) -> CropRegion {
    let side = width.min(height);
    CropRegion {
        left: (width - side) / 2,
        top: (height - side) / 2,
        side,
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageNormalizer {
    config: NormalizerConfig,
}

impl ImageNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    pub fn normalize(&self, raw: &[u8]) -> Result<Normalized, PipelineError> {
        let image = decode_rgb(raw)?;
        let framed = self.frame(image);
        let decoded = from_rgb_image(framed)?;
        let tensor = self.tensor_from_array(&decoded)?;
        Ok(Normalized { tensor, decoded })
    }

    /// Resize (if needed), scale and batch an already decoded image.
    pub fn tensor_from_array(
        &self,
        decoded: &DecodedImage,
    ) -> Result<NormalizedTensor, PipelineError> {
        let (height, width, _) = decoded.dim();
        let target = TARGET_SIZE as usize;

        let resized;
        let source = if height == target && width == target {
            decoded.view()
        } else {
            let image = to_rgb_image(decoded)?;
            resized = from_rgb_image(self.resize(&image))?;
            resized.view()
        };

        let mut scaled = source.mapv(|v| f32::from(v) / 255.0);
        if let Some(norm) = &self.config.channel_normalization {
            for (c, mut channel) in scaled.axis_iter_mut(Axis(2)).enumerate().take(3) {
                channel.mapv_inplace(|v| (v - norm.mean[c]) / norm.std[c]);
            }
        }

        let tensor = scaled.insert_axis(Axis(0));
        if tensor.shape() != TENSOR_SHAPE {
            return Err(PipelineError::Shape {
                expected: TENSOR_SHAPE.to_vec(),
                actual: tensor.shape().to_vec(),
            });
        }
        Ok(tensor)
    }

    fn frame(&self, image: RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        let cropped = match self.config.crop {
            CropPolicy::CenterSquare if width != height => {
                let region = center_square(width, height);
                imageops::crop_imm(&image, region.left, region.top, region.side, region.side)
                    .to_image()
            }
            CropPolicy::CenterSquare => image,
        };
        if cropped.dimensions() == (TARGET_SIZE, TARGET_SIZE) {
            cropped
        } else {
            self.resize(&cropped)
        }
    }

    fn resize(&self, image: &RgbImage) -> RgbImage {
        imageops::resize(
            image,
            TARGET_SIZE,
            TARGET_SIZE,
            self.config.resize_filter.filter_type(),
        )
    }
}

pub fn is_supported_format(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png
            | ImageFormat::Jpeg
            | ImageFormat::Bmp
            | ImageFormat::Gif
            | ImageFormat::Tiff
            | ImageFormat::WebP
    )
}

fn decode_rgb(raw: &[u8]) -> Result<RgbImage, PipelineError> {
    let format = image::guess_format(raw)
        .map_err(|_| PipelineError::Decode("unrecognized image format".to_string()))?;
    if !is_supported_format(format) {
        return Err(PipelineError::Decode(format!(
            "unsupported image format {:?}",
            format
        )));
    }

    let image = image::load_from_memory_with_format(raw, format)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::Decode("image has no pixels".to_string()));
    }
    Ok(image.to_rgb8())
}

pub(crate) fn to_rgb_image(array: &DecodedImage) -> Result<RgbImage, PipelineError> {
    let (height, width, channels) = array.dim();
    let shape_error = || PipelineError::Shape {
        expected: vec![height, width, 3],
        actual: array.shape().to_vec(),
    };
    if channels != 3 || height == 0 || width == 0 {
        return Err(shape_error());
    }
    let raw: Vec<u8> = array.iter().copied().collect();
    RgbImage::from_raw(width as u32, height as u32, raw).ok_or_else(shape_error)
}

pub(crate) fn from_rgb_image(image: RgbImage) -> Result<DecodedImage, PipelineError> {
    let (width, height) = image.dimensions();
    let shape = (height as usize, width as usize, 3);
    Array3::from_shape_vec(shape, image.into_raw()).map_err(|_| PipelineError::Shape {
        expected: vec![shape.0, shape.1, shape.2],
        actual: Vec::new(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, Rgb};
    use std::io::Cursor;

    pub(crate) fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    pub(crate) fn png_bytes(image: &RgbImage) -> Vec<u8> {
        encode(&DynamicImage::ImageRgb8(image.clone()), ImageFormat::Png)
    }

    pub(crate) fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                ((x + y) % 256) as u8,
            ])
        })
    }

    #[test]
    fn center_square_offsets() {
        assert_eq!(
            center_square(640, 480),
            CropRegion { left: 80, top: 0, side: 480 }
        );
        assert_eq!(
            center_square(3, 8),
            CropRegion { left: 0, top: 2, side: 3 }
        );
        assert_eq!(
            center_square(5, 2),
            CropRegion { left: 1, top: 0, side: 2 }
        );
        assert_eq!(
            center_square(7, 7),
            CropRegion { left: 0, top: 0, side: 7 }
        );
    }

    #[test]
    fn square_input_is_only_resized() {
        let image = gradient(300, 300);
        let normalized = ImageNormalizer::default()
            .normalize(&png_bytes(&image))
            .unwrap();

        let expected = imageops::resize(&image, TARGET_SIZE, TARGET_SIZE, FilterType::Lanczos3);
        assert_eq!(normalized.decoded, from_rgb_image(expected).unwrap());
    }

    #[test]
    fn non_square_input_keeps_only_the_center() {
        // Green center square flanked by red columns that must be cropped away.
        let image = RgbImage::from_fn(300, 200, |x, _| {
            if (50..250).contains(&x) {
                Rgb([0, 255, 0])
            } else {
                Rgb([255, 0, 0])
            }
        });
        let normalized = ImageNormalizer::default()
            .normalize(&png_bytes(&image))
            .unwrap();

        assert_eq!(normalized.decoded.dim(), (224, 224, 3));
        for pixel in normalized.decoded.lanes(Axis(2)) {
            assert!(pixel[0] < 10, "red leaked into the crop: {:?}", pixel);
            assert!(pixel[1] > 245);
        }
    }

    #[test]
    fn crop_matches_manual_center_crop() {
        let image = gradient(173, 91);
        let normalized = ImageNormalizer::default()
            .normalize(&png_bytes(&image))
            .unwrap();

        let region = center_square(173, 91);
        assert_eq!(region.side, 91);
        assert_eq!(region.left, 41);
        let cropped =
            imageops::crop_imm(&image, region.left, region.top, region.side, region.side)
                .to_image();
        let expected = imageops::resize(&cropped, TARGET_SIZE, TARGET_SIZE, FilterType::Lanczos3);
        assert_eq!(normalized.decoded, from_rgb_image(expected).unwrap());
    }

    #[test]
    fn output_shape_and_range_for_any_size() {
        let normalizer = ImageNormalizer::default();
        for (width, height) in [(1, 1), (2, 2), (17, 5), (5, 17), (224, 224), (1600, 1200)] {
            let normalized = normalizer
                .normalize(&png_bytes(&gradient(width, height)))
                .unwrap();
            assert_eq!(normalized.tensor.shape(), TENSOR_SHAPE);
            assert!(
                normalized
                    .tensor
                    .iter()
                    .all(|v| (0.0..=1.0).contains(v)),
                "{}x{} produced values outside [0, 1]",
                width,
                height
            );
        }
    }

    #[test]
    fn tensor_is_scaled_samples() {
        let normalized = ImageNormalizer::default()
            .normalize(&png_bytes(&gradient(224, 224)))
            .unwrap();
        for ((_, y, x, c), value) in normalized.tensor.indexed_iter() {
            assert_eq!(*value, f32::from(normalized.decoded[[y, x, c]]) / 255.0);
        }
    }

    #[test]
    fn grayscale_input_becomes_rgb() {
        let gray = image::GrayImage::from_fn(40, 30, |x, _| image::Luma([(x * 6) as u8]));
        let bytes = encode(&DynamicImage::ImageLuma8(gray), ImageFormat::Png);
        let normalized = ImageNormalizer::default().normalize(&bytes).unwrap();
        assert_eq!(normalized.decoded.dim(), (224, 224, 3));
        for pixel in normalized.decoded.lanes(Axis(2)) {
            assert_eq!(pixel[0], pixel[1]);
            assert_eq!(pixel[1], pixel[2]);
        }
    }

    #[test]
    fn jpeg_input_is_accepted() {
        let bytes = encode(&DynamicImage::ImageRgb8(gradient(64, 48)), ImageFormat::Jpeg);
        let normalized = ImageNormalizer::default().normalize(&bytes).unwrap();
        assert_eq!(normalized.tensor.shape(), TENSOR_SHAPE);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let result = ImageNormalizer::default().normalize(b"not-an-img");
        assert!(matches!(result, Err(PipelineError::Decode(_))));
    }

    #[test]
    fn truncated_png_is_a_decode_error() {
        let bytes = png_bytes(&gradient(32, 32));
        let result = ImageNormalizer::default().normalize(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(PipelineError::Decode(_))));
    }

    #[test]
    fn empty_buffer_is_a_decode_error() {
        let result = ImageNormalizer::default().normalize(&[]);
        assert!(matches!(result, Err(PipelineError::Decode(_))));
    }

    #[test]
    fn channel_normalization_is_opt_in() {
        let config = NormalizerConfig {
            version: 2,
            channel_normalization: Some(ChannelNormalization::imagenet()),
            ..NormalizerConfig::default()
        };
        let decoded = Array3::from_elem((224, 224, 3), 255u8);
        let tensor = ImageNormalizer::new(config).tensor_from_array(&decoded).unwrap();

        let norm = ChannelNormalization::imagenet();
        for c in 0..3 {
            let expected = (1.0 - norm.mean[c]) / norm.std[c];
            assert!((tensor[[0, 10, 10, c]] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn arrays_of_other_sizes_are_resized() {
        let decoded = Array3::from_elem((50, 80, 3), 128u8);
        let tensor = ImageNormalizer::default()
            .tensor_from_array(&decoded)
            .unwrap();
        assert_eq!(tensor.shape(), TENSOR_SHAPE);
        assert!(tensor.iter().all(|v| (v - 128.0 / 255.0).abs() < 0.01));
    }

    #[test]
    fn wrong_channel_count_is_a_shape_error() {
        let decoded = Array3::<u8>::zeros((224, 224, 4));
        let result = ImageNormalizer::default().tensor_from_array(&decoded);
        assert!(matches!(result, Err(PipelineError::Shape { .. })));
    }
}
