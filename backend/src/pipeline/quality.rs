use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use shared::QualityMetrics;

use super::normalizer::DecodedImage;

const DARK_LIMIT: f64 = 50.0;
const BRIGHT_LIMIT: f64 = 200.0;
const LOW_CONTRAST_LIMIT: f64 = 30.0;
const BLUR_LIMIT: f64 = 100.0;
const SHARP_LIMIT: f64 = 500.0;

/// Which set of quality penalties to apply.
///
/// `simple` is the penalty set the prediction endpoint has always shipped
/// with. `extended` is milder and rewards very sharp images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTable {
    #[default]
    Simple,
    Extended,
}

struct Factors {
    exposure: f32,
    low_contrast: f32,
    blur: f32,
    sharp_bonus: Option<f32>,
}

impl QualityTable {
    fn factors(self) -> Factors {
        match self {
            QualityTable::Simple => Factors {
                exposure: 0.8,
                low_contrast: 0.7,
                blur: 0.6,
                sharp_bonus: None,
            },
            QualityTable::Extended => Factors {
                exposure: 0.9,
                low_contrast: 0.8,
                blur: 0.85,
                sharp_bonus: Some(1.05),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityConfig {
    pub table: QualityTable,
}

/// Mean over channels, per pixel.
pub fn luminance(decoded: &DecodedImage) -> Array2<f64> {
    decoded.map_axis(Axis(2), |pixel| {
        pixel.iter().map(|&v| f64::from(v)).sum::<f64>() / pixel.len() as f64
    })
}

pub fn score_quality(decoded: &DecodedImage) -> QualityMetrics {
    let samples = decoded.mapv(f64::from);
    let gray = luminance(decoded);

    let brightness = samples.mean().unwrap_or(0.0);
    let contrast = gray.std(0.0);
    let sharpness = laplacian_variance(&gray);

    let channels = samples.len_of(Axis(2));
    let color_balance = if channels == 0 {
        0.0
    } else {
        samples
            .axis_iter(Axis(2))
            .map(|channel| channel.std(0.0))
            .sum::<f64>()
            / channels as f64
    };

    QualityMetrics {
        sharpness,
        brightness,
        contrast,
        color_balance,
    }
}

/// Variance of the 4-neighbour Laplacian over interior pixels.
pub fn laplacian_variance(gray: &Array2<f64>) -> f64 {
    let (height, width) = gray.dim();
    if height < 3 || width < 3 {
        return 0.0;
    }

    let responses: Array1<f64> = gray
        .windows((3, 3))
        .into_iter()
        .map(|w| w[[0, 1]] + w[[2, 1]] + w[[1, 0]] + w[[1, 2]] - 4.0 * w[[1, 1]])
        .collect();
    responses.var(0.0)
}

/// Compounding penalty factor in `(0, 1]`.
pub fn quality_multiplier(metrics: &QualityMetrics, table: QualityTable) -> f32 {
    let factors = table.factors();
    let mut multiplier = 1.0f32;

    if metrics.brightness < DARK_LIMIT || metrics.brightness > BRIGHT_LIMIT {
        multiplier *= factors.exposure;
    }
    if metrics.contrast < LOW_CONTRAST_LIMIT {
        multiplier *= factors.low_contrast;
    }
    if metrics.sharpness < BLUR_LIMIT {
        multiplier *= factors.blur;
    } else if metrics.sharpness > SHARP_LIMIT {
        if let Some(bonus) = factors.sharp_bonus {
            multiplier *= bonus;
        }
    }

    multiplier.min(1.0)
}
