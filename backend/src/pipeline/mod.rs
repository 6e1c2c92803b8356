pub mod augmentation;
pub mod calibration;
pub mod config;
pub mod enhancement;
pub mod ensemble;
pub mod error;
pub mod normalizer;
pub mod quality;

pub use calibration::{CalibratedResult, CalibrationConfig, Calibrator, ScoreVector};
pub use config::PipelineConfig;
pub use ensemble::{EnsembleConfig, EnsembleKind, Reduction};
pub use error::PipelineError;
pub use normalizer::{DecodedImage, ImageNormalizer, Normalized, NormalizedTensor};
pub use quality::{QualityTable, quality_multiplier, score_quality};

use crate::model::Classifier;

/// Bytes in, calibrated prediction out. Holds only immutable configuration,
/// so one instance is shared by all requests.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    normalizer: ImageNormalizer,
    calibrator: Calibrator,
    ensemble: EnsembleConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            normalizer: ImageNormalizer::new(config.normalizer),
            calibrator: Calibrator::new(config.calibration, config.quality.table),
            ensemble: config.ensemble,
        }
    }

    pub fn normalizer(&self) -> &ImageNormalizer {
        &self.normalizer
    }

    pub fn run(
        &self,
        raw: &[u8],
        classifier: &dyn Classifier,
    ) -> Result<CalibratedResult, PipelineError> {
        if !classifier.is_ready() {
            return Err(PipelineError::ClassifierUnavailable);
        }

        let Normalized { tensor, decoded } = self.normalizer.normalize(raw)?;
        let metrics = score_quality(&decoded);

        let (scores, ensemble_size) = if self.ensemble.enabled {
            let variants = self.ensemble.kind.variants(&decoded)?;
            let mut members = Vec::with_capacity(variants.len());
            for variant in &variants {
                let input = self.normalizer.tensor_from_array(variant)?;
                members.push(ScoreVector::new(classifier.predict(&input)?)?);
            }
            (ensemble::reduce(&members, self.ensemble.reduction)?, members.len())
        } else {
            (ScoreVector::new(classifier.predict(&tensor)?)?, 1)
        };

        let result = self.calibrator.calibrate(&scores, &metrics);
        Ok(CalibratedResult {
            ensemble_size,
            ..result
        })
    }
}
