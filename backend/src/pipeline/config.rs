use serde::{Deserialize, Serialize};
use std::path::Path;

use super::calibration::CalibrationConfig;
use super::ensemble::EnsembleConfig;
use super::normalizer::NormalizerConfig;
use super::quality::QualityConfig;
use crate::config::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub normalizer: NormalizerConfig,
    pub quality: QualityConfig,
    pub calibration: CalibrationConfig,
    pub ensemble: EnsembleConfig,
}

impl PipelineConfig {
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.normalizer.version == 0 {
            return Err(ConfigError::Invalid(
                "normalizer.version must be at least 1".to_string(),
            ));
        }
        if let Some(norm) = &self.normalizer.channel_normalization {
            if norm.std.iter().any(|s| !s.is_finite() || *s <= 0.0)
                || norm.mean.iter().any(|m| !m.is_finite())
            {
                return Err(ConfigError::Invalid(
                    "normalizer.channel_normalization needs finite means and positive std values"
                        .to_string(),
                ));
            }
        }

        let thresholds = [
            ("calibration.min_confidence", self.calibration.min_confidence),
            ("calibration.min_gap", self.calibration.min_gap),
            ("calibration.min_quality", self.calibration.min_quality),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.calibration.top_k == 0 {
            return Err(ConfigError::Invalid(
                "calibration.top_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
