//! Quality-aware confidence calibration and the certain/uncertain verdict.

use serde::{Deserialize, Serialize};
use shared::{ClassLabel, QualityMetrics, UncertaintyReason};

use super::error::PipelineError;
use super::quality::{QualityTable, quality_multiplier};

/// Classifier output aligned with [`ClassLabel::ALL`]. Every score is a
/// probability in `[0, 1]`; logits must be passed through softmax first.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVector(Vec<f32>);

impl ScoreVector {
    pub fn new(scores: Vec<f32>) -> Result<Self, PipelineError> {
        if scores.len() != ClassLabel::ALL.len() {
            return Err(PipelineError::InvalidScores(format!(
                "expected {} scores, got {}",
                ClassLabel::ALL.len(),
                scores.len()
            )));
        }
        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Err(PipelineError::InvalidScores(format!(
                "non-finite score {}",
                bad
            )));
        }
        if let Some(bad) = scores.iter().find(|s| !(0.0..=1.0).contains(*s)) {
            return Err(PipelineError::InvalidScores(format!(
                "score {} is not a probability",
                bad
            )));
        }
        Ok(Self(scores))
    }

    pub fn scores(&self) -> &[f32] {
        &self.0
    }

    /// Classes by descending score. The sort is stable, so equal scores keep
    /// the lower class index first.
    pub fn ranked(&self) -> Vec<(ClassLabel, f32)> {
        let mut ranked: Vec<(ClassLabel, f32)> = ClassLabel::ALL
            .iter()
            .copied()
            .zip(self.0.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    pub fn top(&self) -> ClassLabel {
        self.ranked()
            .first()
            .map(|(label, _)| *label)
            .unwrap_or(ClassLabel::ALL[0])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibrationConfig {
    pub min_confidence: f32,
    pub min_gap: f32,
    pub min_quality: f32,
    pub top_k: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            min_gap: 0.2,
            min_quality: 0.8,
            top_k: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedResult {
    pub predicted_label: ClassLabel,
    pub raw_confidence: f32,
    pub calibrated_confidence: f32,
    pub confidence_gap: f32,
    pub quality_score: f32,
    pub quality_metrics: QualityMetrics,
    pub is_uncertain: bool,
    pub uncertainty_reason: Option<UncertaintyReason>,
    pub top_k: Vec<(ClassLabel, f32)>,
    /// Number of classifier runs folded into the scores.
    pub ensemble_size: usize,
}

impl CalibratedResult {
    pub fn warning(&self) -> Option<&'static str> {
        self.uncertainty_reason.map(UncertaintyReason::warning)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Calibrator {
    config: CalibrationConfig,
    table: QualityTable,
}

impl Calibrator {
    pub fn new(config: CalibrationConfig, table: QualityTable) -> Self {
        Self { config, table }
    }

    pub fn calibrate(&self, scores: &ScoreVector, metrics: &QualityMetrics) -> CalibratedResult {
        let quality_score = quality_multiplier(metrics, self.table);
        let ranked = scores.ranked();

        let (predicted_label, raw_confidence) = ranked[0];
        let second_confidence = ranked.get(1).map(|(_, s)| *s).unwrap_or(0.0);

        let calibrated_confidence = (raw_confidence * quality_score).clamp(0.0, 1.0);
        let confidence_gap = calibrated_confidence - second_confidence;

        let low_quality = quality_score < self.config.min_quality;
        let is_uncertain = calibrated_confidence < self.config.min_confidence
            || confidence_gap < self.config.min_gap
            || low_quality;

        // Poor quality wins over ambiguity so the user learns to retake the photo.
        let uncertainty_reason = match (is_uncertain, low_quality) {
            (true, true) => Some(UncertaintyReason::LowImageQuality),
            (true, false) => Some(UncertaintyReason::AmbiguousPrediction),
            (false, _) => None,
        };

        let top_k = ranked.into_iter().take(self.config.top_k).collect();

        CalibratedResult {
            predicted_label,
            raw_confidence,
            calibrated_confidence,
            confidence_gap,
            quality_score,
            quality_metrics: *metrics,
            is_uncertain,
            uncertainty_reason,
            top_k,
            ensemble_size: 1,
        }
    }
}
