use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumCount, EnumString};

/// Disease classes known to the classifier. The declaration order is the
/// order of the model's output vector and must change together with it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumCount,
)]
pub enum ClassLabel {
    #[serde(rename = "Early_Blight")]
    #[strum(serialize = "Early_Blight")]
    EarlyBlight,
    #[serde(rename = "Healthy")]
    #[strum(serialize = "Healthy")]
    Healthy,
    #[serde(rename = "Late_Blight")]
    #[strum(serialize = "Late_Blight")]
    LateBlight,
}

impl ClassLabel {
    pub const ALL: [ClassLabel; 3] = [
        ClassLabel::EarlyBlight,
        ClassLabel::Healthy,
        ClassLabel::LateBlight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyReason {
    #[strum(serialize = "low image quality")]
    LowImageQuality,
    #[strum(serialize = "ambiguous prediction")]
    AmbiguousPrediction,
}

impl UncertaintyReason {
    /// User-facing hint shown next to an uncertain prediction.
    pub fn warning(self) -> &'static str {
        match self {
            UncertaintyReason::LowImageQuality => {
                "Image quality is poor. Try better lighting and make sure the image is not blurry."
            }
            UncertaintyReason::AmbiguousPrediction => {
                "The prediction is uncertain. Consider taking a photo from a different angle."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub sharpness: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub color_balance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: ClassLabel,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub status: String,
    pub prediction: ClassLabel,
    pub confidence: f32,
    pub raw_confidence: f32,
    pub quality_score: f32,
    pub is_uncertain: bool,
    pub uncertainty_reason: Option<UncertaintyReason>,
    pub warning: Option<String>,
    pub all_predictions: Vec<LabelScore>,
    pub quality_metrics: QualityMetrics,
    pub ensemble_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
}
