use crate::model::ClassifierError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Image decode error: {0}")]
    Decode(String),
    #[error("Unexpected array shape: expected {expected:?}, got {actual:?}")]
    Shape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("Classifier is not loaded")]
    ClassifierUnavailable,
    #[error("Invalid classifier scores: {0}")]
    InvalidScores(String),
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::Decode(err.to_string())
    }
}
