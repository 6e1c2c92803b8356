//! The classifier seam. The pipeline only sees [`Classifier`]; the server
//! owns a [`ModelHandle`] that is either loaded once at startup or empty.

#[cfg(feature = "torch")]
mod torch;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::pipeline::NormalizedTensor;

#[cfg(feature = "torch")]
pub use torch::TorchClassifier;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier is not loaded")]
    NotLoaded,
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("built without a model backend; enable the `torch` feature")]
    BackendDisabled,
}

/// Maps one normalized tensor to a score per class, in label order.
pub trait Classifier: Send + Sync {
    fn is_ready(&self) -> bool {
        true
    }

    fn predict(&self, tensor: &NormalizedTensor) -> Result<Vec<f32>, ClassifierError>;
}

#[derive(Clone, Default)]
pub struct ModelHandle {
    classifier: Option<Arc<dyn Classifier>>,
}

impl ModelHandle {
    pub fn loaded(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    pub fn unloaded() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.classifier
            .as_ref()
            .is_some_and(|classifier| classifier.is_ready())
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl Classifier for ModelHandle {
    fn is_ready(&self) -> bool {
        self.is_loaded()
    }

    fn predict(&self, tensor: &NormalizedTensor) -> Result<Vec<f32>, ClassifierError> {
        match &self.classifier {
            Some(classifier) => classifier.predict(tensor),
            None => Err(ClassifierError::NotLoaded),
        }
    }
}

#[cfg(feature = "torch")]
pub fn load_classifier(path: &Path, apply_softmax: bool) -> Result<ModelHandle, ClassifierError> {
    let classifier = TorchClassifier::load(path, apply_softmax)?;
    Ok(ModelHandle::loaded(Arc::new(classifier)))
}

#[cfg(not(feature = "torch"))]
pub fn load_classifier(_path: &Path, _apply_softmax: bool) -> Result<ModelHandle, ClassifierError> {
    Err(ClassifierError::BackendDisabled)
}
