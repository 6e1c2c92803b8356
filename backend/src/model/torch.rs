use std::path::Path;
use std::sync::Mutex;

use tch::{CModule, Device, Kind, Tensor};

use super::{Classifier, ClassifierError};
use crate::pipeline::NormalizedTensor;

/// TorchScript module that takes the NHWC tensor as is.
pub struct TorchClassifier {
    module: Mutex<CModule>,
    device: Device,
    apply_softmax: bool,
}

impl TorchClassifier {
    pub fn load(path: &Path, apply_softmax: bool) -> Result<Self, ClassifierError> {
        let device = Device::cuda_if_available();
        let module = CModule::load_on_device(path, device)
            .map_err(|e| ClassifierError::Load(format!("{}: {}", path.display(), e)))?;
        log::info!("Loaded TorchScript model from {} on {:?}", path.display(), device);
        Ok(Self {
            module: Mutex::new(module),
            device,
            apply_softmax,
        })
    }
}

impl Classifier for TorchClassifier {
    fn predict(&self, tensor: &NormalizedTensor) -> Result<Vec<f32>, ClassifierError> {
        let (batch, height, width, channels) = tensor.dim();
        let samples: Vec<f32> = tensor.iter().copied().collect();
        let input = Tensor::from_slice(&samples)
            .view([batch as i64, height as i64, width as i64, channels as i64])
            .to_device(self.device);

        let module = self
            .module
            .lock()
            .map_err(|_| ClassifierError::Inference("model lock poisoned".to_string()))?;
        let output = tch::no_grad(|| module.forward_ts(&[input]))
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        drop(module);

        let output = if self.apply_softmax {
            output.softmax(-1, Kind::Float)
        } else {
            output.to_kind(Kind::Float)
        };
        let flat = output.to_device(Device::Cpu).view([-1]);
        let len = flat.size()[0] as usize;
        let mut scores = vec![0.0f32; len];
        flat.copy_data(&mut scores, len);
        Ok(scores)
    }
}
