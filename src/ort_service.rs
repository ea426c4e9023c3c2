use crate::{
    classification::Probabilities,
    config::ModelConfig,
    model_service::{ModelError, ModelService},
    preprocess::ImageTransform,
};
use async_trait::async_trait;
use bytes::Bytes;
use ndarray::{Array, ArrayD, Ix4};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    path::Path,
    sync::{Arc, Mutex},
};

#[derive(Clone)]
pub struct OrtModelService {
    session: Arc<Mutex<Session>>,
    output_name: Arc<str>,
    transform: Arc<ImageTransform>,
}

impl OrtModelService {
    pub fn new(model_path: &Path, model_config: &ModelConfig) -> Result<Self, ModelError> {
        // CUDA is used when available, otherwise ORT falls back to the CPU provider.
        ort::init()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .commit()?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)?;

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| ModelError::Output("model declares no outputs".into()))?;

        tracing::info!(
            "Created ONNX session from {:?} (output `{}`, input size {})",
            model_path,
            output_name,
            model_config.input_size
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            output_name: output_name.into(),
            transform: Arc::new(ImageTransform::from(model_config)),
        })
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ArrayD<f32>, ModelError> {
        let mut session = self
            .session
            .lock()
            .map_err(|e| ModelError::Inference(format!("session mutex poisoned: {}", e)))?;

        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let (shape, data) = outputs[&*self.output_name].try_extract_tensor::<f32>()?;

        let array = ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(|e| ModelError::Output(format!("invalid tensor shape: {}", e)))?;

        Ok(array)
    }

    fn classify_blocking(&self, image_data: &[u8]) -> Result<Probabilities, ModelError> {
        let input = self.transform.transform(image_data)?;
        let logits = self.run_inference(&input)?;
        probabilities_from_logits(&logits)
    }
}

/// Expects the two-class head output, `[1, 2]`, ordered `[real, fake]`.
fn probabilities_from_logits(logits: &ArrayD<f32>) -> Result<Probabilities, ModelError> {
    if logits.len() != 2 {
        return Err(ModelError::Output(format!(
            "expected 2 logits, got shape {:?}",
            logits.shape()
        )));
    }

    let mut values = logits.iter().copied();
    match (values.next(), values.next()) {
        (Some(real), Some(fake)) => Ok(Probabilities::from_logits(real, fake)),
        _ => Err(ModelError::Output("missing logits".into())),
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn predict(&self, image_data: Bytes) -> Result<Probabilities, ModelError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.classify_blocking(&image_data)).await?
    }
}
