use crate::{classification::Probabilities, preprocess::PreprocessError};
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("{0}")]
    Preprocess(#[from] PreprocessError),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    Output(String),
    #[error("inference task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<ort::Error> for ModelError {
    fn from(err: ort::Error) -> Self {
        ModelError::Inference(err.to_string())
    }
}

#[async_trait]
pub trait ModelService: Send + Sync + 'static {
    async fn predict(&self, image_data: Bytes) -> Result<Probabilities, ModelError>;
}
