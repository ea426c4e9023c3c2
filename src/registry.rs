use crate::config::{RegistryConfig, RegistryKind};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Model artifact not found: {0:?}")]
    NotFound(PathBuf),
    #[error("Registry returned {status} for model {model_id}")]
    Status { model_id: String, status: StatusCode },
    #[error("Registry request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Failed to write model artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("Registry misconfigured: {0}")]
    Config(String),
}

/// Resolves a model identifier to a local copy of its artifact.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    async fn get_local_copy(&self, model_id: &str) -> Result<PathBuf, RegistryError>;
}

/// Serves artifacts already present in the cache directory.
pub struct LocalModelRegistry {
    config: RegistryConfig,
}

impl LocalModelRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModelRegistry for LocalModelRegistry {
    async fn get_local_copy(&self, model_id: &str) -> Result<PathBuf, RegistryError> {
        let path = self.config.get_artifact_path(model_id);
        if fs::try_exists(&path).await? {
            Ok(path)
        } else {
            Err(RegistryError::NotFound(path))
        }
    }
}

/// Downloads artifacts from `{base_url}/models/{id}/artifact` and caches them on disk.
pub struct HttpModelRegistry {
    client: Client,
    base_url: String,
    config: RegistryConfig,
}

impl HttpModelRegistry {
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| RegistryError::Config("missing base_url".into()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        })
    }

    fn artifact_url(&self, model_id: &str) -> String {
        format!("{}/models/{}/artifact", self.base_url, model_id)
    }

    async fn download(&self, model_id: &str, destination: &Path) -> Result<(), RegistryError> {
        let url = self.artifact_url(model_id);
        tracing::info!("Downloading model {} from {}", model_id, url);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                model_id: model_id.to_string(),
                status,
            });
        }

        fs::create_dir_all(&self.config.cache_dir).await?;

        // A partial file must never be mistaken for a cached artifact.
        let partial = destination.with_extension("part");
        let written = match write_artifact(response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        fs::rename(&partial, destination).await?;
        tracing::info!("Cached model {} ({} bytes) at {:?}", model_id, written, destination);

        Ok(())
    }
}

async fn write_artifact(response: reqwest::Response, path: &Path) -> Result<usize, RegistryError> {
    let mut file = fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len();
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    Ok(written)
}

#[async_trait]
impl ModelRegistry for HttpModelRegistry {
    async fn get_local_copy(&self, model_id: &str) -> Result<PathBuf, RegistryError> {
        let path = self.config.get_artifact_path(model_id);
        if fs::try_exists(&path).await? {
            tracing::debug!("Using cached model artifact {:?}", path);
            return Ok(path);
        }

        self.download(model_id, &path).await?;
        Ok(path)
    }
}

pub fn build_registry(config: &RegistryConfig) -> Result<Arc<dyn ModelRegistry>, RegistryError> {
    let registry: Arc<dyn ModelRegistry> = match config.kind {
        RegistryKind::Http => Arc::new(HttpModelRegistry::new(config.clone())?),
        RegistryKind::Local => Arc::new(LocalModelRegistry::new(config.clone())),
    };
    Ok(registry)
}
