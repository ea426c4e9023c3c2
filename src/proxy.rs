use crate::config::ProxyConfig;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to fetch image")]
    Upstream(StatusCode),
    #[error("Image exceeds {0} bytes")]
    TooLarge(usize),
    #[error("{0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ProxiedImage {
    pub content_type: String,
    pub body: Bytes,
}

/// Fetches remote images on behalf of browser clients.
#[derive(Debug, Clone)]
pub struct ImageProxy {
    client: Client,
    default_content_type: String,
    max_body_bytes: usize,
}

impl ImageProxy {
    pub fn new(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            default_content_type: config.default_content_type.clone(),
            max_body_bytes: config.max_body_bytes,
        })
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<ProxiedImage, ProxyError> {
        let url = parse_url(url)?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!("Upstream answered {}", status);
            return Err(ProxyError::Upstream(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| self.default_content_type.clone());

        if response
            .content_length()
            .is_some_and(|len| len > self.max_body_bytes as u64)
        {
            return Err(ProxyError::TooLarge(self.max_body_bytes));
        }

        // Content-Length may be absent or wrong, so the limit is enforced while reading.
        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(ProxyError::TooLarge(self.max_body_bytes));
            }
            body.extend_from_slice(&chunk);
        }
        let body = body.freeze();
        tracing::debug!("Fetched {} bytes of {}", body.len(), content_type);

        Ok(ProxiedImage { content_type, body })
    }
}

/// Callers may encode the target twice, so one more decoding pass is applied.
fn parse_url(raw: &str) -> Result<Url, ProxyError> {
    let decoded = urlencoding::decode(raw).map_err(|e| ProxyError::InvalidUrl(e.to_string()))?;
    let url = Url::parse(&decoded).map_err(|e| ProxyError::InvalidUrl(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ProxyError::InvalidUrl(format!(
            "unsupported scheme `{}`",
            other
        ))),
    }
}
