use crate::{
    classification::{Prediction, Threshold},
    error::ApiError,
    server::SharedState,
};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
        Multipart, Query, State,
    },
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use std::time::Instant;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct PredictParams {
    threshold: Option<f64>,
}

struct Upload {
    content_type: Option<String>,
    data: Bytes,
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::Status {
        status: err.status(),
        message: err.body_text(),
    }
}

/// Picks the `file` field, or failing that the first field carrying a filename.
async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") && field.file_name().is_none() {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;
        return Ok(Upload { content_type, data });
    }

    Err(ApiError::BadRequest("No file uploaded".into()))
}

#[instrument(skip_all)]
pub async fn predict(
    State(state): State<SharedState>,
    params: Result<Query<PredictParams>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>, ApiError> {
    state.metrics.record_request("/predict");

    let model_service = state.model_service.clone().ok_or(ApiError::Unavailable)?;

    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let upload = read_upload(&mut multipart).await?;

    let is_image = upload
        .content_type
        .as_deref()
        .is_some_and(|content_type| content_type.starts_with("image/"));
    if !is_image {
        return Err(ApiError::BadRequest("File must be an image".into()));
    }

    let threshold = match params.threshold {
        Some(value) => Threshold::new(value)?,
        None => state.default_threshold,
    };

    let started = Instant::now();
    let probabilities = model_service.predict(upload.data).await?;
    tracing::info!(
        real = probabilities.real,
        fake = probabilities.fake,
        "Computed probabilities"
    );

    let prediction = probabilities.classify(threshold);
    state
        .metrics
        .record_prediction(prediction.prediction, started.elapsed().as_millis() as u64);

    Ok(Json(prediction))
}
