use crate::{error::ApiError, server::SharedState};
use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Query, State},
    http::header,
    response::Response,
};
use serde::Deserialize;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct ProxyParams {
    url: String,
}

#[instrument(skip_all)]
pub async fn proxy_image(
    State(state): State<SharedState>,
    params: Result<Query<ProxyParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    state.metrics.record_request("/proxy-image");

    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let image = state.image_proxy.fetch(&params.url).await?;

    Response::builder()
        .header(header::CONTENT_TYPE, image.content_type)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, "GET")
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, "*")
        .body(Body::from(image.body))
        .map_err(|e| ApiError::Internal(e.to_string()))
}
