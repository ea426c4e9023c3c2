use crate::{classification::ThresholdOutOfRange, model_service::ModelError, proxy::ProxyError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Model not loaded")]
    Unavailable,
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Status { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed with {}: {}", status, self);
        } else {
            tracing::debug!("Request rejected with {}: {}", status, self);
        }

        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<ThresholdOutOfRange> for ApiError {
    fn from(err: ThresholdOutOfRange) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        match &err {
            ProxyError::InvalidUrl(_) => ApiError::BadRequest(err.to_string()),
            ProxyError::Upstream(status) => ApiError::Status {
                status: *status,
                message: err.to_string(),
            },
            ProxyError::TooLarge(_) => ApiError::Status {
                status: StatusCode::BAD_GATEWAY,
                message: err.to_string(),
            },
            ProxyError::Request(_) => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::BadRequest("nope".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_status_is_mirrored() {
        let err: ApiError = ProxyError::Upstream(StatusCode::NOT_FOUND).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Failed to fetch image");
    }

    #[test]
    fn test_oversized_upstream_is_bad_gateway() {
        let err: ApiError = ProxyError::TooLarge(1024).into();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_string(), "Image exceeds 1024 bytes");
    }

    #[test]
    fn test_threshold_error_message() {
        let err: ApiError = ThresholdOutOfRange(2.0).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Threshold must be between 0 and 1");
    }
}
