mod health;
mod metrics;
mod predict;
mod proxy_image;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub use health::healthcheck;
pub use metrics::metrics_handler;
pub use predict::predict;
pub use proxy_image::proxy_image;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/metrics", get(metrics_handler))
        .route("/predict", post(predict))
        .route("/proxy-image", get(proxy_image))
}
