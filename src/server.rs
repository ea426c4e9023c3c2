use crate::{
    classification::Threshold, config::ServerConfig, model_service::ModelService,
    proxy::ImageProxy, routes::api_routes, telemetry::Metrics,
};
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, Response},
    Router,
};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
pub struct SharedState {
    /// `None` when the model failed to load at startup.
    pub model_service: Option<Arc<dyn ModelService>>,
    pub image_proxy: ImageProxy,
    pub default_threshold: Threshold,
    pub metrics: Arc<Metrics>,
}

pub fn build_router(state: SharedState, max_upload_bytes: usize) -> Router {
    let metrics_layer = HttpMetricsLayerBuilder::new().build();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %req.method(),
                uri = %req.uri().path(),
            )
        })
        .on_response(|res: &Response<Body>, latency: Duration, _span: &tracing::Span| {
            tracing::info!(
                latency_ms = latency.as_millis() as u64,
                status = res.status().as_u16(),
                "finished processing request"
            );
        });

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(trace_layer)
        .layer(metrics_layer)
        .layer(cors)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(state: SharedState, config: &ServerConfig) -> anyhow::Result<Self> {
        let addr = config.get_address();
        let router = build_router(state, config.max_upload_bytes);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub fn run(self, mut shutdown_rx: Receiver<()>) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await.ok();
                })
                .await?;
            Ok(())
        });

        Ok(server_handle)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use crate::config::ServerConfig;
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn test_cors_headers_on_every_response() {
        let base_url = spawn_app(shared_state(None)).await;

        let response = reqwest::Client::new()
            .get(format!("{}/health", base_url))
            .header("Origin", "https://example.org")
            .send()
            .await
            .unwrap();

        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }

    #[tokio::test]
    async fn test_server_shuts_down_on_signal() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            max_upload_bytes: 1024,
        };
        let server = super::HttpServer::new(shared_state(None), &config)
            .await
            .unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = server.run(shutdown_rx).unwrap();
        shutdown_tx.send(()).unwrap();

        assert!(handle.await.unwrap().is_ok());
    }
}
