use crate::{
    classification::Threshold,
    config::Config,
    model_service::ModelService,
    ort_service::OrtModelService,
    proxy::ImageProxy,
    registry::build_registry,
    server::{HttpServer, SharedState},
    telemetry::Metrics,
};
use anyhow::Context;
use std::sync::Arc;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let model_service = match load_model(&config).await {
        Ok(service) => Some(service),
        Err(e) => {
            tracing::warn!("Failed to load model during startup: {:#}", e);
            None
        }
    };

    let state = SharedState {
        model_service,
        image_proxy: ImageProxy::new(&config.proxy)?,
        default_threshold: Threshold::new(config.model.default_threshold)?,
        metrics: Arc::new(Metrics::new()?),
    };

    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut server_handle = server.run(shutdown_rx)?;

    let finished_early = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut server_handle => Some(result),
    };

    match finished_early {
        None => {
            tracing::info!("Shutdown signal received, starting graceful shutdown.");
            let _ = shutdown_tx.send(());
            server_handle.await??;
        }
        Some(result) => result??,
    }

    Ok(())
}

async fn load_model(config: &Config) -> anyhow::Result<Arc<dyn ModelService>> {
    let model_id = &config.model.model_id;
    let registry = build_registry(&config.registry)?;
    let model_path = registry
        .get_local_copy(model_id)
        .await
        .with_context(|| format!("failed to fetch model {}", model_id))?;

    let model_config = config.model.clone();
    let service =
        tokio::task::spawn_blocking(move || OrtModelService::new(&model_path, &model_config))
            .await??;

    tracing::info!("Model {} loaded", model_id);
    Ok(Arc::new(service))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
