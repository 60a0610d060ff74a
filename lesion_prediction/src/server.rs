use crate::{
    config::{Config, StorageConfig},
    pipeline::InferencePipeline,
    routes::api_routes,
    storage::UploadStore,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::services::{ServeDir, ServeFile};

#[derive(Clone)]
pub struct SharedState {
    pub pipeline: Arc<InferencePipeline>,
    pub store: UploadStore,
    pub metrics: Arc<Metrics>,
}

/// API routes plus the static upload, asset and index pages.
pub fn build_router(state: SharedState, storage_config: &StorageConfig) -> Router {
    let uploads_prefix = storage_config.public_prefix.trim_end_matches('/');

    Router::new()
        .merge(api_routes())
        .nest_service(uploads_prefix, ServeDir::new(state.store.dir()))
        .nest_service("/assets", ServeDir::new(&storage_config.assets_dir))
        .route_service("/", ServeFile::new(&storage_config.index_file))
        .layer(DefaultBodyLimit::max(storage_config.max_upload_bytes))
        .with_state(state)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(state: SharedState, config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();
        let metrics_layer = HttpMetricsLayerBuilder::new().build();

        let router = build_router(state, &config.storage).layer(metrics_layer);
        let listener = TcpListener::bind(&addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async {
                shutdown_signal().await;
                tracing::info!("Shutdown signal received, starting graceful shutdown");
            })
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
