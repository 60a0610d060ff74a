use crate::{
    classifier::Classifier,
    config::Config,
    labels::LabelTable,
    ort_service::OrtClassifier,
    pipeline::InferencePipeline,
    server::{HttpServer, SharedState},
    storage::UploadStore,
    telemetry::Metrics,
};
use anyhow::Context;
use std::sync::Arc;

/// Loads every startup dependency, then serves until a shutdown signal.
///
/// Nothing is bound before the model has loaded, so a broken model never serves traffic.
pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let labels = Arc::new(
        LabelTable::from_config(&config.labels).context("failed to build the label table")?,
    );
    tracing::info!("Loaded {} class labels", labels.len());

    let classifier: Arc<dyn Classifier> = Arc::new(
        OrtClassifier::new(&config.model, labels.len())
            .context("failed to instantiate ort classifier")?,
    );
    let pipeline = InferencePipeline::from_config(&config, classifier, labels);

    let store = UploadStore::from_config(&config.storage);
    store
        .ensure_dir()
        .await
        .with_context(|| format!("failed to create upload directory {:?}", store.dir()))?;

    let state = SharedState {
        pipeline: Arc::new(pipeline),
        store,
        metrics: Arc::new(Metrics::new()?),
    };

    let server = HttpServer::new(state, &config).await?;
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
