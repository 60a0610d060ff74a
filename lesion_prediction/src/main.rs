use lesion_prediction::{config, start_app, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::get_configuration()?;
    telemetry::init_tracing(&config.log_level);

    start_app(config).await
}
