use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::collections::HashSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogLevel;

pub fn init_tracing(log_level: &LogLevel) {
    let log_level = format!("{},ort=info", log_level.as_str());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(false)
                .with_level(true)
                .with_thread_names(true),
        )
        .init();
}

pub struct Metrics {
    request_counter: Counter<u64>,
    prediction_duration: Histogram<u64>,
    pub registry: Registry,
    // Replacing the global provider must not shut this one down.
    _provider: SdkMeterProvider,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("lesion_prediction");
        global::set_meter_provider(provider.clone());

        let request_counter = meter
            .u64_counter("prediction_requests_total")
            .with_description("Total number of prediction requests by outcome")
            .build();

        let boundaries = generate_boundaries((10, 50, 100, 500, 2000));

        let prediction_duration = meter
            .u64_histogram("prediction_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of the inference pipeline in milliseconds")
            .build();

        Ok(Metrics {
            request_counter,
            prediction_duration,
            registry,
            _provider: provider,
        })
    }

    pub fn record_request(&self, route: &str, outcome: &str) {
        let attributes = vec![
            KeyValue::new("route", route.to_string()),
            KeyValue::new("outcome", outcome.to_string()),
        ];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_prediction_duration(&self, duration_ms: u64, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.prediction_duration.record(duration_ms, &attributes);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 25;
    let end_step: usize = 100;
    let tail_step: usize = 500;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_boundaries() {
        let parts = (10, 50, 100, 500, 2000);
        let get = generate_boundaries(parts);
        let expected = vec![
            10.0, 20.0, 30.0, 40.0, 50.0, 75.0, 100.0, 200.0, 300.0, 400.0, 500.0, 1000.0,
            1500.0, 2000.0,
        ];

        assert_eq!(get, expected);
    }

    #[test]
    fn test_metrics_are_exported() -> anyhow::Result<()> {
        let metrics = Metrics::new()?;
        metrics.record_request("/api/predict", "reportable");
        metrics.record_prediction_duration(42, "/api/predict");

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();

        assert!(names
            .iter()
            .any(|name| name.starts_with("prediction_requests_total")));
        assert!(names
            .iter()
            .any(|name| name.starts_with("prediction_duration_ms")));
        Ok(())
    }
}
