mod health;
mod metrics;
mod predict;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub use predict::{ApiError, PREDICT_ROUTE};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route(PREDICT_ROUTE, post(predict::predict))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
}
