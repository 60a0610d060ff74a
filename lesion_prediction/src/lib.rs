mod app;
mod ort_service;

pub mod classifier;
pub mod config;
pub mod decision;
pub mod decoder;
pub mod labels;
pub mod pipeline;
pub mod preprocess;
pub mod response;
pub mod routes;
pub mod server;
pub mod storage;
pub mod telemetry;

pub use app::start_app;
pub use ort_service::{ModelLoadError, OrtClassifier};
