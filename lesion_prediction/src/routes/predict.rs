use crate::{
    pipeline::PipelineError,
    response::PredictionResponse,
    server::SharedState,
    storage::{sanitize_filename, StorageError},
};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

pub const PREDICT_ROUTE: &str = "/api/predict";
const FILE_FIELD: &str = "file";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No file uploaded")]
    NoFileSupplied,
    #[error("No file selected")]
    EmptyFilename,
    #[error("{}", .0.body_text())]
    Multipart(#[from] MultipartError),
    #[error("Error storing upload: {0}")]
    Storage(#[from] StorageError),
    #[error("Error processing image: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Error processing image: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoFileSupplied | ApiError::EmptyFilename => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
            ApiError::Storage(_) | ApiError::Pipeline(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn outcome(&self) -> &'static str {
        if self.status().is_client_error() {
            "client_error"
        } else {
            "server_error"
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Prediction failed: {}", self);
        } else {
            tracing::warn!("Rejected prediction request: {}", self);
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

struct Upload {
    filename: String,
    contents: Vec<u8>,
}

/// Finds the `file` part of the form. Other parts, and a `file` part sent as a
/// plain form value without a filename, are ignored.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(raw_name) = field.file_name() else {
            continue;
        };

        let filename = sanitize_filename(raw_name).ok_or(ApiError::EmptyFilename)?;
        let contents = field.bytes().await?.to_vec();
        return Ok(Upload { filename, contents });
    }

    Err(ApiError::NoFileSupplied)
}

#[instrument(skip(state, multipart))]
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let result = handle_predict(&state, multipart).await;

    let outcome = match &result {
        Ok(response) if response.is_low_confidence() => "low_confidence",
        Ok(_) => "reportable",
        Err(e) => e.outcome(),
    };
    state.metrics.record_request(PREDICT_ROUTE, outcome);

    result.map(Json)
}

async fn handle_predict(
    state: &SharedState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PredictionResponse, ApiError> {
    let multipart = multipart.map_err(|rejection| {
        tracing::debug!("Request is not a multipart upload: {}", rejection);
        ApiError::NoFileSupplied
    })?;

    let upload = read_upload(multipart).await?;
    let stored = state.store.save(&upload.filename, &upload.contents).await?;
    tracing::info!(
        "Received {} ({} bytes)",
        stored.public_path,
        upload.contents.len()
    );

    let pipeline = state.pipeline.clone();
    let start = Instant::now();
    let response = tokio::task::spawn_blocking(move || {
        pipeline.run(&stored.path, &stored.public_path)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    state
        .metrics
        .record_prediction_duration(start.elapsed().as_millis() as u64, PREDICT_ROUTE);

    Ok(response)
}
