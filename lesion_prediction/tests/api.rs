use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use image::{ImageBuffer, Rgb};
use lesion_prediction::{
    classifier::{Classifier, InferenceError, ProbabilityVector},
    config::{ColorOrder, StorageConfig},
    decision::DecisionPolicy,
    decoder::ImageDecoder,
    labels::LabelTable,
    pipeline::InferencePipeline,
    preprocess::{InputTensor, Preprocessor},
    response::NO_RISK_MESSAGE,
    server::{build_router, SharedState},
    storage::UploadStore,
    telemetry::Metrics,
};
use serde_json::{json, Value};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tower::ServiceExt;

const BOUNDARY: &str = "lesion-test-boundary";

struct StubClassifier {
    probabilities: Vec<f32>,
    calls: AtomicUsize,
}

impl StubClassifier {
    fn new(probabilities: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            probabilities,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for StubClassifier {
    fn infer(&self, _tensor: &InputTensor) -> Result<ProbabilityVector, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProbabilityVector::new(self.probabilities.clone()))
    }
}

struct TestApp {
    router: Router,
    upload_dir: PathBuf,
}

const DEFAULT_UPLOAD_LIMIT: usize = 16 * 1024 * 1024;

fn spawn_app(classifier: Arc<StubClassifier>) -> TestApp {
    spawn_app_with_limit(classifier, DEFAULT_UPLOAD_LIMIT)
}

fn spawn_app_with_limit(classifier: Arc<StubClassifier>, max_upload_bytes: usize) -> TestApp {
    let root = std::env::temp_dir().join(format!("lesion-api-{}", rand::random::<u64>()));
    let upload_dir = root.join("uploads");
    let assets_dir = root.join("assets");
    std::fs::create_dir_all(&upload_dir).unwrap();
    std::fs::create_dir_all(&assets_dir).unwrap();
    std::fs::write(assets_dir.join("logo.svg"), "<svg/>").unwrap();
    let index_file = root.join("index.html");
    std::fs::write(&index_file, "<html>lesion check</html>").unwrap();

    let storage_config = StorageConfig {
        upload_dir: upload_dir.clone(),
        public_prefix: "/static/uploads".to_string(),
        assets_dir,
        index_file,
        max_upload_bytes,
    };

    let pipeline = InferencePipeline::new(
        ImageDecoder::new(ColorOrder::Bgr),
        Preprocessor::new(224),
        classifier,
        DecisionPolicy::new(70.0),
        Arc::new(LabelTable::default()),
    );

    let state = SharedState {
        pipeline: Arc::new(pipeline),
        store: UploadStore::from_config(&storage_config),
        metrics: Arc::new(Metrics::new().unwrap()),
    };

    TestApp {
        router: build_router(state, &storage_config),
        upload_dir,
    }
}

fn jpeg_bytes() -> Vec<u8> {
    let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(320, 240, Rgb([150, 90, 70]));
    let mut image_data: Vec<u8> = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut image_data),
        image::ImageFormat::Jpeg,
    )
    .unwrap();
    image_data
}

/// Random pixels barely compress, so the encoded PNG stays close to 3 bytes per pixel.
fn noisy_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_fn(width, height, |_, _| {
        Rgb(rand::random::<[u8; 3]>())
    });
    let mut image_data: Vec<u8> = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut image_data),
        image::ImageFormat::Png,
    )
    .unwrap();
    image_data
}

fn multipart_body(field: &str, filename: Option<&str>, contents: &[u8]) -> Vec<u8> {
    let disposition = match filename {
        Some(filename) => format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n",
            field, filename
        ),
        None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", field),
    };

    let mut body = format!("--{}\r\n{}\r\n", BOUNDARY, disposition).into_bytes();
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn predict_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(router, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_confident_prediction_is_reported() {
    let classifier = StubClassifier::new(vec![0.05, 0.05, 0.05, 0.05, 0.05, 0.7, 0.05]);
    let app = spawn_app(classifier.clone());

    let body = multipart_body("file", Some("mole.jpg"), &jpeg_bytes());
    let (status, value) = send_json(&app.router, predict_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["label"], "nv");
    assert_eq!(value["confidence"], "70.00%");
    assert_eq!(value["file_path"], "/static/uploads/mole.jpg");
    assert!(value["info"].as_str().unwrap().starts_with("NV"));
    assert!(value.get("message").is_none());
    assert_eq!(classifier.calls(), 1);
    assert!(app.upload_dir.join("mole.jpg").exists());
}

#[tokio::test]
async fn test_low_confidence_returns_no_risk_message() {
    let classifier = StubClassifier::new(vec![0.1, 0.1, 0.1, 0.1, 0.1, 0.15, 0.35]);
    let app = spawn_app(classifier.clone());

    let body = multipart_body("file", Some("spot.jpg"), &jpeg_bytes());
    let (status, value) = send_json(&app.router, predict_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        value,
        json!({
            "message": NO_RISK_MESSAGE,
            "file_path": "/static/uploads/spot.jpg",
        })
    );
    assert_eq!(classifier.calls(), 1);
}

#[tokio::test]
async fn test_missing_file_field_is_a_client_error() {
    let classifier = StubClassifier::new(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let app = spawn_app(classifier.clone());

    let body = multipart_body("comment", None, b"no image here");
    let (status, value) = send_json(&app.router, predict_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value, json!({ "error": "No file uploaded" }));
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_file_field_without_filename_is_not_an_upload() {
    let classifier = StubClassifier::new(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let app = spawn_app(classifier.clone());

    let body = multipart_body("file", None, &jpeg_bytes());
    let (status, value) = send_json(&app.router, predict_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value, json!({ "error": "No file uploaded" }));
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_large_image_is_accepted() {
    let classifier = StubClassifier::new(vec![0.05, 0.05, 0.05, 0.05, 0.05, 0.7, 0.05]);
    let app = spawn_app(classifier.clone());

    let image = noisy_png_bytes(1200, 1000);
    assert!(image.len() > 2 * 1024 * 1024, "{} bytes", image.len());

    let body = multipart_body("file", Some("large.png"), &image);
    let (status, value) = send_json(&app.router, predict_request(body)).await;

    assert_eq!(status, StatusCode::OK, "{}", value);
    assert_eq!(value["label"], "nv");
    assert_eq!(value["file_path"], "/static/uploads/large.png");
    assert_eq!(classifier.calls(), 1);
    assert_eq!(
        std::fs::metadata(app.upload_dir.join("large.png")).unwrap().len(),
        image.len() as u64
    );
}

#[tokio::test]
async fn test_upload_over_limit_is_payload_too_large() {
    let classifier = StubClassifier::new(vec![0.05, 0.05, 0.05, 0.05, 0.05, 0.7, 0.05]);
    let app = spawn_app_with_limit(classifier.clone(), 64 * 1024);

    let body = multipart_body("file", Some("huge.png"), &noisy_png_bytes(200, 200));
    let (status, value) = send_json(&app.router, predict_request(body)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!value["error"].as_str().unwrap().is_empty(), "{}", value);
    assert_eq!(classifier.calls(), 0);
    assert!(!app.upload_dir.join("huge.png").exists());
}

#[tokio::test]
async fn test_non_multipart_request_is_a_client_error() {
    let classifier = StubClassifier::new(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let app = spawn_app(classifier.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/api/predict")
        .body(Body::empty())
        .unwrap();
    let (status, value) = send_json(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value, json!({ "error": "No file uploaded" }));
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_empty_filename_is_a_client_error() {
    let classifier = StubClassifier::new(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let app = spawn_app(classifier.clone());

    let body = multipart_body("file", Some(""), b"");
    let (status, value) = send_json(&app.router, predict_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value, json!({ "error": "No file selected" }));
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_corrupted_image_is_a_server_error() {
    let classifier = StubClassifier::new(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let app = spawn_app(classifier.clone());

    let body = multipart_body("file", Some("broken.jpg"), b"this is not an image");
    let (status, value) = send_json(&app.router, predict_request(body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = value["error"].as_str().unwrap();
    assert!(error.starts_with("Error processing image:"), "{}", error);
    assert!(error.contains("broken.jpg"), "{}", error);
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_upload_is_served_back() {
    let classifier = StubClassifier::new(vec![0.05, 0.05, 0.05, 0.05, 0.05, 0.7, 0.05]);
    let app = spawn_app(classifier);
    let image = jpeg_bytes();

    let body = multipart_body("file", Some("served.jpg"), &image);
    let (_, value) = send_json(&app.router, predict_request(body)).await;
    let file_path = value["file_path"].as_str().unwrap().to_string();

    let request = Request::builder()
        .uri(file_path)
        .body(Body::empty())
        .unwrap();
    let (status, served) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(served, image);
}

#[tokio::test]
async fn test_traversal_filename_stays_in_upload_dir() {
    let classifier = StubClassifier::new(vec![0.05, 0.05, 0.05, 0.05, 0.05, 0.7, 0.05]);
    let app = spawn_app(classifier);

    let body = multipart_body("file", Some("../../outside.jpg"), &jpeg_bytes());
    let (status, value) = send_json(&app.router, predict_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["file_path"], "/static/uploads/outside.jpg");
    assert!(app.upload_dir.join("outside.jpg").exists());
}

#[tokio::test]
async fn test_static_pages_and_health() {
    let classifier = StubClassifier::new(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let app = spawn_app(classifier);

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<html>lesion check</html>");

    let request = Request::builder()
        .uri("/assets/logo.svg")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<svg/>");

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, value) = send_json(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, json!({ "status": "Available" }));
}

#[tokio::test]
async fn test_metrics_count_predictions() {
    let classifier = StubClassifier::new(vec![0.05, 0.05, 0.05, 0.05, 0.05, 0.7, 0.05]);
    let app = spawn_app(classifier);

    let body = multipart_body("file", Some("counted.jpg"), &jpeg_bytes());
    let (status, _) = send_json(&app.router, predict_request(body)).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    let text = String::from_utf8(body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("prediction_requests_total"), "{}", text);
    assert!(text.contains("reportable"), "{}", text);
}
