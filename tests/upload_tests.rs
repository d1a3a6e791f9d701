mod common;

use axum::extract::{Multipart, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use common::encoded_image;
use image::{GenericImageView, ImageFormat};
use media_ingest::upload::UploadResponseBody;
use media_ingest::{
    CancellationToken, CompressionOptions, EntityType, MediaError, MediaFile,
    MediaUploadOrchestrator, ProgressCallback, ProgressUploader, UploadForm, UploadProgress,
    UploadRequest,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// One multipart request as the server saw it.
#[derive(Debug, Clone, Default)]
struct Received {
    authorization: Option<String>,
    part_order: Vec<String>,
    fields: HashMap<String, String>,
    file_name: Option<String>,
    content_type: Option<String>,
    file: Vec<u8>,
}

type Log = Arc<Mutex<Vec<Received>>>;

async fn record(log: &Log, headers: &HeaderMap, mut multipart: Multipart) -> Received {
    let mut received = Received {
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        ..Received::default()
    };

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or("").to_string();
        received.part_order.push(name.clone());
        if name == "file" {
            received.file_name = field.file_name().map(String::from);
            received.content_type = field.content_type().map(String::from);
            received.file = field.bytes().await.unwrap().to_vec();
        } else {
            let value = field.text().await.unwrap();
            received.fields.insert(name, value);
        }
    }

    log.lock().unwrap().push(received.clone());
    received
}

async fn echo_path(State(log): State<Log>, headers: HeaderMap, multipart: Multipart) -> Json<Value> {
    let received = record(&log, &headers, multipart).await;
    Json(json!({ "success": true, "path": received.fields.get("path") }))
}

async fn relocate(State(log): State<Log>, headers: HeaderMap, multipart: Multipart) -> Json<Value> {
    record(&log, &headers, multipart).await;
    Json(json!({ "success": true, "path": "/storage/images/properties/42/server-chosen.jpg" }))
}

async fn image_only(State(log): State<Log>, headers: HeaderMap, multipart: Multipart) -> Json<Value> {
    record(&log, &headers, multipart).await;
    Json(json!({ "image": "/storage/images/users/1/avatar-x.png" }))
}

async fn garbage(State(log): State<Log>, headers: HeaderMap, multipart: Multipart) -> &'static str {
    record(&log, &headers, multipart).await;
    "<html>ok</html>"
}

async fn too_large(
    State(log): State<Log>,
    headers: HeaderMap,
    multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    record(&log, &headers, multipart).await;
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(json!({ "success": false, "message": "File too large" })),
    )
}

async fn broken(State(log): State<Log>, headers: HeaderMap, multipart: Multipart) -> StatusCode {
    record(&log, &headers, multipart).await;
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(10)).await;
    Json(json!({ "success": true }))
}

async fn spawn_server() -> (String, Log) {
    let log = Log::default();
    let app = Router::new()
        .route("/upload", post(echo_path))
        .route("/relocate", post(relocate))
        .route("/image-only", post(image_only))
        .route("/garbage", post(garbage))
        .route("/too-large", post(too_large))
        .route("/broken", post(broken))
        .route("/slow", post(slow))
        .with_state(Arc::clone(&log));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), log)
}

fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<u8>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callback: ProgressCallback =
        Arc::new(move |p: UploadProgress| sink.lock().unwrap().push(p.percent));
    (callback, events)
}

fn assert_monotonic_to_100(events: &[u8]) {
    assert!(!events.is_empty());
    assert!(events.windows(2).all(|w| w[0] <= w[1]), "not monotonic: {:?}", events);
    assert_eq!(events.last(), Some(&100));
}

fn raw_form(name: &str, len: usize) -> UploadForm {
    let bytes = (0..len).map(|i| (i % 251) as u8).collect();
    UploadForm::new(MediaFile::new(name, bytes))
        .text("path", format!("/storage/images/properties/42/{}", name))
        .text("entity_type", "properties")
        .text("entity_id", "42")
}

fn orchestrator(base: &str, route: &str) -> MediaUploadOrchestrator {
    MediaUploadOrchestrator::new(ProgressUploader::default(), format!("{}{}", base, route))
        .with_public_base_url(Some("https://cdn.example.com".to_string()))
}

#[tokio::test]
async fn test_upload_streams_with_monotonic_progress() {
    let (base, log) = spawn_server().await;
    let (callback, events) = recorder();

    let response = ProgressUploader::default()
        .upload(
            &format!("{}/upload", base),
            raw_form("front.jpg", 300_000),
            None,
            Some(callback),
            None,
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(
        response.body.path.as_deref(),
        Some("/storage/images/properties/42/front.jpg")
    );

    let events = events.lock().unwrap();
    assert!(events.len() > 1);
    assert_monotonic_to_100(&events);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    let received = &log[0];
    assert_eq!(received.part_order[0], "file");
    assert_eq!(received.file.len(), 300_000);
    assert_eq!(received.file_name.as_deref(), Some("front.jpg"));
    assert_eq!(received.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(received.fields["entity_type"], "properties");
    assert_eq!(received.fields["entity_id"], "42");
    assert!(received.authorization.is_none());
}

#[tokio::test]
async fn test_upload_sends_bearer_token() {
    let (base, log) = spawn_server().await;

    ProgressUploader::default()
        .upload(
            &format!("{}/upload", base),
            raw_form("front.jpg", 1_000),
            Some("secret-token"),
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        log.lock().unwrap()[0].authorization.as_deref(),
        Some("Bearer secret-token")
    );
}

#[tokio::test]
async fn test_upload_tolerates_non_json_success_body() {
    let (base, _log) = spawn_server().await;

    let response = ProgressUploader::default()
        .upload(
            &format!("{}/garbage", base),
            raw_form("front.jpg", 1_000),
            None,
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, UploadResponseBody::default());
}

#[tokio::test]
async fn test_upload_surfaces_server_message() {
    let (base, _log) = spawn_server().await;

    let err = ProgressUploader::default()
        .upload(
            &format!("{}/too-large", base),
            raw_form("front.jpg", 1_000),
            None,
            None,
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(413));
    assert_eq!(err.to_string(), "File too large");
}

#[tokio::test]
async fn test_upload_generic_message_without_body() {
    let (base, _log) = spawn_server().await;

    let err = ProgressUploader::default()
        .upload(
            &format!("{}/broken", base),
            raw_form("front.jpg", 1_000),
            None,
            None,
            None,
        )
        .await
        .unwrap_err();

    match err {
        MediaError::HttpStatus { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "upload failed with status 500");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_upload_network_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = ProgressUploader::new(Duration::from_secs(5))
        .unwrap()
        .upload(
            &format!("http://{}/upload", addr),
            raw_form("front.jpg", 1_000),
            None,
            None,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::Network(_)), "{:?}", err);
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn test_upload_cancelled_before_start() {
    let (base, log) = spawn_server().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ProgressUploader::default()
        .upload(
            &format!("{}/upload", base),
            raw_form("front.jpg", 1_000),
            None,
            None,
            Some(&cancel),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::Aborted));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_cancelled_in_flight() {
    let (base, _log) = spawn_server().await;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let err = ProgressUploader::default()
        .upload(
            &format!("{}/slow", base),
            raw_form("front.jpg", 1_000),
            None,
            None,
            Some(&cancel),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::Aborted));
}

#[tokio::test]
async fn test_upload_single_compresses_and_addresses() {
    let (base, log) = spawn_server().await;
    let original = encoded_image(2400, 1200, ImageFormat::Jpeg);
    let (callback, events) = recorder();

    let request = UploadRequest::new(EntityType::Properties, 42)
        .filename("main.jpg")
        .on_progress(callback);
    let result = orchestrator(&base, "/upload")
        .with_auth_token(Some("secret-token".to_string()))
        .upload_single(MediaFile::new("front.jpg", original), &request, None)
        .await
        .unwrap();

    assert_eq!(result.path, "/storage/images/properties/42/main.jpg");
    assert_eq!(
        result.url,
        "https://cdn.example.com/storage/images/properties/42/main.jpg"
    );
    assert_eq!(result.filename, "main.jpg");
    assert_monotonic_to_100(&events.lock().unwrap());

    let log = log.lock().unwrap();
    let received = &log[0];
    assert_eq!(received.fields["path"], result.path);
    assert_eq!(received.fields["entity_type"], "properties");
    assert_eq!(received.fields["entity_id"], "42");
    assert_eq!(received.authorization.as_deref(), Some("Bearer secret-token"));

    let uploaded = image::load_from_memory(&received.file).unwrap();
    assert_eq!(uploaded.dimensions(), (1920, 960));
}

#[tokio::test]
async fn test_upload_single_prefers_server_path() {
    let (base, _log) = spawn_server().await;
    let request = UploadRequest::new(EntityType::Properties, 42).without_compression();

    let result = orchestrator(&base, "/relocate")
        .upload_single(MediaFile::new("front.jpg", vec![1, 2, 3]), &request, None)
        .await
        .unwrap();

    assert_eq!(result.path, "/storage/images/properties/42/server-chosen.jpg");
    assert_eq!(result.filename, "server-chosen.jpg");
    assert_eq!(
        result.url,
        "https://cdn.example.com/storage/images/properties/42/server-chosen.jpg"
    );
}

#[tokio::test]
async fn test_upload_single_falls_back_to_image_field() {
    let (base, _log) = spawn_server().await;
    let request = UploadRequest::new(EntityType::Users, 1).without_compression();

    let result = orchestrator(&base, "/image-only")
        .upload_single(MediaFile::new("me.png", vec![1, 2, 3]), &request, None)
        .await
        .unwrap();

    assert_eq!(result.path, "/storage/images/users/1/avatar-x.png");
    assert_eq!(result.filename, "avatar-x.png");
}

#[tokio::test]
async fn test_upload_single_generates_filename() {
    let (base, _log) = spawn_server().await;
    let request = UploadRequest::new(EntityType::Users, 7).without_compression();

    let result = orchestrator(&base, "/upload")
        .upload_single(MediaFile::new("My Photo.png", vec![1, 2, 3]), &request, None)
        .await
        .unwrap();

    assert!(result.path.starts_with("/storage/images/users/7/My-Photo-"));
    assert!(result.filename.starts_with("My-Photo-"));
    assert!(result.filename.ends_with(".png"));
}

#[tokio::test]
async fn test_upload_single_uploads_original_when_compression_fails() {
    let (base, log) = spawn_server().await;
    let bytes = b"definitely not a jpeg".to_vec();
    let request = UploadRequest::new(EntityType::Posts, 3).filename("featured.jpg");

    orchestrator(&base, "/upload")
        .upload_single(MediaFile::new("cover.jpg", bytes.clone()), &request, None)
        .await
        .unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log[0].file, bytes);
    assert_eq!(log[0].file_name.as_deref(), Some("cover.jpg"));
}

#[tokio::test]
async fn test_upload_single_renames_on_format_change() {
    let (base, log) = spawn_server().await;
    let options = CompressionOptions::default().with_format(Some("jpeg".to_string()));
    let request = UploadRequest::new(EntityType::Agents, 9).compression_options(options);

    let result = orchestrator(&base, "/upload")
        .upload_single(
            MediaFile::new("plan.png", encoded_image(64, 64, ImageFormat::Png)),
            &request,
            None,
        )
        .await
        .unwrap();

    assert!(result.filename.ends_with(".jpg"));
    let log = log.lock().unwrap();
    assert_eq!(log[0].file_name.as_deref(), Some("plan.jpg"));
    assert_eq!(log[0].content_type.as_deref(), Some("image/jpeg"));
}

#[tokio::test]
async fn test_upload_single_propagates_rejection() {
    let (base, _log) = spawn_server().await;
    let request = UploadRequest::new(EntityType::Properties, 42).without_compression();

    let err = orchestrator(&base, "/too-large")
        .upload_single(MediaFile::new("front.jpg", vec![1, 2, 3]), &request, None)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(413));
}

#[tokio::test]
async fn test_upload_many_suffixes_and_aggregates_progress() {
    let (base, log) = spawn_server().await;
    let (callback, events) = recorder();
    let request = UploadRequest::new(EntityType::Properties, 42)
        .without_compression()
        .on_progress(callback);

    let files = vec![
        MediaFile::new("front.jpg", vec![7; 200_000]),
        MediaFile::new("back.jpg", vec![8; 150_000]),
        MediaFile::new("garden.jpg", vec![9; 100_000]),
    ];
    let results = orchestrator(&base, "/upload")
        .upload_many(files, &request, None)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    for (index, result) in results.iter().enumerate() {
        assert!(
            result.filename.ends_with(&format!("-{}.jpg", index)),
            "{}",
            result.filename
        );
        assert!(result.path.starts_with("/storage/images/properties/42/"));
    }
    assert_monotonic_to_100(&events.lock().unwrap());

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].file.len(), 200_000);
    assert_eq!(log[2].file.len(), 100_000);
}

#[tokio::test]
async fn test_upload_many_validates_all_names_first() {
    let (base, log) = spawn_server().await;
    let request = UploadRequest::new(EntityType::Properties, 42).without_compression();

    let files = vec![
        MediaFile::new("front.jpg", vec![1, 2, 3]),
        MediaFile::new("contract.pdf", vec![4, 5, 6]),
    ];
    let err = orchestrator(&base, "/upload")
        .upload_many(files, &request, None)
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::InvalidFilename(name) if name == "contract.pdf"));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_many_stops_when_cancelled() {
    let (base, log) = spawn_server().await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let request = UploadRequest::new(EntityType::Posts, 1).without_compression();

    let err = orchestrator(&base, "/upload")
        .upload_many(
            vec![MediaFile::new("a.jpg", vec![1]), MediaFile::new("b.jpg", vec![2])],
            &request,
            Some(&cancel),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::Aborted));
    assert!(log.lock().unwrap().is_empty());
}
