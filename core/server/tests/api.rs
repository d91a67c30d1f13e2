//! Service-level tests driven through the router with `tower::oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use quillvault_common::token::device_token;
use quillvault_server::{router, AppState};
use quillvault_store::{MemoryStore, ObjectStore};

const SECRET: &str = "shared-test-secret";
const BASE_URL: &str = "https://sync.example.test";

fn service() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), SECRET, BASE_URL);
    (router(state), store)
}

fn bearer() -> String {
    format!("Bearer {}", device_token("laptop", SECRET))
}

fn manifest_body(files: &[(&str, &str)]) -> Value {
    let mut map = serde_json::Map::new();
    for (path, hash) in files {
        map.insert(
            path.to_string(),
            json!({
                "path": path,
                "hash": hash.repeat(64),
                "mtime": 1_700_000_000_000i64,
                "size": 10,
                "lastModifiedBy": "laptop",
            }),
        );
    }
    json!({
        "files": map,
        "lastUpdated": "2026-01-01T00:00:00Z",
        "lastUpdatedBy": "laptop",
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(path: &str, authed: bool) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if authed {
        builder = builder.header("Authorization", bearer());
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("Authorization", bearer())
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn put_manifest(body: Value, if_match: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("PUT")
        .uri("/manifest")
        .header("Authorization", bearer())
        .header("Content-Type", "application/json");
    if let Some(etag) = if_match {
        builder = builder.header("If-Match", etag);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn health_needs_no_auth() {
    let (app, _) = service();
    let (status, body) = send(&app, get("/health", false)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert!(body["version"].is_string());
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn manifest_routes_require_a_valid_token() {
    let (app, _) = service();

    let (status, _) = send(&app, get("/manifest", false)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("GET")
        .uri("/manifest")
        .header("Authorization", "Bearer not-a-token")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("token"));

    let request = Request::builder()
        .method("GET")
        .uri("/manifest")
        .header(
            "Authorization",
            format!("Bearer {}", device_token("laptop", "wrong-secret")),
        )
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_manifest_reads_as_empty_with_null_etag() {
    let (app, _) = service();
    let (status, body) = send(&app, get("/manifest", true)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["etag"], Value::Null);
    assert_eq!(body["manifest"]["files"], json!({}));
}

#[tokio::test]
async fn conditional_manifest_writes() {
    let (app, _) = service();

    // First write needs no If-Match.
    let (status, body) = send(&app, put_manifest(manifest_body(&[("a.md", "a")]), None)).await;
    assert_eq!(status, StatusCode::OK);
    let etag1 = body["etag"].as_str().unwrap().to_string();

    // A second unconditional write is refused: the caller has not seen the
    // current revision.
    let (status, _) = send(&app, put_manifest(manifest_body(&[("b.md", "b")]), None)).await;
    assert_eq!(status, StatusCode::PRECONDITION_REQUIRED);

    // A stale If-Match is refused.
    let (status, _) = send(
        &app,
        put_manifest(manifest_body(&[("b.md", "b")]), Some("stale-etag")),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);

    // The current ETag wins, quoted or bare.
    let quoted = format!("\"{etag1}\"");
    let (status, body) = send(
        &app,
        put_manifest(manifest_body(&[("b.md", "b")]), Some(&quoted)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let etag2 = body["etag"].as_str().unwrap();
    assert_ne!(etag1, etag2);

    // The committed revision is what reads come back with.
    let (status, body) = send(&app, get("/manifest", true)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["etag"].as_str().unwrap(), etag2);
    assert!(body["manifest"]["files"]["b.md"].is_object());
}

#[tokio::test]
async fn manifest_body_is_validated() {
    let (app, _) = service();

    // Entry keyed under a different path than it describes.
    let mut body = manifest_body(&[("a.md", "a")]);
    body["files"]["a.md"]["path"] = json!("other.md");
    let (status, response) = send(&app, put_manifest(body, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].as_str().is_some());

    // Malformed JSON.
    let request = Request::builder()
        .method("PUT")
        .uri("/manifest")
        .header("Authorization", bearer())
        .header("Content-Type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn path_validation_guards_every_file_route() {
    let (app, _) = service();

    let (status, body) = send(
        &app,
        post_json(
            "/files/upload-url",
            json!({"path": "../secrets", "hash": "a".repeat(64)}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("traversal"));

    let (status, body) = send(
        &app,
        post_json(
            "/files/upload-url",
            json!({"path": ".quillvault/manifest.json", "hash": "a".repeat(64)}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("internal"));

    let (status, body) = send(
        &app,
        post_json(
            "/files/upload-url",
            json!({"path": "notes/2024.md", "hash": "a".repeat(64)}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["url"].as_str().unwrap().contains("/objects/vault/notes/2024.md"));
    assert!(body["expiresAt"].is_string());

    let (status, _) = send(
        &app,
        post_json("/files/download-url", json!({"path": "\\windows\\path"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json(
            "/files/upload-url",
            json!({"path": "a.md", "hash": "not-a-hash"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn presigned_round_trip_moves_bytes() {
    let (app, store) = service();

    // Ask for an upload URL, then PUT bytes against it.
    let (status, body) = send(
        &app,
        post_json(
            "/files/upload-url",
            json!({"path": "notes/a.md", "hash": "a".repeat(64)}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let upload_url = url::Url::parse(body["url"].as_str().unwrap()).unwrap();
    let path_and_query = format!("{}?{}", upload_url.path(), upload_url.query().unwrap());

    let request = Request::builder()
        .method("PUT")
        .uri(&path_and_query)
        .body(Body::from("note contents"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["etag"].is_string());

    assert_eq!(
        store.get("vault/notes/a.md").await.unwrap().unwrap().data,
        b"note contents"
    );

    // And read them back through a download URL.
    let (status, body) = send(
        &app,
        post_json("/files/download-url", json!({"path": "notes/a.md"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let download_url = url::Url::parse(body["url"].as_str().unwrap()).unwrap();
    let path_and_query = format!("{}?{}", download_url.path(), download_url.query().unwrap());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(&path_and_query)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"note contents");
}

#[tokio::test]
async fn tampered_presigned_requests_are_rejected() {
    let (app, store) = service();
    store.put("vault/a.md", b"data".to_vec()).await.unwrap();

    let (_, body) = send(
        &app,
        post_json("/files/download-url", json!({"path": "a.md"})),
    )
    .await;
    let signed = url::Url::parse(body["url"].as_str().unwrap()).unwrap();
    let expires: i64 = signed
        .query_pairs()
        .find(|(k, _)| k == "expires")
        .unwrap()
        .1
        .parse()
        .unwrap();

    // Wrong signature.
    let request = Request::builder()
        .method("GET")
        .uri(format!("/objects/vault/a.md?expires={expires}&sig={}", "0".repeat(64)))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Signature for a different key.
    let sig = signed
        .query_pairs()
        .find(|(k, _)| k == "sig")
        .unwrap()
        .1
        .to_string();
    let request = Request::builder()
        .method("GET")
        .uri(format!("/objects/vault/other.md?expires={expires}&sig={sig}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bulk_delete_validates_the_whole_batch() {
    let (app, store) = service();
    store.put("vault/a.md", vec![1]).await.unwrap();
    store.put("vault/b.md", vec![2]).await.unwrap();

    let (status, body) = send(&app, post_json("/files/delete", json!({"paths": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());

    // One bad path poisons the batch; nothing is deleted.
    let (status, _) = send(
        &app,
        post_json(
            "/files/delete",
            json!({"paths": ["a.md", "../escape"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(store.get("vault/a.md").await.unwrap().is_some());

    let (status, body) = send(
        &app,
        post_json(
            "/files/delete",
            json!({"paths": ["a.md", "b.md", "missing.md"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["deleted"], json!(2));
    assert!(store.get("vault/a.md").await.unwrap().is_none());
}
