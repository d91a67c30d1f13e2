//! Route handlers and router assembly.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_TYPE, IF_MATCH};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use quillvault_common::manifest::file_object_key;
use quillvault_common::protocol::{
    DeleteFilesRequest, DeleteFilesResponse, DownloadUrlRequest, HealthResponse, ManifestResponse,
    PresignedUrlResponse, PutManifestResponse, PutObjectResponse, UploadUrlRequest,
};
use quillvault_common::{manifest, path, Error, SyncManifest, MANIFEST_KEY};
use quillvault_store::WritePrecondition;

use crate::auth::DeviceIdentity;
use crate::error::ApiError;
use crate::state::AppState;

/// Assemble the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/manifest", get(get_manifest).put(put_manifest))
        .route("/files/upload-url", post(upload_url))
        .route("/files/download-url", post(download_url))
        .route("/files/delete", post(delete_files))
        .route("/objects/{*key}", get(get_object).put(put_object))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

async fn get_manifest(
    State(state): State<AppState>,
    device: DeviceIdentity,
) -> Result<Json<ManifestResponse>, ApiError> {
    debug!(device = %device.device_id, "manifest fetch");

    match state.store.get(MANIFEST_KEY).await? {
        Some(object) => {
            let manifest = SyncManifest::from_json(std::str::from_utf8(&object.data).map_err(
                |_| ApiError::internal("stored manifest is not valid UTF-8"),
            )?)
            .map_err(|err| ApiError::internal(format!("stored manifest is corrupt: {err}")))?;
            Ok(Json(ManifestResponse {
                manifest,
                etag: Some(object.etag),
            }))
        }
        None => Ok(Json(ManifestResponse {
            manifest: SyncManifest::empty(),
            etag: None,
        })),
    }
}

async fn put_manifest(
    State(state): State<AppState>,
    device: DeviceIdentity,
    headers: HeaderMap,
    payload: Result<Json<SyncManifest>, JsonRejection>,
) -> Result<Json<PutManifestResponse>, ApiError> {
    let Json(manifest) = payload.map_err(bad_json)?;
    manifest.validate()?;

    let if_match = headers
        .get(IF_MATCH)
        .and_then(|value| value.to_str().ok())
        .map(normalize_etag);

    let data = manifest
        .to_json()
        .map_err(|err| ApiError::internal(err.to_string()))?
        .into_bytes();

    let precondition = match &if_match {
        Some(etag) => WritePrecondition::Match(etag.clone()),
        None => WritePrecondition::Absent,
    };

    let etag = state
        .store
        .put_conditional(MANIFEST_KEY, data, precondition)
        .await
        .map_err(|err| match (&if_match, err) {
            (Some(_), Error::PreconditionFailed(msg)) => ApiError::precondition_failed(msg),
            (None, Error::PreconditionFailed(_)) => ApiError::precondition_required(
                "manifest already exists; If-Match is required".to_string(),
            ),
            (_, other) => ApiError::from(other),
        })?;

    info!(device = %device.device_id, files = manifest.len(), "manifest committed");
    Ok(Json(PutManifestResponse { ok: true, etag }))
}

async fn upload_url(
    State(state): State<AppState>,
    device: DeviceIdentity,
    payload: Result<Json<UploadUrlRequest>, JsonRejection>,
) -> Result<Json<PresignedUrlResponse>, ApiError> {
    let Json(request) = payload.map_err(bad_json)?;
    path::validate(&request.path)?;
    if !manifest::is_valid_hash(&request.hash) {
        return Err(ApiError::bad_request(format!(
            "malformed content hash for {}",
            request.path
        )));
    }

    debug!(device = %device.device_id, path = %request.path, "upload URL issued");
    let signed = state.presigner.sign("PUT", &file_object_key(&request.path))?;
    Ok(Json(signed))
}

async fn download_url(
    State(state): State<AppState>,
    device: DeviceIdentity,
    payload: Result<Json<DownloadUrlRequest>, JsonRejection>,
) -> Result<Json<PresignedUrlResponse>, ApiError> {
    let Json(request) = payload.map_err(bad_json)?;
    path::validate(&request.path)?;

    debug!(device = %device.device_id, path = %request.path, "download URL issued");
    let signed = state.presigner.sign("GET", &file_object_key(&request.path))?;
    Ok(Json(signed))
}

async fn delete_files(
    State(state): State<AppState>,
    device: DeviceIdentity,
    payload: Result<Json<DeleteFilesRequest>, JsonRejection>,
) -> Result<Json<DeleteFilesResponse>, ApiError> {
    let Json(request) = payload.map_err(bad_json)?;
    if request.paths.is_empty() {
        return Err(ApiError::bad_request("no paths to delete"));
    }
    // One invalid path rejects the whole batch.
    for raw in &request.paths {
        path::validate(raw)?;
    }

    let keys: Vec<String> = request.paths.iter().map(|p| file_object_key(p)).collect();
    let deleted = state.store.delete_many(&keys).await?;

    info!(device = %device.device_id, requested = keys.len(), deleted, "bulk delete");
    Ok(Json(DeleteFilesResponse { ok: true, deleted }))
}

#[derive(Debug, Deserialize)]
struct PresignQuery {
    expires: i64,
    sig: String,
}

async fn put_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<PresignQuery>,
    body: Bytes,
) -> Result<Json<PutObjectResponse>, ApiError> {
    state
        .presigner
        .verify("PUT", &key, query.expires, &query.sig)
        .map_err(|err| ApiError::unauthorized(err.to_string()))?;

    let etag = state.store.put(&key, body.to_vec()).await?;
    debug!(key, bytes = body.len(), "object stored");
    Ok(Json(PutObjectResponse { ok: true, etag }))
}

async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<PresignQuery>,
) -> Result<Response, ApiError> {
    state
        .presigner
        .verify("GET", &key, query.expires, &query.sig)
        .map_err(|err| ApiError::unauthorized(err.to_string()))?;

    match state.store.get(&key).await? {
        Some(object) => Ok((
            [(CONTENT_TYPE, "application/octet-stream")],
            object.data,
        )
            .into_response()),
        None => Err(ApiError::not_found(format!("no such object: {key}"))),
    }
}

/// Strip optional quotes from an `If-Match` value.
fn normalize_etag(raw: &str) -> String {
    raw.trim().trim_matches('"').to_string()
}

fn bad_json(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request(format!("bad request body: {rejection}"))
}
