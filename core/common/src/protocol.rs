//! Wire protocol: request/response bodies and the transfer constants both
//! sides rely on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::manifest::SyncManifest;

/// Default bounded fan-out of the transfer queue.
pub const MAX_CONCURRENT_TRANSFERS: usize = 5;

/// How many times a failed transfer is retried.
pub const MAX_RETRIES: u32 = 3;

/// Base delay for exponential transfer backoff, in milliseconds.
pub const RETRY_BACKOFF_MS: u64 = 1000;

/// How many times a cycle restarts after losing the manifest commit race.
pub const MAX_MANIFEST_RETRIES: u32 = 3;

/// Lifetime of a presigned URL, in seconds.
pub const PRESIGNED_URL_EXPIRY_SECS: i64 = 900;

/// `GET /health` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// `GET /manifest` response. `etag` is `null` until the first commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResponse {
    pub manifest: SyncManifest,
    pub etag: Option<String>,
}

/// `PUT /manifest` success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutManifestResponse {
    pub ok: bool,
    pub etag: String,
}

/// `POST /files/upload-url` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    pub path: String,
    pub hash: String,
}

/// `POST /files/download-url` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrlRequest {
    pub path: String,
}

/// Presigned URL response for either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrlResponse {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// `POST /files/delete` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFilesRequest {
    pub paths: Vec<String>,
}

/// `POST /files/delete` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFilesResponse {
    pub ok: bool,
    pub deleted: usize,
}

/// `PUT /objects/{key}` success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutObjectResponse {
    pub ok: bool,
    pub etag: String,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
}
