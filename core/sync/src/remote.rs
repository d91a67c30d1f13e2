//! Remote manifest API client.
//!
//! [`SyncRemote`] is the engine's view of the server: manifest fetch and
//! conditional commit, file transfer, bulk delete. [`HttpRemote`] implements
//! it over the manifest service, obtaining presigned URLs for the byte
//! transfers and moving the bytes directly against them.

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use quillvault_common::protocol::{
    DeleteFilesRequest, DeleteFilesResponse, DownloadUrlRequest, ErrorResponse, ManifestResponse,
    PresignedUrlResponse, PutManifestResponse, UploadUrlRequest,
};
use quillvault_common::{Error, Result, SyncManifest, SyncPath};

/// What the sync engine needs from the server.
#[async_trait]
pub trait SyncRemote: Send + Sync {
    /// Fetch the manifest and its ETag. A store with no manifest yet yields
    /// an empty manifest and no ETag.
    async fn fetch_manifest(&self) -> Result<(SyncManifest, Option<String>)>;

    /// Commit a manifest. `if_match` must carry the ETag from the fetch
    /// that started the cycle; `None` means "create only".
    ///
    /// # Errors
    /// - `Error::PreconditionFailed` when another device committed first
    /// - `Error::PreconditionRequired` when the server demands an ETag
    async fn commit_manifest(
        &self,
        manifest: &SyncManifest,
        if_match: Option<&str>,
    ) -> Result<String>;

    /// Upload a file's bytes.
    async fn upload_file(&self, path: &SyncPath, hash: &str, data: Vec<u8>) -> Result<()>;

    /// Download a file's bytes.
    async fn download_file(&self, path: &SyncPath) -> Result<Vec<u8>>;

    /// Delete several files in one call; returns how many existed.
    async fn delete_files(&self, paths: &[String]) -> Result<usize>;
}

/// HTTP implementation of [`SyncRemote`] against the manifest service.
pub struct HttpRemote {
    http: reqwest::Client,
    endpoint: Url,
    token: String,
}

impl HttpRemote {
    /// Create a client for an endpoint and bearer token.
    pub fn new(endpoint: &str, token: impl Into<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::InvalidInput(format!("bad endpoint URL: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.endpoint
            .join(path)
            .map_err(|e| Error::InvalidInput(format!("bad endpoint URL: {e}")))
    }

    async fn upload_url(&self, path: &SyncPath, hash: &str) -> Result<PresignedUrlResponse> {
        let response = self
            .http
            .post(self.url("files/upload-url")?)
            .bearer_auth(&self.token)
            .json(&UploadUrlRequest {
                path: path.to_string(),
                hash: hash.to_string(),
            })
            .send()
            .await
            .map_err(into_network_error)?;
        parse_json(expect_success(response).await?).await
    }

    async fn download_url(&self, path: &SyncPath) -> Result<PresignedUrlResponse> {
        let response = self
            .http
            .post(self.url("files/download-url")?)
            .bearer_auth(&self.token)
            .json(&DownloadUrlRequest {
                path: path.to_string(),
            })
            .send()
            .await
            .map_err(into_network_error)?;
        parse_json(expect_success(response).await?).await
    }
}

#[async_trait]
impl SyncRemote for HttpRemote {
    async fn fetch_manifest(&self) -> Result<(SyncManifest, Option<String>)> {
        let response = self
            .http
            .get(self.url("manifest")?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(into_network_error)?;
        let body: ManifestResponse = parse_json(expect_success(response).await?).await?;
        Ok((body.manifest, body.etag))
    }

    async fn commit_manifest(
        &self,
        manifest: &SyncManifest,
        if_match: Option<&str>,
    ) -> Result<String> {
        let mut request = self
            .http
            .put(self.url("manifest")?)
            .bearer_auth(&self.token)
            .json(manifest);
        if let Some(etag) = if_match {
            request = request.header("If-Match", etag);
        }

        let response = request.send().await.map_err(into_network_error)?;
        let body: PutManifestResponse = parse_json(expect_success(response).await?).await?;
        Ok(body.etag)
    }

    async fn upload_file(&self, path: &SyncPath, hash: &str, data: Vec<u8>) -> Result<()> {
        let presigned = self.upload_url(path, hash).await?;
        let response = self
            .http
            .put(&presigned.url)
            .body(data)
            .send()
            .await
            .map_err(into_network_error)?;
        expect_success(response).await?;
        Ok(())
    }

    async fn download_file(&self, path: &SyncPath) -> Result<Vec<u8>> {
        let presigned = self.download_url(path).await?;
        let response = self
            .http
            .get(&presigned.url)
            .send()
            .await
            .map_err(into_network_error)?;
        let response = expect_success(response).await?;
        let bytes = response.bytes().await.map_err(into_network_error)?;
        Ok(bytes.to_vec())
    }

    async fn delete_files(&self, paths: &[String]) -> Result<usize> {
        let response = self
            .http
            .post(self.url("files/delete")?)
            .bearer_auth(&self.token)
            .json(&DeleteFilesRequest {
                paths: paths.to_vec(),
            })
            .send()
            .await
            .map_err(into_network_error)?;
        let body: DeleteFilesResponse = parse_json(expect_success(response).await?).await?;
        Ok(body.deleted)
    }
}

fn into_network_error(err: reqwest::Error) -> Error {
    Error::Network(err.to_string())
}

/// Map a non-2xx response onto the error taxonomy.
async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<ErrorResponse>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| status.to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED => Error::Auth(message),
        StatusCode::PRECONDITION_FAILED => Error::PreconditionFailed(message),
        StatusCode::PRECONDITION_REQUIRED => Error::PreconditionRequired(message),
        StatusCode::BAD_REQUEST => Error::InvalidInput(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        _ => Error::Network(format!("{status}: {message}")),
    })
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| Error::Serialization(format!("bad response body: {e}")))
}
