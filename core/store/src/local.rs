//! Local filesystem object store.
//!
//! Backs the service when self-hosting without external object storage.
//! Keys map to files under a root directory; ETags are content hashes, so
//! rewriting identical bytes keeps the ETag stable (harmless under the
//! conditional-write discipline).

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use quillvault_common::{Error, Result};

use crate::store::{ObjectStore, StoredObject, WritePrecondition};

/// Directory-backed object store.
pub struct LocalStore {
    root: PathBuf,
    /// Serializes conditional writes; plain puts and reads go lock-free.
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Create a store rooted at a directory, creating it if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn key_to_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.starts_with('/') {
            return Err(Error::Storage(format!("malformed object key: {key}")));
        }
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(Error::Storage(format!("malformed object key: {key}")));
            }
            path.push(segment);
        }
        Ok(path)
    }

    async fn read_object(&self, key: &str) -> Result<Option<StoredObject>> {
        let path = self.key_to_path(key)?;
        match fs::read(&path).await {
            Ok(data) => {
                let etag = content_etag(&data);
                Ok(Some(StoredObject { data, etag }))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_object(&self, key: &str, data: &[u8]) -> Result<String> {
        let path = self.key_to_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        Ok(content_etag(data))
    }
}

fn content_etag(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        self.read_object(key).await
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<String> {
        self.write_object(key, &data).await
    }

    async fn put_conditional(
        &self,
        key: &str,
        data: Vec<u8>,
        precondition: WritePrecondition,
    ) -> Result<String> {
        let _guard = self.write_lock.lock().await;

        let current = self.read_object(key).await?;
        match (&precondition, &current) {
            (WritePrecondition::Absent, Some(_)) => {
                return Err(Error::PreconditionFailed(format!(
                    "object already exists: {key}"
                )));
            }
            (WritePrecondition::Match(expected), Some(obj)) if &obj.etag != expected => {
                return Err(Error::PreconditionFailed(format!(
                    "etag mismatch for {key}"
                )));
            }
            (WritePrecondition::Match(_), None) => {
                return Err(Error::PreconditionFailed(format!(
                    "object no longer exists: {key}"
                )));
            }
            _ => {}
        }

        self.write_object(key, &data).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "deleted object");
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
