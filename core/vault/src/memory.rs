//! In-memory vault for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use quillvault_common::{Error, Result, SyncPath};

use crate::adapter::{VaultAdapter, VaultFileInfo};

#[derive(Debug, Clone)]
struct FileState {
    data: Vec<u8>,
    mtime: i64,
}

/// In-memory vault. Contents are lost on drop.
#[derive(Clone, Default)]
pub struct MemoryVault {
    files: Arc<RwLock<HashMap<String, FileState>>>,
    clock: Arc<RwLock<i64>>,
}

impl MemoryVault {
    /// Create an empty vault.
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> i64 {
        let mut clock = self.clock.write().unwrap();
        *clock += 1;
        *clock
    }
}

#[async_trait]
impl VaultAdapter for MemoryVault {
    async fn list_files(&self) -> Result<Vec<VaultFileInfo>> {
        let files = self.files.read().unwrap();
        let mut infos = Vec::with_capacity(files.len());
        for (path, state) in files.iter() {
            infos.push(VaultFileInfo {
                path: SyncPath::parse(path)?,
                mtime: state.mtime,
                size: state.data.len() as u64,
            });
        }
        Ok(infos)
    }

    async fn read_bytes(&self, path: &SyncPath) -> Result<Vec<u8>> {
        self.files
            .read()
            .unwrap()
            .get(path.as_str())
            .map(|s| s.data.clone())
            .ok_or_else(|| Error::NotFound(format!("file not found: {path}")))
    }

    async fn read_text(&self, path: &SyncPath) -> Result<String> {
        let data = self.read_bytes(path).await?;
        String::from_utf8(data)
            .map_err(|_| Error::Vault(format!("file is not valid UTF-8: {path}")))
    }

    async fn write_bytes(&self, path: &SyncPath, data: &[u8]) -> Result<()> {
        let mtime = self.tick();
        self.files.write().unwrap().insert(
            path.to_string(),
            FileState {
                data: data.to_vec(),
                mtime,
            },
        );
        Ok(())
    }

    async fn write_text(&self, path: &SyncPath, text: &str) -> Result<()> {
        self.write_bytes(path, text.as_bytes()).await
    }

    async fn exists(&self, path: &SyncPath) -> Result<bool> {
        Ok(self.files.read().unwrap().contains_key(path.as_str()))
    }

    async fn remove(&self, path: &SyncPath) -> Result<()> {
        self.files
            .write()
            .unwrap()
            .remove(path.as_str())
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("file not found: {path}")))
    }
}
