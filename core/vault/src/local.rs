//! Local filesystem vault.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tracing::debug;

use quillvault_common::{Error, Result, SyncPath};

use crate::adapter::{VaultAdapter, VaultFileInfo};

/// Vault rooted at a local directory.
///
/// Dot-entries (hidden files and directories) are invisible to the scanner;
/// host metadata like editor state lives there and never syncs.
pub struct LocalVault {
    root: PathBuf,
}

impl LocalVault {
    /// Open a vault at a directory, creating it if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }
        Ok(Self { root })
    }

    /// The vault root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn to_fs_path(&self, path: &SyncPath) -> PathBuf {
        let mut fs_path = self.root.clone();
        for segment in path.as_str().split('/') {
            fs_path.push(segment);
        }
        fs_path
    }
}

fn mtime_millis(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl VaultAdapter for LocalVault {
    async fn list_files(&self) -> Result<Vec<VaultFileInfo>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with('.') {
                    continue;
                }

                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !meta.is_file() {
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let joined = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                match SyncPath::parse(&joined) {
                    Ok(sync_path) => files.push(VaultFileInfo {
                        path: sync_path,
                        mtime: mtime_millis(&meta),
                        size: meta.len(),
                    }),
                    Err(err) => {
                        debug!(path = %joined, %err, "skipping unrepresentable path");
                    }
                }
            }
        }

        Ok(files)
    }

    async fn read_bytes(&self, path: &SyncPath) -> Result<Vec<u8>> {
        let fs_path = self.to_fs_path(path);
        match fs::read(&fs_path).await {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("file not found: {path}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn read_text(&self, path: &SyncPath) -> Result<String> {
        let data = self.read_bytes(path).await?;
        String::from_utf8(data)
            .map_err(|_| Error::Vault(format!("file is not valid UTF-8: {path}")))
    }

    async fn write_bytes(&self, path: &SyncPath, data: &[u8]) -> Result<()> {
        let fs_path = self.to_fs_path(path);
        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&fs_path, data).await?;
        Ok(())
    }

    async fn write_text(&self, path: &SyncPath, text: &str) -> Result<()> {
        self.write_bytes(path, text.as_bytes()).await
    }

    async fn exists(&self, path: &SyncPath) -> Result<bool> {
        Ok(self.to_fs_path(path).exists())
    }

    async fn remove(&self, path: &SyncPath) -> Result<()> {
        let fs_path = self.to_fs_path(path);
        match fs::remove_file(&fs_path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("file not found: {path}")))
            }
            Err(err) => Err(err.into()),
        }
    }
}
