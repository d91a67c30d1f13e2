//! Vault adapter trait definition.

use async_trait::async_trait;

use quillvault_common::{Result, SyncPath};

/// What the scanner needs to know about a file before reading it.
#[derive(Debug, Clone)]
pub struct VaultFileInfo {
    /// Vault-relative path.
    pub path: SyncPath,
    /// Last-modified milliseconds since epoch.
    pub mtime: i64,
    /// Byte length.
    pub size: u64,
}

/// File access seam between the sync engine and its host.
///
/// Implementations own path-to-storage mapping and must create parent
/// directories on write.
#[async_trait]
pub trait VaultAdapter: Send + Sync {
    /// Enumerate every file in the vault.
    async fn list_files(&self) -> Result<Vec<VaultFileInfo>>;

    /// Read a file's raw bytes.
    async fn read_bytes(&self, path: &SyncPath) -> Result<Vec<u8>>;

    /// Read a file as UTF-8 text.
    async fn read_text(&self, path: &SyncPath) -> Result<String>;

    /// Write raw bytes, creating parent directories as needed.
    async fn write_bytes(&self, path: &SyncPath, data: &[u8]) -> Result<()>;

    /// Write UTF-8 text, creating parent directories as needed.
    async fn write_text(&self, path: &SyncPath, text: &str) -> Result<()>;

    /// Whether a file exists.
    async fn exists(&self, path: &SyncPath) -> Result<bool>;

    /// Delete a file.
    ///
    /// # Errors
    /// `Error::NotFound` when the file does not exist.
    async fn remove(&self, path: &SyncPath) -> Result<()>;
}
