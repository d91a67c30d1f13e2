//! Vault scanner: turns the current vault contents into a manifest.

use sha2::{Digest, Sha256};
use tracing::debug;

use quillvault_common::{Error, FileEntry, Result, SyncManifest};

use crate::adapter::VaultAdapter;
use crate::pattern::ExcludePatterns;

/// Lowercase hex SHA-256 of raw bytes.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Builds the local manifest for a device.
pub struct VaultScanner {
    device_id: String,
    excludes: ExcludePatterns,
}

impl VaultScanner {
    /// Create a scanner for a device with its exclude patterns.
    pub fn new(device_id: impl Into<String>, excludes: ExcludePatterns) -> Self {
        Self {
            device_id: device_id.into(),
            excludes,
        }
    }

    /// Scan the vault and build its manifest.
    ///
    /// Excluded paths never enter the manifest. A file that vanishes between
    /// listing and reading is skipped; the next cycle will see the deletion.
    pub async fn build_manifest(&self, vault: &dyn VaultAdapter) -> Result<SyncManifest> {
        let mut manifest = SyncManifest::new(&self.device_id);

        for info in vault.list_files().await? {
            let path = info.path.as_str();
            if self.excludes.is_excluded(path) {
                debug!(path, "excluded from sync");
                continue;
            }

            let data = match vault.read_bytes(&info.path).await {
                Ok(data) => data,
                Err(Error::NotFound(_)) => {
                    debug!(path, "file vanished during scan");
                    continue;
                }
                Err(err) => return Err(err),
            };

            manifest.insert(FileEntry {
                path: path.to_string(),
                hash: content_hash(&data),
                mtime: info.mtime,
                size: data.len() as u64,
                last_modified_by: self.device_id.clone(),
            });
        }

        Ok(manifest)
    }
}
