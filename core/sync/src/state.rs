//! Client settings and persisted device state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use quillvault_common::{Error, Result, SyncManifest};

use crate::conflict::ConflictStrategy;

/// Per-device client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Manifest service base URL.
    pub endpoint: String,
    /// Bearer token (`<deviceId>:<hmacHex>`).
    pub token: String,
    /// Stable, self-assigned device identifier.
    pub device_id: String,
    /// Seconds between automatic cycles; 0 means manual only.
    #[serde(default)]
    pub sync_interval: u64,
    /// How conflicts are resolved.
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
    /// Glob patterns that never sync.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Whether opening a file triggers a cycle (host-driven).
    #[serde(default)]
    pub sync_on_file_open: bool,
}

impl SyncSettings {
    /// Load settings from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref()).await?;
        serde_json::from_str(&raw).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Save settings to a JSON file, creating parent directories.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(path, raw).await?;
        Ok(())
    }
}

/// What survives between cycles: the last agreed manifest and its ETag.
///
/// Written only at the successful end of a cycle; a cycle that fails leaves
/// the previous agreement in place so the next cycle re-discovers reality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseState {
    pub base_manifest: Option<SyncManifest>,
    pub last_etag: Option<String>,
}

/// JSON-on-disk persistence for [`BaseState`].
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Create a store backed by a file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the persisted state; a missing file is an empty state.
    pub async fn load(&self) -> Result<BaseState> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => {
                serde_json::from_str(&raw).map_err(|e| Error::Serialization(e.to_string()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BaseState::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Persist the state, creating parent directories.
    pub async fn save(&self, state: &BaseState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let raw =
            serde_json::to_string_pretty(state).map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(&self.path, raw).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillvault_common::FileEntry;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_state_file_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));

        let state = store.load().await.unwrap();
        assert!(state.base_manifest.is_none());
        assert!(state.last_etag.is_none());
    }

    #[tokio::test]
    async fn state_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("nested/state.json"));

        let mut manifest = SyncManifest::new("device-1");
        manifest.insert(FileEntry {
            path: "a.md".to_string(),
            hash: "a".repeat(64),
            mtime: 1,
            size: 2,
            last_modified_by: "device-1".to_string(),
        });
        let state = BaseState {
            base_manifest: Some(manifest.clone()),
            last_etag: Some("etag-1".to_string()),
        };
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.base_manifest.unwrap(), manifest);
        assert_eq!(loaded.last_etag.as_deref(), Some("etag-1"));
    }

    #[tokio::test]
    async fn settings_round_trip_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let settings = SyncSettings {
            endpoint: "https://sync.example.test/".to_string(),
            token: "laptop:abcd".to_string(),
            device_id: "laptop".to_string(),
            sync_interval: 300,
            conflict_strategy: ConflictStrategy::ThreeWayMerge,
            exclude_patterns: vec!["tmp/**".to_string()],
            sync_on_file_open: true,
        };
        settings.save(&path).await.unwrap();

        let loaded = SyncSettings::load(&path).await.unwrap();
        assert_eq!(loaded.endpoint, settings.endpoint);
        assert_eq!(loaded.sync_interval, 300);
        assert_eq!(loaded.conflict_strategy, ConflictStrategy::ThreeWayMerge);

        // Optional fields may be absent from hand-written files.
        let sparse = r#"{"endpoint":"https://e/","token":"d:h","deviceId":"d"}"#;
        let loaded: SyncSettings = serde_json::from_str(sparse).unwrap();
        assert_eq!(loaded.sync_interval, 0);
        assert!(!loaded.sync_on_file_open);
        assert!(loaded.exclude_patterns.is_empty());
    }
}
