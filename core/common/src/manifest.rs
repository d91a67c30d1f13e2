//! The sync manifest: the canonical index of tracked files.
//!
//! One manifest object lives in the object store under [`MANIFEST_KEY`] and
//! is the single point of agreement between devices. File contents live
//! under [`FILES_PREFIX`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::path;

/// Reserved object key holding the manifest.
pub const MANIFEST_KEY: &str = ".quillvault/manifest.json";

/// Reserved internal prefix; never addressable through the file routes.
pub const RESERVED_PREFIX: &str = ".quillvault/";

/// Object key prefix for tracked file contents.
pub const FILES_PREFIX: &str = "vault/";

/// Object store key for a tracked file path.
pub fn file_object_key(path: &str) -> String {
    format!("{FILES_PREFIX}{path}")
}

/// Metadata for one tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Vault-relative forward-slash path.
    pub path: String,
    /// Lowercase hex SHA-256 of the raw byte contents.
    pub hash: String,
    /// Last-modified milliseconds since epoch. Advisory; the hash is
    /// authoritative for change detection.
    pub mtime: i64,
    /// Byte length.
    pub size: u64,
    /// Device that last wrote this entry.
    pub last_modified_by: String,
}

/// The canonical set of tracked files at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncManifest {
    /// Tracked files by path.
    pub files: HashMap<String, FileEntry>,
    /// When the manifest was last committed.
    pub last_updated: DateTime<Utc>,
    /// Device that committed it.
    pub last_updated_by: String,
}

impl SyncManifest {
    /// Create an empty manifest attributed to a device.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            files: HashMap::new(),
            last_updated: Utc::now(),
            last_updated_by: device_id.into(),
        }
    }

    /// The empty manifest a client sees before any sync has happened.
    pub fn empty() -> Self {
        Self::new("")
    }

    /// Get the entry for a path.
    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    /// Insert an entry, keyed by its own path.
    pub fn insert(&mut self, entry: FileEntry) {
        self.files.insert(entry.path.clone(), entry);
    }

    /// Remove the entry for a path.
    pub fn remove(&mut self, path: &str) -> Option<FileEntry> {
        self.files.remove(path)
    }

    /// Number of tracked files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the manifest tracks no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Check the structural invariants: every entry is keyed by its own
    /// path, hashes are 64 lowercase hex chars, and no key violates the
    /// path constraints.
    pub fn validate(&self) -> Result<()> {
        for (key, entry) in &self.files {
            if key != &entry.path {
                return Err(Error::InvalidInput(format!(
                    "manifest entry keyed {key} but describes {}",
                    entry.path
                )));
            }
            if !is_valid_hash(&entry.hash) {
                return Err(Error::InvalidInput(format!(
                    "manifest entry {key} carries a malformed hash"
                )));
            }
            path::validate(key)?;
        }
        Ok(())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Whether a string is a well-formed content hash (64 lowercase hex chars).
pub fn is_valid_hash(hash: &str) -> bool {
    hash.len() == 64
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
