//! Content-addressed merge-base cache.
//!
//! The protocol persists base *hashes* across syncs, not base *contents*.
//! This cache remembers the text of Markdown files the engine has uploaded
//! or downloaded during this process, keyed by content hash, so a later
//! merge can use the real base. Losing it is safe: merges degrade to
//! two-way.

use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory hash → text cache.
#[derive(Default)]
pub struct ContentCache {
    entries: RwLock<HashMap<String, String>>,
}

impl ContentCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the text behind a content hash.
    pub fn insert(&self, hash: impl Into<String>, text: impl Into<String>) {
        self.entries.write().unwrap().insert(hash.into(), text.into());
    }

    /// Look up the text for a content hash.
    pub fn get(&self, hash: &str) -> Option<String> {
        self.entries.read().unwrap().get(hash).cloned()
    }

    /// Number of cached contents.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}
