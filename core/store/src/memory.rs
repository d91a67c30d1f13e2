//! In-memory object store for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use quillvault_common::{Error, Result};

use crate::store::{ObjectStore, StoredObject, WritePrecondition};

/// In-memory object store.
///
/// All data lives in a map and is lost on drop. ETags are fresh UUIDs per
/// write, so every write is observable through the conditional-put
/// discipline.
#[derive(Clone)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().unwrap().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        Ok(self.objects.read().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<String> {
        let etag = Uuid::new_v4().to_string();
        self.objects.write().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                etag: etag.clone(),
            },
        );
        Ok(etag)
    }

    async fn put_conditional(
        &self,
        key: &str,
        data: Vec<u8>,
        precondition: WritePrecondition,
    ) -> Result<String> {
        let mut objects = self.objects.write().unwrap();

        match (&precondition, objects.get(key)) {
            (WritePrecondition::Absent, Some(_)) => {
                return Err(Error::PreconditionFailed(format!(
                    "object already exists: {key}"
                )));
            }
            (WritePrecondition::Match(expected), Some(current)) if &current.etag != expected => {
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

        let etag = Uuid::new_v4().to_string();
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                etag: etag.clone(),
            },
        );
        Ok(etag)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.objects.write().unwrap().remove(key).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
