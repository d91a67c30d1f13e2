//! Object store trait definition.

use async_trait::async_trait;

use quillvault_common::Result;

/// A stored object together with its current ETag.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Raw object bytes.
    pub data: Vec<u8>,
    /// Opaque revision identifier; changes on every successful write.
    pub etag: String,
}

/// Precondition attached to a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePrecondition {
    /// The key must not exist yet.
    Absent,
    /// The current ETag must equal this value.
    Match(String),
}

/// Key/value object store with ETag-based optimistic concurrency.
///
/// Implementations must make [`put_conditional`](ObjectStore::put_conditional)
/// atomic with respect to concurrent writers of the same key; that atomicity
/// is what serializes manifest commits across devices.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend name (e.g. "memory", "local").
    fn name(&self) -> &str;

    /// Fetch an object. `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>>;

    /// Write an object unconditionally, returning the new ETag.
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<String>;

    /// Write an object only if the precondition holds.
    ///
    /// # Errors
    /// `Error::PreconditionFailed` when the key's current state does not
    /// satisfy the precondition.
    async fn put_conditional(
        &self,
        key: &str,
        data: Vec<u8>,
        precondition: WritePrecondition,
    ) -> Result<String>;

    /// Delete an object. Idempotent; returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete several objects, returning how many existed.
    async fn delete_many(&self, keys: &[String]) -> Result<usize> {
        let mut deleted = 0;
        for key in keys {
            if self.delete(key).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// List keys under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
