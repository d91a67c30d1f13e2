//! Conflict resolution.
//!
//! A conflict is a path both sides changed since the base. The strategy is
//! a per-client setting; `ask` defers to a host-provided prompt, everything
//! else resolves automatically.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use quillvault_common::{Error, FileEntry, Result, SyncPath};
use quillvault_vault::{content_hash, VaultAdapter};

use crate::cache::ContentCache;
use crate::diff::ConflictEntry;
use crate::merge::merge_texts;
use crate::remote::SyncRemote;

/// Conflict resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Defer to the user prompt.
    #[default]
    Ask,
    /// Merge Markdown textually; other files fall back to keep-remote.
    ThreeWayMerge,
    /// This device's version wins.
    KeepLocal,
    /// The server's version wins.
    KeepRemote,
}

impl FromStr for ConflictStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ask" => Ok(Self::Ask),
            "three-way-merge" => Ok(Self::ThreeWayMerge),
            "keep-local" => Ok(Self::KeepLocal),
            "keep-remote" => Ok(Self::KeepRemote),
            other => Err(Error::InvalidInput(format!(
                "unknown conflict strategy: {other}"
            ))),
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ask => "ask",
            Self::ThreeWayMerge => "three-way-merge",
            Self::KeepLocal => "keep-local",
            Self::KeepRemote => "keep-remote",
        };
        write!(f, "{name}")
    }
}

/// What a prompt may answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    KeepLocal,
    KeepRemote,
    Merge,
}

/// Host-provided conflict prompt.
#[async_trait]
pub trait ConflictPrompt: Send + Sync {
    /// Present both versions and wait for a choice. `None` means the prompt
    /// was dismissed without choosing.
    async fn ask_conflict(
        &self,
        path: &SyncPath,
        local_text: &str,
        remote_text: &str,
    ) -> Result<Option<ConflictChoice>>;
}

/// Prompt for headless hosts: every ask counts as dismissed.
pub struct NoPrompt;

#[async_trait]
impl ConflictPrompt for NoPrompt {
    async fn ask_conflict(
        &self,
        _path: &SyncPath,
        _local_text: &str,
        _remote_text: &str,
    ) -> Result<Option<ConflictChoice>> {
        Ok(None)
    }
}

/// How one conflict was settled.
#[derive(Debug)]
pub enum Resolution {
    /// Local (or merged) bytes win; upload them and keep the entry.
    Upload {
        entry: FileEntry,
        data: Vec<u8>,
        /// Set when an `ask` prompt was dismissed and keep-local applied by
        /// default; surfaces as the conflicts-pending outcome.
        dismissed: bool,
    },
    /// The remote entry wins; download it and keep it.
    Download { entry: FileEntry },
    /// The local deletion wins; drop the path everywhere.
    Delete { path: String, remote_present: bool },
    /// The remote deletion wins; remove the local file.
    DeleteLocal { path: String },
}

/// Applies a [`ConflictStrategy`] to conflicts, one at a time.
pub struct ConflictResolver {
    strategy: ConflictStrategy,
    device_id: String,
}

impl ConflictResolver {
    /// Create a resolver for a device.
    pub fn new(strategy: ConflictStrategy, device_id: impl Into<String>) -> Self {
        Self {
            strategy,
            device_id: device_id.into(),
        }
    }

    /// The configured strategy.
    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Resolve one conflict.
    ///
    /// `remote_entry` is the path's entry in the *current* remote manifest
    /// (`None` when the remote side is a deletion; the conflict then carries
    /// an entry synthesized from the base).
    pub async fn resolve(
        &self,
        conflict: &ConflictEntry,
        remote_entry: Option<&FileEntry>,
        vault: &dyn VaultAdapter,
        remote: &dyn SyncRemote,
        prompt: &dyn ConflictPrompt,
        cache: &ContentCache,
    ) -> Result<Resolution> {
        let path = SyncPath::parse(&conflict.path)?;
        let local_exists = vault.exists(&path).await?;

        match self.strategy {
            ConflictStrategy::KeepLocal => {
                self.keep_local(&path, conflict, remote_entry, vault, local_exists, false)
                    .await
            }
            ConflictStrategy::KeepRemote => self.keep_remote(conflict, remote_entry),
            ConflictStrategy::ThreeWayMerge => {
                self.merge(&path, conflict, remote_entry, vault, remote, cache, local_exists)
                    .await
            }
            ConflictStrategy::Ask => {
                self.ask(&path, conflict, remote_entry, vault, remote, prompt, cache, local_exists)
                    .await
            }
        }
    }

    async fn keep_local(
        &self,
        path: &SyncPath,
        conflict: &ConflictEntry,
        remote_entry: Option<&FileEntry>,
        vault: &dyn VaultAdapter,
        local_exists: bool,
        dismissed: bool,
    ) -> Result<Resolution> {
        if !local_exists {
            // The local side of this conflict is a deletion; keeping local
            // means the deletion wins.
            return Ok(Resolution::Delete {
                path: conflict.path.clone(),
                remote_present: remote_entry.is_some(),
            });
        }

        let data = vault.read_bytes(path).await?;
        Ok(Resolution::Upload {
            entry: self.entry_for(path, &data),
            data,
            dismissed,
        })
    }

    fn keep_remote(
        &self,
        conflict: &ConflictEntry,
        remote_entry: Option<&FileEntry>,
    ) -> Result<Resolution> {
        match remote_entry {
            Some(entry) => Ok(Resolution::Download {
                entry: entry.clone(),
            }),
            // The remote side is a deletion; keeping remote accepts it.
            None => Ok(Resolution::DeleteLocal {
                path: conflict.path.clone(),
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn merge(
        &self,
        path: &SyncPath,
        conflict: &ConflictEntry,
        remote_entry: Option<&FileEntry>,
        vault: &dyn VaultAdapter,
        remote: &dyn SyncRemote,
        cache: &ContentCache,
        local_exists: bool,
    ) -> Result<Resolution> {
        // Only Markdown merges textually; anything else silently follows
        // the remote side. A one-sided deletion cannot merge either.
        if !path.is_markdown() || !local_exists {
            return self.keep_remote(conflict, remote_entry);
        }
        if remote_entry.is_none() {
            return self
                .keep_local(path, conflict, remote_entry, vault, local_exists, false)
                .await;
        }

        let local_text = vault.read_text(path).await?;
        let remote_bytes = remote.download_file(path).await?;
        let remote_text = String::from_utf8_lossy(&remote_bytes).into_owned();
        let base_text = conflict
            .base_hash
            .as_deref()
            .and_then(|hash| cache.get(hash))
            .unwrap_or_default();

        let outcome = merge_texts(&base_text, &local_text, &remote_text);
        if !outcome.clean {
            debug!(path = %path, "merge left conflict markers");
        }

        vault.write_text(path, &outcome.text).await?;
        let data = outcome.text.clone().into_bytes();
        let entry = self.entry_for(path, &data);
        cache.insert(entry.hash.clone(), outcome.text);

        Ok(Resolution::Upload {
            entry,
            data,
            dismissed: false,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn ask(
        &self,
        path: &SyncPath,
        conflict: &ConflictEntry,
        remote_entry: Option<&FileEntry>,
        vault: &dyn VaultAdapter,
        remote: &dyn SyncRemote,
        prompt: &dyn ConflictPrompt,
        cache: &ContentCache,
        local_exists: bool,
    ) -> Result<Resolution> {
        let local_text = if local_exists {
            String::from_utf8_lossy(&vault.read_bytes(path).await?).into_owned()
        } else {
            String::new()
        };
        let remote_text = if remote_entry.is_some() {
            String::from_utf8_lossy(&remote.download_file(path).await?).into_owned()
        } else {
            String::new()
        };

        match prompt.ask_conflict(path, &local_text, &remote_text).await? {
            Some(ConflictChoice::KeepLocal) => {
                self.keep_local(path, conflict, remote_entry, vault, local_exists, false)
                    .await
            }
            Some(ConflictChoice::KeepRemote) => self.keep_remote(conflict, remote_entry),
            Some(ConflictChoice::Merge) => {
                self.merge(path, conflict, remote_entry, vault, remote, cache, local_exists)
                    .await
            }
            // Dismissed: keep local by default and flag it.
            None => {
                self.keep_local(path, conflict, remote_entry, vault, local_exists, true)
                    .await
            }
        }
    }

    fn entry_for(&self, path: &SyncPath, data: &[u8]) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            hash: content_hash(data),
            mtime: Utc::now().timestamp_millis(),
            size: data.len() as u64,
            last_modified_by: self.device_id.clone(),
        }
    }
}
