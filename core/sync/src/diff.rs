//! Three-manifest diffing.
//!
//! The plan for a cycle comes out of comparing three snapshots: the local
//! manifest (what this device has), the remote manifest (what the store
//! has), and the base manifest (what both sides agreed on last time). The
//! base is what lets a missing file mean "deleted here" instead of "never
//! heard of it".

use chrono::Utc;
use std::collections::BTreeSet;

use quillvault_common::{FileEntry, SyncManifest};

/// A path modified on both sides since the base.
///
/// When one side deleted the file, that side's entry is synthesized from the
/// base manifest so resolution always has two entries to compare.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictEntry {
    pub path: String,
    pub local: FileEntry,
    pub remote: FileEntry,
    pub base_hash: Option<String>,
}

/// The plan: what to transfer, delete, and reconcile. Each path appears in
/// at most one bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffResult {
    pub to_upload: Vec<FileEntry>,
    pub to_download: Vec<FileEntry>,
    pub to_delete_remote: Vec<String>,
    pub to_delete_local: Vec<String>,
    pub conflicts: Vec<ConflictEntry>,
}

impl DiffResult {
    /// Whether the plan does nothing.
    pub fn is_empty(&self) -> bool {
        self.to_upload.is_empty()
            && self.to_download.is_empty()
            && self.to_delete_remote.is_empty()
            && self.to_delete_local.is_empty()
            && self.conflicts.is_empty()
    }

    /// Total number of planned actions.
    pub fn len(&self) -> usize {
        self.to_upload.len()
            + self.to_download.len()
            + self.to_delete_remote.len()
            + self.to_delete_local.len()
            + self.conflicts.len()
    }
}

/// Classify every path in the union of the three manifests.
///
/// `base` is `None` on the first sync and on a forced full sync; without a
/// base nothing can be recognized as a deletion, so divergent files become
/// conflicts and one-sided files become transfers.
pub fn diff_manifests(
    local: &SyncManifest,
    remote: &SyncManifest,
    base: Option<&SyncManifest>,
) -> DiffResult {
    let mut result = DiffResult::default();

    let paths: BTreeSet<&str> = local
        .files
        .keys()
        .chain(remote.files.keys())
        .chain(base.map(|b| b.files.keys()).into_iter().flatten())
        .map(String::as_str)
        .collect();

    for path in paths {
        let l = local.get(path);
        let r = remote.get(path);
        let b = base.and_then(|b| b.get(path));

        match (l, r) {
            (Some(l), Some(r)) => {
                // Identical content short-circuits before any base check.
                if l.hash == r.hash {
                    continue;
                }
                match b {
                    Some(b) => {
                        let local_changed = l.hash != b.hash;
                        let remote_changed = r.hash != b.hash;
                        match (local_changed, remote_changed) {
                            (true, false) => result.to_upload.push(l.clone()),
                            (false, true) => result.to_download.push(r.clone()),
                            // Both diverged. (false, false) cannot happen when
                            // the hashes differ, but classify it as a conflict
                            // rather than guess.
                            _ => result.conflicts.push(ConflictEntry {
                                path: path.to_string(),
                                local: l.clone(),
                                remote: r.clone(),
                                base_hash: Some(b.hash.clone()),
                            }),
                        }
                    }
                    // Divergent with no shared history.
                    None => result.conflicts.push(ConflictEntry {
                        path: path.to_string(),
                        local: l.clone(),
                        remote: r.clone(),
                        base_hash: None,
                    }),
                }
            }
            (Some(l), None) => match b {
                None => result.to_upload.push(l.clone()),
                Some(b) if l.hash != b.hash => {
                    // Modified here, deleted there.
                    result.conflicts.push(ConflictEntry {
                        path: path.to_string(),
                        local: l.clone(),
                        remote: b.clone(),
                        base_hash: Some(b.hash.clone()),
                    });
                }
                Some(_) => result.to_delete_local.push(path.to_string()),
            },
            (None, Some(r)) => match b {
                None => result.to_download.push(r.clone()),
                Some(b) if r.hash != b.hash => {
                    // Deleted here, modified there.
                    result.conflicts.push(ConflictEntry {
                        path: path.to_string(),
                        local: b.clone(),
                        remote: r.clone(),
                        base_hash: Some(b.hash.clone()),
                    });
                }
                Some(_) => result.to_delete_remote.push(path.to_string()),
            },
            // Already gone on both sides.
            (None, None) => {}
        }
    }

    result
}

/// Build the next manifest from the remote manifest plus the cycle's
/// outcomes. Inputs are not mutated.
pub fn apply_to_manifest(
    remote: &SyncManifest,
    upserts: &[FileEntry],
    deletions: &[String],
    device_id: &str,
) -> SyncManifest {
    let mut next = remote.clone();
    for path in deletions {
        next.remove(path);
    }
    for entry in upserts {
        next.insert(entry.clone());
    }
    next.last_updated = Utc::now();
    next.last_updated_by = device_id.to_string();
    next
}
