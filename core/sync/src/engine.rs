//! The sync engine: one cycle from vault scan to manifest commit.
//!
//! A cycle is plan → transfer → delete → commit. The conditional manifest
//! PUT is the only linearization point; everything before it is preparation
//! that another device may invalidate, in which case the cycle re-runs from
//! the scan.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use quillvault_common::protocol::{MAX_CONCURRENT_TRANSFERS, MAX_MANIFEST_RETRIES};
use quillvault_common::{Error, FileEntry, Result, SyncPath};
use quillvault_vault::{content_hash, ExcludePatterns, VaultAdapter, VaultScanner};

use crate::cache::ContentCache;
use crate::conflict::{ConflictPrompt, ConflictResolver, Resolution};
use crate::diff::{apply_to_manifest, diff_manifests};
use crate::queue::{TransferHandle, TransferQueue};
use crate::remote::SyncRemote;
use crate::state::{BaseState, StateStore, SyncSettings};

/// Result of a sync request.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Another cycle was already running; this request did nothing.
    Skipped,
    /// The cycle ran to completion.
    Completed(SyncSummary),
}

/// Counts for one completed cycle.
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub uploaded: usize,
    pub downloaded: usize,
    pub deleted_remote: usize,
    pub deleted_local: usize,
    pub conflicts_resolved: usize,
    /// Conflicts where an `ask` prompt was dismissed; the default resolution
    /// was applied but the user should be told.
    pub conflicts_pending: usize,
    pub commit_attempts: u32,
    pub duration: Duration,
}

/// Drives sync cycles for one device.
pub struct SyncEngine {
    remote: Arc<dyn SyncRemote>,
    vault: Arc<dyn VaultAdapter>,
    prompt: Arc<dyn ConflictPrompt>,
    scanner: VaultScanner,
    resolver: ConflictResolver,
    state_store: StateStore,
    cache: Arc<ContentCache>,
    device_id: String,
    concurrency: usize,
    in_progress: AtomicBool,
    base: AsyncMutex<BaseState>,
}

impl SyncEngine {
    /// Create an engine from settings, loading any persisted base state.
    pub async fn new(
        remote: Arc<dyn SyncRemote>,
        vault: Arc<dyn VaultAdapter>,
        prompt: Arc<dyn ConflictPrompt>,
        settings: &SyncSettings,
        state_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let excludes = ExcludePatterns::new(&settings.exclude_patterns)?;
        let state_store = StateStore::new(state_path);
        let base = state_store.load().await?;

        Ok(Self {
            remote,
            vault,
            prompt,
            scanner: VaultScanner::new(&settings.device_id, excludes),
            resolver: ConflictResolver::new(settings.conflict_strategy, &settings.device_id),
            state_store,
            cache: Arc::new(ContentCache::new()),
            device_id: settings.device_id.clone(),
            concurrency: MAX_CONCURRENT_TRANSFERS,
            in_progress: AtomicBool::new(false),
            base: AsyncMutex::new(base),
        })
    }

    /// Override the transfer fan-out.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Whether a cycle is currently running.
    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// The last agreed base state.
    pub async fn base_state(&self) -> BaseState {
        self.base.lock().await.clone()
    }

    /// Run one sync cycle.
    ///
    /// Overlapping requests are dropped, not queued: if a cycle is already
    /// in flight this returns [`SyncOutcome::Skipped`] immediately.
    /// `force_full` ignores the persisted base, so deletions cannot be
    /// recognized and divergence resolves through the conflict path.
    pub async fn sync(&self, force_full: bool) -> Result<SyncOutcome> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            debug!("sync already in progress, dropping request");
            return Ok(SyncOutcome::Skipped);
        }

        let result = self.run(force_full).await;
        self.in_progress.store(false, Ordering::SeqCst);

        match &result {
            Ok(summary) => info!(
                uploaded = summary.uploaded,
                downloaded = summary.downloaded,
                deleted_remote = summary.deleted_remote,
                deleted_local = summary.deleted_local,
                conflicts = summary.conflicts_resolved,
                attempts = summary.commit_attempts,
                "sync complete"
            ),
            Err(err) => warn!(%err, "sync failed"),
        }

        result.map(SyncOutcome::Completed)
    }

    async fn run(&self, force_full: bool) -> Result<SyncSummary> {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.run_cycle(force_full).await {
                Ok(mut summary) => {
                    summary.commit_attempts = attempt;
                    summary.duration = started.elapsed();
                    return Ok(summary);
                }
                Err(Error::PreconditionFailed(reason)) if attempt < MAX_MANIFEST_RETRIES => {
                    warn!(%reason, attempt, "lost the manifest commit race, restarting cycle");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn run_cycle(&self, force_full: bool) -> Result<SyncSummary> {
        // 1-2. Scan the vault, fetch the remote manifest with its ETag.
        let local = self.scanner.build_manifest(self.vault.as_ref()).await?;
        let (remote_manifest, remote_etag) = self.remote.fetch_manifest().await?;

        // 3. Pick the three-way base.
        let base = if force_full {
            None
        } else {
            self.base.lock().await.base_manifest.clone()
        };

        // 4. Plan.
        let plan = diff_manifests(&local, &remote_manifest, base.as_ref());
        debug!(
            uploads = plan.to_upload.len(),
            downloads = plan.to_download.len(),
            delete_remote = plan.to_delete_remote.len(),
            delete_local = plan.to_delete_local.len(),
            conflicts = plan.conflicts.len(),
            "cycle planned"
        );

        // 5. Resolve conflicts into concrete actions.
        let mut manifest_deletions = plan.to_delete_remote.clone();
        let mut remote_deletes = plan.to_delete_remote.clone();
        let mut local_deletes = plan.to_delete_local.clone();
        let mut resolved_uploads: Vec<(FileEntry, Vec<u8>)> = Vec::new();
        let mut downloads = plan.to_download.clone();
        let mut conflicts_pending = 0;

        for conflict in &plan.conflicts {
            let resolution = self
                .resolver
                .resolve(
                    conflict,
                    remote_manifest.get(&conflict.path),
                    self.vault.as_ref(),
                    self.remote.as_ref(),
                    self.prompt.as_ref(),
                    &self.cache,
                )
                .await?;

            match resolution {
                Resolution::Upload {
                    entry,
                    data,
                    dismissed,
                } => {
                    if dismissed {
                        conflicts_pending += 1;
                    }
                    resolved_uploads.push((entry, data));
                }
                Resolution::Download { entry } => downloads.push(entry),
                Resolution::Delete {
                    path,
                    remote_present,
                } => {
                    if remote_present {
                        remote_deletes.push(path.clone());
                    }
                    manifest_deletions.push(path);
                }
                Resolution::DeleteLocal { path } => local_deletes.push(path),
            }
        }

        // 6. Move the bytes. Everything finishes (or fails the cycle)
        // before any deletion happens.
        let queue = TransferQueue::new(self.concurrency);
        let uploaded: Arc<Mutex<Vec<FileEntry>>> = Arc::default();
        let downloaded: Arc<Mutex<Vec<FileEntry>>> = Arc::default();
        let mut handles = Vec::new();

        for entry in &plan.to_upload {
            handles.push(self.enqueue_upload(&queue, entry, &uploaded)?);
        }
        for (entry, data) in resolved_uploads {
            handles.push(self.enqueue_resolved_upload(&queue, entry, data, &uploaded)?);
        }
        for entry in &downloads {
            handles.push(self.enqueue_download(&queue, entry, &downloaded)?);
        }

        let results = futures::future::join_all(handles.into_iter().map(TransferHandle::wait)).await;
        for result in results {
            result?;
        }

        // 7. Deletions: remote in one bulk call, local best-effort.
        let deleted_remote = if remote_deletes.is_empty() {
            0
        } else {
            self.remote.delete_files(&remote_deletes).await?
        };

        let mut deleted_local = 0;
        for raw in &local_deletes {
            let path = SyncPath::parse(raw)?;
            match self.vault.remove(&path).await {
                Ok(()) => deleted_local += 1,
                // Tolerated: the next cycle re-detects the drift.
                Err(err) => warn!(path = %path, %err, "local delete failed"),
            }
        }

        // 8-9. Build the next manifest and commit it against the ETag we
        // fetched in step 2.
        let uploaded = uploaded.lock().unwrap().clone();
        let downloaded = downloaded.lock().unwrap().clone();
        let mut upserts = uploaded.clone();
        upserts.extend(downloaded.iter().cloned());

        let next = apply_to_manifest(&remote_manifest, &upserts, &manifest_deletions, &self.device_id);
        let etag = self
            .remote
            .commit_manifest(&next, remote_etag.as_deref())
            .await?;

        // 10. The committed manifest becomes the next base.
        {
            let mut state = self.base.lock().await;
            state.base_manifest = Some(next);
            state.last_etag = Some(etag);
            self.state_store.save(&state).await?;
        }

        Ok(SyncSummary {
            uploaded: uploaded.len(),
            downloaded: downloaded.len(),
            deleted_remote,
            deleted_local,
            conflicts_resolved: plan.conflicts.len(),
            conflicts_pending,
            ..SyncSummary::default()
        })
    }

    fn enqueue_upload(
        &self,
        queue: &TransferQueue,
        entry: &FileEntry,
        uploaded: &Arc<Mutex<Vec<FileEntry>>>,
    ) -> Result<TransferHandle> {
        let path = SyncPath::parse(&entry.path)?;
        let planned = entry.clone();
        let vault = self.vault.clone();
        let remote = self.remote.clone();
        let cache = self.cache.clone();
        let uploaded = uploaded.clone();
        let device_id = self.device_id.clone();

        Ok(queue.enqueue(move || {
            let path = path.clone();
            let planned = planned.clone();
            let vault = vault.clone();
            let remote = remote.clone();
            let cache = cache.clone();
            let uploaded = uploaded.clone();
            let device_id = device_id.clone();
            async move {
                // Read at execution time; a vanished file fails the cycle.
                let data = vault.read_bytes(&path).await?;
                let hash = content_hash(&data);
                if hash != planned.hash {
                    debug!(path = %path, "content changed between scan and upload");
                }
                remote.upload_file(&path, &hash, data.clone()).await?;

                if path.is_markdown() {
                    if let Ok(text) = String::from_utf8(data.clone()) {
                        cache.insert(hash.clone(), text);
                    }
                }
                uploaded.lock().unwrap().push(FileEntry {
                    path: path.to_string(),
                    hash,
                    mtime: planned.mtime,
                    size: data.len() as u64,
                    last_modified_by: device_id,
                });
                Ok(())
            }
        }))
    }

    fn enqueue_resolved_upload(
        &self,
        queue: &TransferQueue,
        entry: FileEntry,
        data: Vec<u8>,
        uploaded: &Arc<Mutex<Vec<FileEntry>>>,
    ) -> Result<TransferHandle> {
        let path = SyncPath::parse(&entry.path)?;
        let remote = self.remote.clone();
        let uploaded = uploaded.clone();

        Ok(queue.enqueue(move || {
            let path = path.clone();
            let entry = entry.clone();
            let data = data.clone();
            let remote = remote.clone();
            let uploaded = uploaded.clone();
            async move {
                remote.upload_file(&path, &entry.hash, data).await?;
                uploaded.lock().unwrap().push(entry);
                Ok(())
            }
        }))
    }

    fn enqueue_download(
        &self,
        queue: &TransferQueue,
        entry: &FileEntry,
        downloaded: &Arc<Mutex<Vec<FileEntry>>>,
    ) -> Result<TransferHandle> {
        let path = SyncPath::parse(&entry.path)?;
        let entry = entry.clone();
        let vault = self.vault.clone();
        let remote = self.remote.clone();
        let cache = self.cache.clone();
        let downloaded = downloaded.clone();

        Ok(queue.enqueue(move || {
            let path = path.clone();
            let entry = entry.clone();
            let vault = vault.clone();
            let remote = remote.clone();
            let cache = cache.clone();
            let downloaded = downloaded.clone();
            async move {
                let data = remote.download_file(&path).await?;
                vault.write_bytes(&path, &data).await?;

                if path.is_markdown() {
                    if let Ok(text) = String::from_utf8(data) {
                        cache.insert(content_hash(text.as_bytes()), text);
                    }
                }
                downloaded.lock().unwrap().push(entry);
                Ok(())
            }
        }))
    }
}
