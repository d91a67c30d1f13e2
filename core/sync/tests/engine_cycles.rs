//! End-to-end sync cycles against an in-memory remote with real
//! conditional-write semantics.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use uuid::Uuid;

use quillvault_common::{Error, FileEntry, Result, SyncManifest, SyncPath};
use quillvault_sync::{
    ConflictStrategy, NoPrompt, SyncEngine, SyncOutcome, SyncRemote, SyncSettings, SyncSummary,
};
use quillvault_vault::{content_hash, MemoryVault, VaultAdapter};

/// Server-side double: one manifest slot with compare-and-swap, one map of
/// file objects.
#[derive(Default)]
struct InMemoryRemote {
    manifest: Mutex<Option<(SyncManifest, String)>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryRemote {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn current_manifest(&self) -> Option<(SyncManifest, String)> {
        self.manifest.lock().unwrap().clone()
    }

    fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl SyncRemote for InMemoryRemote {
    async fn fetch_manifest(&self) -> Result<(SyncManifest, Option<String>)> {
        match &*self.manifest.lock().unwrap() {
            Some((manifest, etag)) => Ok((manifest.clone(), Some(etag.clone()))),
            None => Ok((SyncManifest::empty(), None)),
        }
    }

    async fn commit_manifest(
        &self,
        manifest: &SyncManifest,
        if_match: Option<&str>,
    ) -> Result<String> {
        let mut slot = self.manifest.lock().unwrap();
        match (&*slot, if_match) {
            (None, None) => {}
            (Some(_), None) => {
                return Err(Error::PreconditionRequired(
                    "manifest exists, If-Match required".to_string(),
                ));
            }
            (Some((_, current)), Some(provided)) if current == provided => {}
            _ => {
                return Err(Error::PreconditionFailed("etag mismatch".to_string()));
            }
        }
        let etag = Uuid::new_v4().to_string();
        *slot = Some((manifest.clone(), etag.clone()));
        Ok(etag)
    }

    async fn upload_file(&self, path: &SyncPath, _hash: &str, data: Vec<u8>) -> Result<()> {
        self.files.lock().unwrap().insert(path.to_string(), data);
        Ok(())
    }

    async fn download_file(&self, path: &SyncPath) -> Result<Vec<u8>> {
        self.file(path.as_str())
            .ok_or_else(|| Error::NotFound(format!("no such file: {path}")))
    }

    async fn delete_files(&self, paths: &[String]) -> Result<usize> {
        let mut files = self.files.lock().unwrap();
        Ok(paths.iter().filter(|p| files.remove(*p).is_some()).count())
    }
}

/// Wrapper that lets another device sneak in a commit right before this
/// device's first commit, forcing a genuine lost race.
struct RacingRemote {
    inner: Arc<InMemoryRemote>,
    raced: AtomicBool,
    interloper_path: String,
    interloper_data: Vec<u8>,
}

#[async_trait]
impl SyncRemote for RacingRemote {
    async fn fetch_manifest(&self) -> Result<(SyncManifest, Option<String>)> {
        self.inner.fetch_manifest().await
    }

    async fn commit_manifest(
        &self,
        manifest: &SyncManifest,
        if_match: Option<&str>,
    ) -> Result<String> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let path = SyncPath::parse(&self.interloper_path)?;
            self.inner
                .upload_file(&path, &content_hash(&self.interloper_data), self.interloper_data.clone())
                .await?;

            let (mut current, etag) = self.inner.fetch_manifest().await?;
            current.insert(FileEntry {
                path: self.interloper_path.clone(),
                hash: content_hash(&self.interloper_data),
                mtime: 1,
                size: self.interloper_data.len() as u64,
                last_modified_by: "interloper".to_string(),
            });
            self.inner
                .commit_manifest(&current, etag.as_deref())
                .await?;
        }
        self.inner.commit_manifest(manifest, if_match).await
    }

    async fn upload_file(&self, path: &SyncPath, hash: &str, data: Vec<u8>) -> Result<()> {
        self.inner.upload_file(path, hash, data).await
    }

    async fn download_file(&self, path: &SyncPath) -> Result<Vec<u8>> {
        self.inner.download_file(path).await
    }

    async fn delete_files(&self, paths: &[String]) -> Result<usize> {
        self.inner.delete_files(paths).await
    }
}

fn settings(device: &str, strategy: ConflictStrategy) -> SyncSettings {
    SyncSettings {
        endpoint: "https://sync.example.test/".to_string(),
        token: format!("{device}:hmac"),
        device_id: device.to_string(),
        sync_interval: 0,
        conflict_strategy: strategy,
        exclude_patterns: Vec::new(),
        sync_on_file_open: false,
    }
}

async fn engine_for(
    device: &str,
    remote: Arc<dyn SyncRemote>,
    vault: Arc<MemoryVault>,
    strategy: ConflictStrategy,
    dir: &TempDir,
) -> SyncEngine {
    SyncEngine::new(
        remote,
        vault,
        Arc::new(NoPrompt),
        &settings(device, strategy),
        dir.path().join(format!("{device}-state.json")),
    )
    .await
    .unwrap()
}

fn completed(outcome: SyncOutcome) -> SyncSummary {
    match outcome {
        SyncOutcome::Completed(summary) => summary,
        SyncOutcome::Skipped => panic!("cycle unexpectedly skipped"),
    }
}

fn p(raw: &str) -> SyncPath {
    SyncPath::parse(raw).unwrap()
}

#[tokio::test]
async fn fresh_client_fresh_server_uploads_everything() {
    let dir = TempDir::new().unwrap();
    let remote = InMemoryRemote::new();
    let vault = Arc::new(MemoryVault::new());
    vault.write_text(&p("a.md"), "hello").await.unwrap();

    let engine = engine_for("laptop", remote.clone(), vault, ConflictStrategy::Ask, &dir).await;
    let summary = completed(engine.sync(false).await.unwrap());

    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.conflicts_resolved, 0);
    assert_eq!(summary.commit_attempts, 1);

    // Server holds the bytes and a manifest describing them.
    assert_eq!(remote.file("a.md").unwrap(), b"hello");
    let (server_manifest, etag) = remote.current_manifest().unwrap();
    let entry = server_manifest.get("a.md").unwrap();
    assert_eq!(entry.hash, content_hash(b"hello"));
    assert_eq!(entry.last_modified_by, "laptop");

    // The committed manifest became the device base.
    let base = engine.base_state().await;
    assert_eq!(base.base_manifest.unwrap(), server_manifest);
    assert_eq!(base.last_etag.unwrap(), etag);
}

#[tokio::test]
async fn non_conflicting_edits_cross_without_conflicts() {
    let dir = TempDir::new().unwrap();
    let remote = InMemoryRemote::new();

    // Device X seeds the server.
    let vault_x = Arc::new(MemoryVault::new());
    vault_x.write_text(&p("a.md"), "a-v1").await.unwrap();
    vault_x.write_text(&p("b.md"), "b-v1").await.unwrap();
    let engine_x = engine_for(
        "x",
        remote.clone(),
        vault_x.clone(),
        ConflictStrategy::Ask,
        &dir,
    )
    .await;
    completed(engine_x.sync(false).await.unwrap());

    // Device Y joins and downloads both files.
    let vault_y = Arc::new(MemoryVault::new());
    let engine_y = engine_for(
        "y",
        remote.clone(),
        vault_y.clone(),
        ConflictStrategy::Ask,
        &dir,
    )
    .await;
    let summary = completed(engine_y.sync(false).await.unwrap());
    assert_eq!(summary.downloaded, 2);

    // Y edits b.md and commits first.
    vault_y.write_text(&p("b.md"), "b-v3").await.unwrap();
    completed(engine_y.sync(false).await.unwrap());

    // X edits a.md; its cycle must upload a.md and download b.md, no
    // conflicts anywhere.
    vault_x.write_text(&p("a.md"), "a-v2").await.unwrap();
    let summary = completed(engine_x.sync(false).await.unwrap());

    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.conflicts_resolved, 0);

    assert_eq!(vault_x.read_text(&p("b.md")).await.unwrap(), "b-v3");
    let (server_manifest, _) = remote.current_manifest().unwrap();
    assert_eq!(
        server_manifest.get("a.md").unwrap().hash,
        content_hash(b"a-v2")
    );
    assert_eq!(
        server_manifest.get("b.md").unwrap().hash,
        content_hash(b"b-v3")
    );
    assert_eq!(
        engine_x.base_state().await.base_manifest.unwrap(),
        server_manifest
    );
}

#[tokio::test]
async fn overlapping_edits_merge_cleanly_with_three_way_strategy() {
    let dir = TempDir::new().unwrap();
    let remote = InMemoryRemote::new();

    let vault_x = Arc::new(MemoryVault::new());
    vault_x
        .write_text(&p("a.md"), "line1\nline2\nline3")
        .await
        .unwrap();
    let engine_x = engine_for(
        "x",
        remote.clone(),
        vault_x.clone(),
        ConflictStrategy::ThreeWayMerge,
        &dir,
    )
    .await;
    completed(engine_x.sync(false).await.unwrap());

    let vault_y = Arc::new(MemoryVault::new());
    let engine_y = engine_for(
        "y",
        remote.clone(),
        vault_y.clone(),
        ConflictStrategy::ThreeWayMerge,
        &dir,
    )
    .await;
    completed(engine_y.sync(false).await.unwrap());

    // Y edits the tail and commits.
    vault_y
        .write_text(&p("a.md"), "line1\nline2\nREMOTE")
        .await
        .unwrap();
    completed(engine_y.sync(false).await.unwrap());

    // X edits the head concurrently; its cycle sees a conflict and merges.
    vault_x
        .write_text(&p("a.md"), "LOCAL\nline2\nline3")
        .await
        .unwrap();
    let summary = completed(engine_x.sync(false).await.unwrap());
    assert_eq!(summary.conflicts_resolved, 1);
    assert_eq!(summary.uploaded, 1);

    let merged = vault_x.read_text(&p("a.md")).await.unwrap();
    assert!(merged.contains("LOCAL"));
    assert!(merged.contains("REMOTE"));
    assert!(
        !merged.contains("<<<<<<<"),
        "disjoint edits must merge cleanly, got:\n{merged}"
    );

    // The merged version is what the server now describes and stores.
    let (server_manifest, _) = remote.current_manifest().unwrap();
    assert_eq!(
        server_manifest.get("a.md").unwrap().hash,
        content_hash(merged.as_bytes())
    );
    assert_eq!(remote.file("a.md").unwrap(), merged.as_bytes());
}

#[tokio::test]
async fn losing_a_commit_race_retries_and_succeeds() {
    let dir = TempDir::new().unwrap();
    let remote = InMemoryRemote::new();

    // Seed the server with a shared baseline for Y.
    let vault_seed = Arc::new(MemoryVault::new());
    vault_seed.write_text(&p("a.md"), "a-v1").await.unwrap();
    vault_seed.write_text(&p("b.md"), "b-v1").await.unwrap();
    let seeder = engine_for(
        "seed",
        remote.clone(),
        vault_seed,
        ConflictStrategy::Ask,
        &dir,
    )
    .await;
    completed(seeder.sync(false).await.unwrap());

    let vault_y = Arc::new(MemoryVault::new());
    let racing = Arc::new(RacingRemote {
        inner: remote.clone(),
        raced: AtomicBool::new(false),
        interloper_path: "a.md".to_string(),
        interloper_data: b"a-v2-from-x".to_vec(),
    });
    let engine_y = engine_for(
        "y",
        racing,
        vault_y.clone(),
        ConflictStrategy::Ask,
        &dir,
    )
    .await;
    completed(engine_y.sync(false).await.unwrap());

    // Y edits b.md; mid-commit, X lands a.md first and Y's If-Match goes
    // stale. Y must refetch, rediff, and commit on the second attempt.
    vault_y.write_text(&p("b.md"), "b-v2-from-y").await.unwrap();
    let summary = completed(engine_y.sync(false).await.unwrap());

    assert_eq!(summary.commit_attempts, 2);

    let (server_manifest, _) = remote.current_manifest().unwrap();
    assert_eq!(
        server_manifest.get("a.md").unwrap().hash,
        content_hash(b"a-v2-from-x"),
        "the interloper's edit must survive"
    );
    assert_eq!(
        server_manifest.get("b.md").unwrap().hash,
        content_hash(b"b-v2-from-y"),
        "our edit must land too"
    );
    assert_eq!(
        engine_y.base_state().await.base_manifest.unwrap(),
        server_manifest
    );
    // The retried cycle also pulled the interloper's edit down.
    assert_eq!(
        vault_y.read_text(&p("a.md")).await.unwrap(),
        "a-v2-from-x"
    );
}

#[tokio::test]
async fn delete_versus_modify_resolves_to_remote_under_keep_remote() {
    let dir = TempDir::new().unwrap();
    let remote = InMemoryRemote::new();

    // Both devices agree on a.md@v1.
    let vault_x = Arc::new(MemoryVault::new());
    vault_x.write_text(&p("a.md"), "v1").await.unwrap();
    let engine_x = engine_for(
        "x",
        remote.clone(),
        vault_x.clone(),
        ConflictStrategy::KeepRemote,
        &dir,
    )
    .await;
    completed(engine_x.sync(false).await.unwrap());

    let vault_y = Arc::new(MemoryVault::new());
    let engine_y = engine_for(
        "y",
        remote.clone(),
        vault_y.clone(),
        ConflictStrategy::KeepRemote,
        &dir,
    )
    .await;
    completed(engine_y.sync(false).await.unwrap());

    // Y modifies and commits; X deletes locally.
    vault_y.write_text(&p("a.md"), "v2").await.unwrap();
    completed(engine_y.sync(false).await.unwrap());
    vault_x.remove(&p("a.md")).await.unwrap();

    let summary = completed(engine_x.sync(false).await.unwrap());

    assert_eq!(summary.conflicts_resolved, 1);
    assert_eq!(summary.downloaded, 1);
    assert_eq!(vault_x.read_text(&p("a.md")).await.unwrap(), "v2");

    let (server_manifest, _) = remote.current_manifest().unwrap();
    assert_eq!(server_manifest.get("a.md").unwrap().hash, content_hash(b"v2"));
}

#[tokio::test]
async fn unchanged_local_copy_accepts_remote_deletion() {
    let dir = TempDir::new().unwrap();
    let remote = InMemoryRemote::new();

    let vault_x = Arc::new(MemoryVault::new());
    vault_x.write_text(&p("a.md"), "v1").await.unwrap();
    vault_x.write_text(&p("keep.md"), "stays").await.unwrap();
    let engine_x = engine_for(
        "x",
        remote.clone(),
        vault_x.clone(),
        ConflictStrategy::Ask,
        &dir,
    )
    .await;
    completed(engine_x.sync(false).await.unwrap());

    let vault_y = Arc::new(MemoryVault::new());
    let engine_y = engine_for(
        "y",
        remote.clone(),
        vault_y.clone(),
        ConflictStrategy::Ask,
        &dir,
    )
    .await;
    completed(engine_y.sync(false).await.unwrap());

    // Y deletes a.md and commits the deletion.
    vault_y.remove(&p("a.md")).await.unwrap();
    let summary = completed(engine_y.sync(false).await.unwrap());
    assert_eq!(summary.deleted_remote, 1);

    // X's unchanged copy goes away without a conflict.
    let summary = completed(engine_x.sync(false).await.unwrap());
    assert_eq!(summary.deleted_local, 1);
    assert_eq!(summary.conflicts_resolved, 0);
    assert!(!vault_x.exists(&p("a.md")).await.unwrap());
    assert!(vault_x.exists(&p("keep.md")).await.unwrap());

    let (server_manifest, _) = remote.current_manifest().unwrap();
    assert!(server_manifest.get("a.md").is_none());
    assert!(server_manifest.get("keep.md").is_some());
}

#[tokio::test]
async fn force_full_sync_without_base_still_converges_identical_content() {
    let dir = TempDir::new().unwrap();
    let remote = InMemoryRemote::new();

    let vault = Arc::new(MemoryVault::new());
    vault.write_text(&p("a.md"), "same").await.unwrap();
    let engine = engine_for(
        "x",
        remote.clone(),
        vault.clone(),
        ConflictStrategy::Ask,
        &dir,
    )
    .await;
    completed(engine.sync(false).await.unwrap());

    // Identical hashes short-circuit, so a forced full sync is a no-op
    // apart from the manifest commit.
    let summary = completed(engine.sync(true).await.unwrap());
    assert_eq!(summary.uploaded, 0);
    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.conflicts_resolved, 0);
}

#[tokio::test]
async fn dismissed_prompt_counts_as_pending_conflict() {
    let dir = TempDir::new().unwrap();
    let remote = InMemoryRemote::new();

    let vault_x = Arc::new(MemoryVault::new());
    vault_x.write_text(&p("a.md"), "v1").await.unwrap();
    let engine_x = engine_for(
        "x",
        remote.clone(),
        vault_x.clone(),
        ConflictStrategy::Ask,
        &dir,
    )
    .await;
    completed(engine_x.sync(false).await.unwrap());

    let vault_y = Arc::new(MemoryVault::new());
    let engine_y = engine_for(
        "y",
        remote.clone(),
        vault_y.clone(),
        ConflictStrategy::Ask,
        &dir,
    )
    .await;
    completed(engine_y.sync(false).await.unwrap());

    vault_y.write_text(&p("a.md"), "y-edit").await.unwrap();
    completed(engine_y.sync(false).await.unwrap());
    vault_x.write_text(&p("a.md"), "x-edit").await.unwrap();

    // NoPrompt dismisses every ask, so keep-local applies and the cycle
    // reports the conflict as pending.
    let summary = completed(engine_x.sync(false).await.unwrap());
    assert_eq!(summary.conflicts_resolved, 1);
    assert_eq!(summary.conflicts_pending, 1);

    let (server_manifest, _) = remote.current_manifest().unwrap();
    assert_eq!(
        server_manifest.get("a.md").unwrap().hash,
        content_hash(b"x-edit")
    );
}
