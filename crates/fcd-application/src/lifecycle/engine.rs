//! Folder lifecycle state machine
//!
//! # Overview
//! One engine task per folder, owning its store exclusively. The machine
//! moves `Initializing → Scanning → (DownloadingModel) → Indexing →
//! Active`, falls back to `Error` on unrecoverable conditions and leaves
//! through `Removing`. Resumption is deterministic: the work queue is the
//! persisted file-state table, every file commits atomically, and rows
//! left `processing` by a crash are re-queued at open.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use fcd_domain::Error;
use fcd_domain::entities::{
    FileRecord, FileState, FolderProgress, FolderStatus, SemanticMetadata,
};
use fcd_domain::error::Result;
use fcd_domain::ids::{FolderId, ScanGeneration};
use fcd_domain::ports::{
    ChangeSet, ChangeStream, ChangeWatcher, Chunker, EmbeddingProvider, EmbeddingProviderFactory,
    FolderScanner, FolderStore, ProcessedFile, ScannedFile, SemanticExtractor, StoreFactory,
    TextExtractor,
};
use fcd_domain::registry;

use super::progress::ProgressTracker;
use super::recovery::{OpenFailureKind, classify_open_error, count_with_retry, quarantine_corrupted};
use crate::backoff::Backoff;
use crate::pool::{EmbedBatch, EmbeddingPool};

/// Everything an engine needs from the outside
pub struct EngineDeps {
    /// Store opener
    pub store_factory: Arc<dyn StoreFactory>,
    /// Full enumeration + single-file probing
    pub scanner: Arc<dyn FolderScanner>,
    /// Filesystem watcher
    pub watcher: Arc<dyn ChangeWatcher>,
    /// Text extraction collaborator
    pub extractor: Arc<dyn TextExtractor>,
    /// Chunker
    pub chunker: Arc<dyn Chunker>,
    /// Key-phrase / topic / readability extraction
    pub semantic: Arc<dyn SemanticExtractor>,
    /// Embedding provider factory (one provider per model)
    pub provider_factory: Arc<dyn EmbeddingProviderFactory>,
    /// Shared worker pool
    pub pool: Arc<EmbeddingPool>,
}

/// Per-folder settings fixed at spawn (model may change via reindex)
#[derive(Debug, Clone)]
pub struct FolderSettings {
    /// Embedding model id (must exist in the registry)
    pub model_id: String,
    /// Expected schema version from the sidecar resolution
    pub expected_schema: i32,
    /// Batch ceiling by chunk count
    pub max_batch_chunks: usize,
    /// Batch ceiling by text bytes
    pub max_batch_bytes: usize,
    /// Pool priority; lower dispatches first
    pub priority: u8,
}

/// Commands the orchestrator can send a running engine
#[derive(Debug, Clone)]
pub enum FolderCommand {
    /// Re-scan and re-index; optionally switch the embedding model
    Reindex {
        /// New model id, `None` keeps the current one
        model: Option<String>,
    },
    /// User removed the folder: cancel work, close the store, stop
    Remove,
    /// Daemon shutdown: close the store, stop
    Shutdown,
}

/// Events the engine publishes towards the orchestrator / FMDM
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// Status transition (also carries the error message for `Error`)
    StatusChanged {
        /// Folder concerned
        folder: FolderId,
        /// New status
        status: FolderStatus,
        /// Model the folder currently uses
        model: String,
        /// User-actionable message when status is `Error`
        error: Option<String>,
    },
    /// Progress counters moved
    Progress {
        /// Folder concerned
        folder: FolderId,
        /// Generation the counters belong to
        generation: ScanGeneration,
        /// The counters
        progress: FolderProgress,
    },
    /// The engine finished removal and stopped
    Removed {
        /// Folder concerned
        folder: FolderId,
    },
}

struct SharedState {
    status: RwLock<(FolderStatus, Option<String>)>,
    store: RwLock<Option<Arc<dyn FolderStore>>>,
    provider: RwLock<Option<Arc<dyn EmbeddingProvider>>>,
    model_id: RwLock<String>,
}

/// Handle the orchestrator keeps per folder.
///
/// Search and MCP reach the store only through [`FolderHandle::read_lease`],
/// which refuses while the folder is erroring or being removed.
pub struct FolderHandle {
    id: FolderId,
    commands: mpsc::Sender<FolderCommand>,
    shared: Arc<SharedState>,
    task: tokio::task::JoinHandle<()>,
}

impl FolderHandle {
    /// Folder identity
    #[must_use]
    pub fn id(&self) -> &FolderId {
        &self.id
    }

    /// Current status and error message
    #[must_use]
    pub fn status(&self) -> (FolderStatus, Option<String>) {
        self.shared
            .status
            .read()
            .map(|s| s.clone())
            .unwrap_or((FolderStatus::Error, Some("status lock poisoned".to_owned())))
    }

    /// Current model id
    #[must_use]
    pub fn model_id(&self) -> String {
        self.shared
            .model_id
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Borrow the store for reading.
    ///
    /// # Errors
    ///
    /// `StoreNotOpen` while the store is closed, erroring or removing.
    pub fn read_lease(&self) -> Result<Arc<dyn FolderStore>> {
        let (status, _) = self.status();
        if matches!(status, FolderStatus::Error | FolderStatus::Removing) {
            return Err(Error::StoreNotOpen {
                folder: self.id.to_string(),
            });
        }
        self.shared
            .store
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or_else(|| Error::StoreNotOpen {
                folder: self.id.to_string(),
            })
    }

    /// The folder's embedding provider, once created
    #[must_use]
    pub fn provider(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        self.shared.provider.read().ok().and_then(|guard| guard.clone())
    }

    /// Send a command to the engine task.
    ///
    /// # Errors
    ///
    /// `Cancelled` when the engine already stopped.
    pub async fn send(&self, command: FolderCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::cancelled(format!("engine for {} stopped", self.id)))
    }

    /// Wait for the engine task to finish (used at shutdown)
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Spawn the engine task for one folder
#[must_use]
pub fn spawn_folder_engine(
    folder: FolderId,
    settings: FolderSettings,
    deps: Arc<EngineDeps>,
    events: mpsc::UnboundedSender<LifecycleEvent>,
) -> FolderHandle {
    let (tx, rx) = mpsc::channel(16);
    let shared = Arc::new(SharedState {
        status: RwLock::new((FolderStatus::Initializing, None)),
        store: RwLock::new(None),
        provider: RwLock::new(None),
        model_id: RwLock::new(settings.model_id.clone()),
    });

    let engine = Engine {
        folder: folder.clone(),
        settings,
        deps,
        events,
        shared: Arc::clone(&shared),
        commands: rx,
    };
    let task = tokio::spawn(engine.run());

    FolderHandle {
        id: folder,
        commands: tx,
        shared,
        task,
    }
}

enum FileOutcome {
    Done { chunks: u64 },
    Failed,
    Skipped,
    Interrupted(FolderCommand),
}

enum CycleEnd {
    Settled,
    Interrupted(FolderCommand),
    Fatal(String),
}

struct Engine {
    folder: FolderId,
    settings: FolderSettings,
    deps: Arc<EngineDeps>,
    events: mpsc::UnboundedSender<LifecycleEvent>,
    shared: Arc<SharedState>,
    commands: mpsc::Receiver<FolderCommand>,
}

impl Engine {
    async fn run(mut self) {
        loop {
            let store = match self.open_with_recovery().await {
                Ok(store) => store,
                Err(e) => {
                    let kind = classify_open_error(&e);
                    error!(folder = %self.folder, error = %e, ?kind, "store open failed");
                    self.set_status(FolderStatus::Error, Some(e.to_string()));
                    match self.error_loop().await {
                        ErrorNext::Retry => continue,
                        ErrorNext::Stop { removed } => {
                            if removed {
                                let _ = self.events.send(LifecycleEvent::Removed {
                                    folder: self.folder.clone(),
                                });
                            }
                            return;
                        }
                    }
                }
            };

            if let Ok(mut guard) = self.shared.store.write() {
                *guard = Some(Arc::clone(&store));
            }

            match self.serve(Arc::clone(&store)).await {
                ServeEnd::Removed => {
                    self.finish_store(&store).await;
                    let _ = self.events.send(LifecycleEvent::Removed {
                        folder: self.folder.clone(),
                    });
                    return;
                }
                ServeEnd::Shutdown => {
                    self.finish_store(&store).await;
                    return;
                }
                ServeEnd::Errored(message) => {
                    self.finish_store(&store).await;
                    self.set_status(FolderStatus::Error, Some(message));
                    match self.error_loop().await {
                        ErrorNext::Retry => continue,
                        ErrorNext::Stop { removed } => {
                            if removed {
                                let _ = self.events.send(LifecycleEvent::Removed {
                                    folder: self.folder.clone(),
                                });
                            }
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn finish_store(&self, store: &Arc<dyn FolderStore>) {
        if let Ok(mut guard) = self.shared.store.write() {
            *guard = None;
        }
        if let Err(e) = store.close().await {
            warn!(folder = %self.folder, error = %e, "store close failed");
        }
    }

    /// Open the store, applying the recovery policy: corruption is
    /// quarantined and retried once with a fresh file; environment errors,
    /// schema mismatches and lock conflicts surface unchanged; transient
    /// failures get bounded backoff.
    async fn open_with_recovery(&mut self) -> Result<Arc<dyn FolderStore>> {
        self.set_status(FolderStatus::Initializing, None);
        let backoff = Backoff::default();
        let mut attempt = 0u32;
        let mut quarantined = false;

        loop {
            match self
                .deps
                .store_factory
                .open(&self.folder, self.settings.expected_schema)
                .await
            {
                Ok(store) => return Ok(store),
                Err(e) => match classify_open_error(&e) {
                    OpenFailureKind::Corruption if !quarantined => {
                        let db_path = self
                            .folder
                            .as_path()
                            .join(fcd_domain::constants::store::FOLDER_DATA_DIR)
                            .join(fcd_domain::constants::store::DB_FILE);
                        quarantine_corrupted(&db_path)?;
                        quarantined = true;
                    }
                    OpenFailureKind::Transient if attempt < backoff.max_attempts => {
                        let delay = backoff.delay(attempt);
                        warn!(folder = %self.folder, error = %e, attempt, "transient open failure; retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    _ => return Err(e),
                },
            }
        }
    }

    async fn serve(&mut self, store: Arc<dyn FolderStore>) -> ServeEnd {
        // Crash recovery: no file may stay in `processing`
        if let Err(e) = store.reset_processing().await {
            return ServeEnd::Errored(format!("crash recovery failed: {e}"));
        }
        if let Err(e) = self.reconcile_model(&store).await {
            return ServeEnd::Errored(e.to_string());
        }

        let mut provider = match self.make_provider() {
            Ok(provider) => provider,
            Err(e) => return ServeEnd::Errored(e.to_string()),
        };

        let mut watch = match self.deps.watcher.watch(self.folder.as_path()).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(folder = %self.folder, error = %e, "watcher unavailable; folder will rely on manual rescans");
                None
            }
        };

        let mut full_scan = true;
        loop {
            let end = self.cycle(&store, &provider, full_scan).await;
            full_scan = false;
            match end {
                CycleEnd::Settled => {}
                CycleEnd::Fatal(message) => return ServeEnd::Errored(message),
                CycleEnd::Interrupted(cmd) => match self.obey(cmd, &store).await {
                    Obeyed::Continue { rescan } => {
                        full_scan = rescan;
                        // A reindex may have swapped the model
                        if let Some(fresh) = self.current_provider() {
                            provider = fresh;
                        }
                        continue;
                    }
                    Obeyed::Removed => return ServeEnd::Removed,
                    Obeyed::Shutdown => return ServeEnd::Shutdown,
                },
            }

            self.set_status(FolderStatus::Active, None);

            // Wait for changes or commands
            let next = self.wait_next(&mut watch).await;
            match next {
                Waited::Command(cmd) => match self.obey(cmd, &store).await {
                    Obeyed::Continue { rescan } => {
                        full_scan = rescan;
                        if let Some(fresh) = self.current_provider() {
                            provider = fresh;
                        }
                    }
                    Obeyed::Removed => return ServeEnd::Removed,
                    Obeyed::Shutdown => return ServeEnd::Shutdown,
                },
                Waited::Changes(set) => {
                    if let Err(e) = self.apply_changes(&store, set).await {
                        warn!(folder = %self.folder, error = %e, "change application failed; forcing rescan");
                        full_scan = true;
                    }
                }
                Waited::WatcherGone => {
                    watch = None;
                }
            }
        }
    }

    fn current_provider(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        self.shared.provider.read().ok().and_then(|guard| guard.clone())
    }

    fn make_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let descriptor = registry::get(&self.settings.model_id).ok_or_else(|| {
            Error::config(format!("unknown model '{}'", self.settings.model_id))
        })?;
        let provider = self.deps.provider_factory.create(descriptor)?;
        if let Ok(mut guard) = self.shared.provider.write() {
            *guard = Some(Arc::clone(&provider));
        }
        if let Ok(mut guard) = self.shared.model_id.write() {
            *guard = self.settings.model_id.clone();
        }
        Ok(provider)
    }

    /// Reconcile configured model vs stored model and protect against the
    /// ambiguous-zero trap: a transient count failure must not be read as
    /// "no prior work".
    async fn reconcile_model(&self, store: &Arc<dyn FolderStore>) -> Result<()> {
        let stored = store.model_id().await?;
        match stored {
            None => store.set_model_id(&self.settings.model_id).await?,
            Some(ref stored_model) if stored_model != &self.settings.model_id => {
                info!(
                    folder = %self.folder,
                    from = %stored_model,
                    to = %self.settings.model_id,
                    "model changed; vectors will be rebuilt"
                );
                store.set_model_id(&self.settings.model_id).await?;
                self.requeue_all_done(store).await?;
            }
            Some(_) => {
                let count = count_with_retry(store, Backoff::default()).await?;
                if count == 0 {
                    let records = store.file_records().await?;
                    let stale: Vec<&FileRecord> = records
                        .iter()
                        .filter(|r| r.state == FileState::Done)
                        .collect();
                    if !stale.is_empty() {
                        warn!(
                            folder = %self.folder,
                            files = stale.len(),
                            "store reports zero embeddings but files are marked done; requeueing"
                        );
                        self.requeue_all_done(store).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn requeue_all_done(&self, store: &Arc<dyn FolderStore>) -> Result<()> {
        for record in store.file_records().await? {
            if record.state == FileState::Done {
                let mut requeued = record;
                requeued.state = FileState::Pending;
                requeued.failure = None;
                store.upsert_file(&requeued).await?;
            }
        }
        Ok(())
    }

    /// One scan-and-drain cycle. `full_scan` reconciles the whole tree;
    /// otherwise only already-pending rows are drained.
    async fn cycle(
        &mut self,
        store: &Arc<dyn FolderStore>,
        provider: &Arc<dyn EmbeddingProvider>,
        full_scan: bool,
    ) -> CycleEnd {
        if full_scan {
            self.set_status(FolderStatus::Scanning, None);
            if let Err(e) = self.reconcile_tree(store).await {
                return CycleEnd::Fatal(format!("scan failed: {e}"));
            }
        }

        let pending = match store.pending_files().await {
            Ok(pending) => pending,
            Err(e) => return CycleEnd::Fatal(format!("work queue unavailable: {e}")),
        };

        let generation = match store.bump_scan_generation().await {
            Ok(generation) => generation,
            Err(e) => return CycleEnd::Fatal(format!("generation bump failed: {e}")),
        };
        let mut tracker = ProgressTracker::new(generation, pending.len() as u64);
        self.emit_progress(&tracker);

        if pending.is_empty() {
            if full_scan && let Err(e) = store.set_last_full_scan(chrono::Utc::now()).await {
                warn!(folder = %self.folder, error = %e, "could not record scan time");
            }
            debug!(folder = %self.folder, "nothing to do");
            return CycleEnd::Settled;
        }

        // Model readiness gates indexing; a cached model skips the
        // download state entirely
        if !provider.is_cached() {
            self.set_status(FolderStatus::DownloadingModel, None);
        }
        if let Err(e) = self.ensure_provider_ready(provider).await {
            return CycleEnd::Fatal(e.to_string());
        }

        self.set_status(FolderStatus::Indexing, None);
        for file in &pending {
            if let Some(cmd) = self.poll_command() {
                return CycleEnd::Interrupted(cmd);
            }
            match self.process_file(store, provider, file).await {
                FileOutcome::Done { chunks } => tracker.file_finished(chunks),
                FileOutcome::Failed | FileOutcome::Skipped => tracker.file_finished(0),
                FileOutcome::Interrupted(cmd) => return CycleEnd::Interrupted(cmd),
            }
            self.emit_progress(&tracker);
        }

        if full_scan && let Err(e) = store.set_last_full_scan(chrono::Utc::now()).await {
            warn!(folder = %self.folder, error = %e, "could not record scan time");
        }
        CycleEnd::Settled
    }

    async fn ensure_provider_ready(&self, provider: &Arc<dyn EmbeddingProvider>) -> Result<()> {
        let backoff = Backoff::default();
        let total = std::time::Duration::from_secs(
            fcd_domain::constants::time::MODEL_DOWNLOAD_TIMEOUT_SECS,
        );
        let mut attempt = 0u32;
        loop {
            let outcome = tokio::time::timeout(total, provider.ensure_ready())
                .await
                .unwrap_or_else(|_| Err(Error::timeout("model download")));
            match outcome {
                Ok(()) => return Ok(()),
                Err(e @ (Error::ModelDownload { .. } | Error::Timeout { .. }))
                    if attempt < backoff.max_attempts =>
                {
                    let delay = backoff.delay(attempt);
                    warn!(folder = %self.folder, error = %e, attempt, "model load failed; backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Diff the scanned tree against stored file records: upsert new and
    /// changed files as pending, pair up renames through fingerprints,
    /// drop vanished files (cascading their chunks and vectors).
    async fn reconcile_tree(&self, store: &Arc<dyn FolderStore>) -> Result<()> {
        let scanned = self.deps.scanner.scan(self.folder.as_path()).await?;
        let existing: HashMap<String, FileRecord> = store
            .file_records()
            .await?
            .into_iter()
            .map(|r| (r.rel_path.clone(), r))
            .collect();

        let scanned_paths: std::collections::HashSet<&str> =
            scanned.iter().map(|s| s.rel_path.as_str()).collect();
        let mut fresh: Vec<&ScannedFile> = scanned
            .iter()
            .filter(|s| !existing.contains_key(&s.rel_path))
            .collect();
        let missing: Vec<&FileRecord> = existing
            .values()
            .filter(|r| !scanned_paths.contains(r.rel_path.as_str()))
            .collect();

        // Rename pairing: a vanished record whose fingerprint reappears at
        // a new path is a move, not new content
        let mut consumed: std::collections::HashSet<String> = std::collections::HashSet::new();
        for gone in &missing {
            if let Some(target) = fresh.iter().find(|s| {
                s.fingerprint == gone.fingerprint && !consumed.contains(&s.rel_path)
            }) {
                info!(folder = %self.folder, from = %gone.rel_path, to = %target.rel_path, "rename detected");
                store.rename_file(&gone.rel_path, &target.rel_path).await?;
                consumed.insert(target.rel_path.clone());
            } else {
                store.remove_file(&gone.rel_path).await?;
            }
        }
        fresh.retain(|s| !consumed.contains(&s.rel_path));

        let now = chrono::Utc::now();
        for new_file in fresh {
            store
                .upsert_file(&scan_to_record(new_file, now, None))
                .await?;
        }
        for current in &scanned {
            if let Some(record) = existing.get(&current.rel_path)
                && !consumed.contains(&current.rel_path)
                && record.fingerprint != current.fingerprint
            {
                store
                    .upsert_file(&scan_to_record(current, record.discovered_at, None))
                    .await?;
            }
        }
        Ok(())
    }

    /// Apply a debounced watcher change set without a full rescan
    async fn apply_changes(&self, store: &Arc<dyn FolderStore>, set: ChangeSet) -> Result<()> {
        for (old, new) in &set.renamed {
            if store.document_by_path(old).await.is_ok()
                || store.file_records().await?.iter().any(|r| &r.rel_path == old)
            {
                store.rename_file(old, new).await?;
            }
        }

        let mut probed_adds: Vec<ScannedFile> = Vec::new();
        for path in set.added.iter().chain(set.modified.iter()) {
            if let Some(scan) = self
                .deps
                .scanner
                .probe_file(self.folder.as_path(), path)
                .await?
            {
                probed_adds.push(scan);
            }
        }

        let existing: HashMap<String, FileRecord> = store
            .file_records()
            .await?
            .into_iter()
            .map(|r| (r.rel_path.clone(), r))
            .collect();

        let mut consumed: std::collections::HashSet<String> = std::collections::HashSet::new();
        for path in &set.removed {
            let Some(record) = existing.get(path) else { continue };
            // Split rename: the content reappeared elsewhere untouched
            if let Some(target) = probed_adds.iter().find(|s| {
                s.fingerprint == record.fingerprint
                    && !existing.contains_key(&s.rel_path)
                    && !consumed.contains(&s.rel_path)
            }) {
                info!(folder = %self.folder, from = %path, to = %target.rel_path, "rename reassembled from events");
                store.rename_file(path, &target.rel_path).await?;
                consumed.insert(target.rel_path.clone());
            } else {
                store.remove_file(path).await?;
            }
        }

        let now = chrono::Utc::now();
        for scan in probed_adds {
            if consumed.contains(&scan.rel_path) {
                continue;
            }
            match existing.get(&scan.rel_path) {
                Some(record) if record.fingerprint == scan.fingerprint => {}
                Some(record) => {
                    store
                        .upsert_file(&scan_to_record(&scan, record.discovered_at, None))
                        .await?;
                }
                None => {
                    store.upsert_file(&scan_to_record(&scan, now, None)).await?;
                }
            }
        }
        Ok(())
    }

    async fn process_file(
        &mut self,
        store: &Arc<dyn FolderStore>,
        provider: &Arc<dyn EmbeddingProvider>,
        file: &FileRecord,
    ) -> FileOutcome {
        let rel_path = &file.rel_path;
        if let Err(e) = store.mark_processing(rel_path).await {
            warn!(folder = %self.folder, file = %rel_path, error = %e, "cannot claim file");
            return FileOutcome::Failed;
        }

        let abs_path = self.folder.as_path().join(rel_path);
        let extracted = match self.deps.extractor.extract(&abs_path).await {
            Ok(extracted) => extracted,
            Err(e) => {
                let _ = store.mark_failed(rel_path, &e.to_string()).await;
                return FileOutcome::Failed;
            }
        };
        if extracted.text.trim().is_empty() {
            let _ = store.mark_skipped(rel_path, "empty document").await;
            return FileOutcome::Skipped;
        }

        let drafts = self.deps.chunker.chunk(&extracted.text, &extracted.pages);
        if drafts.is_empty() {
            let _ = store.mark_skipped(rel_path, "no chunkable content").await;
            return FileOutcome::Skipped;
        }

        let mut chunks = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let semantic = self.semantic_for(&draft.text, draft.chunk_index);
            chunks.push((draft, semantic));
        }

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch_texts in batch_texts(
            &chunks,
            self.settings.max_batch_chunks,
            self.settings.max_batch_bytes,
        ) {
            let batch = EmbedBatch {
                folder: self.folder.clone(),
                priority: self.settings.priority,
                provider: Arc::clone(provider),
                texts: batch_texts,
            };
            match self.deps.pool.submit(batch).await {
                Ok(mut batch_vectors) => vectors.append(&mut batch_vectors),
                Err(Error::Cancelled { .. }) => {
                    // The folder is going away; leave the file pending-ish
                    let _ = store.mark_failed(rel_path, "cancelled").await;
                    return FileOutcome::Interrupted(FolderCommand::Remove);
                }
                Err(e) => {
                    let _ = store
                        .mark_failed(rel_path, &format!("embedding failed: {e}"))
                        .await;
                    return FileOutcome::Failed;
                }
            }
        }

        let chunk_total = chunks.len() as u64;
        let outcome = ProcessedFile {
            rel_path: rel_path.clone(),
            fingerprint: file.fingerprint.clone(),
            size: file.size,
            text: extracted.text,
            pages: extracted.pages,
            language_hint: extracted.language_hint,
            chunks,
            vectors,
            model_id: provider.model_id().to_owned(),
        };
        match store.write_processed(&outcome).await {
            Ok(_) => FileOutcome::Done { chunks: chunk_total },
            Err(e) => {
                error!(folder = %self.folder, file = %rel_path, error = %e, "commit failed");
                let _ = store.mark_failed(rel_path, &e.to_string()).await;
                FileOutcome::Failed
            }
        }
    }

    /// Semantic metadata with the no-empty-phrases guarantee applied
    fn semantic_for(&self, text: &str, chunk_index: u32) -> SemanticMetadata {
        let mut semantic = match self.deps.semantic.extract(text) {
            Ok(semantic) => semantic,
            Err(e) => {
                debug!(folder = %self.folder, chunk = chunk_index, error = %e, "semantic extraction failed; using fallback");
                SemanticMetadata {
                    key_phrases: Vec::new(),
                    topics: Vec::new(),
                    readability: 0.0,
                }
            }
        };
        if semantic.key_phrases.is_empty() {
            semantic.key_phrases = self.deps.semantic.fallback_phrases(text);
        }
        if semantic.key_phrases.is_empty() {
            // Last resort for degenerate content; the store rejects empty
            semantic.key_phrases = vec![format!("chunk {chunk_index}")];
        }
        semantic.key_phrases.truncate(10);
        semantic.topics.truncate(5);
        semantic
    }

    fn poll_command(&mut self) -> Option<FolderCommand> {
        self.commands.try_recv().ok()
    }

    async fn wait_next(&mut self, watch: &mut Option<Box<dyn ChangeStream>>) -> Waited {
        match watch.as_deref_mut() {
            Some(stream) => {
                tokio::select! {
                    cmd = self.commands.recv() => match cmd {
                        Some(cmd) => Waited::Command(cmd),
                        None => Waited::Command(FolderCommand::Shutdown),
                    },
                    changes = stream.next_changes() => match changes {
                        Some(set) => Waited::Changes(set),
                        None => Waited::WatcherGone,
                    },
                }
            }
            None => match self.commands.recv().await {
                Some(cmd) => Waited::Command(cmd),
                None => Waited::Command(FolderCommand::Shutdown),
            },
        }
    }

    async fn obey(&mut self, command: FolderCommand, store: &Arc<dyn FolderStore>) -> Obeyed {
        match command {
            FolderCommand::Reindex { model } => {
                if let Some(model) = model {
                    self.settings.model_id = model;
                }
                if let Err(e) = self.reconcile_model(store).await {
                    warn!(folder = %self.folder, error = %e, "model reconcile failed during reindex");
                }
                // Failed files get another chance on an explicit reindex
                if let Ok(records) = store.file_records().await {
                    for record in records {
                        if record.state == FileState::Failed {
                            let mut retry = record;
                            retry.state = FileState::Pending;
                            retry.failure = None;
                            let _ = store.upsert_file(&retry).await;
                        }
                    }
                }
                if let Err(e) = self.make_provider() {
                    warn!(folder = %self.folder, error = %e, "provider rebuild failed during reindex");
                }
                Obeyed::Continue { rescan: true }
            }
            FolderCommand::Remove => {
                self.set_status(FolderStatus::Removing, None);
                self.deps.pool.cancel_folder(&self.folder);
                Obeyed::Removed
            }
            FolderCommand::Shutdown => Obeyed::Shutdown,
        }
    }

    async fn error_loop(&mut self) -> ErrorNext {
        loop {
            match self.commands.recv().await {
                Some(FolderCommand::Reindex { model }) => {
                    if let Some(model) = model {
                        self.settings.model_id = model;
                    }
                    return ErrorNext::Retry;
                }
                Some(FolderCommand::Remove) => {
                    self.set_status(FolderStatus::Removing, None);
                    self.deps.pool.cancel_folder(&self.folder);
                    return ErrorNext::Stop { removed: true };
                }
                Some(FolderCommand::Shutdown) | None => {
                    return ErrorNext::Stop { removed: false };
                }
            }
        }
    }

    fn set_status(&self, status: FolderStatus, error: Option<String>) {
        if let Ok(mut guard) = self.shared.status.write() {
            *guard = (status, error.clone());
        }
        let model = self
            .shared
            .model_id
            .read()
            .map(|m| m.clone())
            .unwrap_or_default();
        let _ = self.events.send(LifecycleEvent::StatusChanged {
            folder: self.folder.clone(),
            status,
            model,
            error,
        });
    }

    fn emit_progress(&self, tracker: &ProgressTracker) {
        let _ = self.events.send(LifecycleEvent::Progress {
            folder: self.folder.clone(),
            generation: tracker.generation(),
            progress: tracker.snapshot(),
        });
    }
}

enum ServeEnd {
    Removed,
    Shutdown,
    Errored(String),
}

enum Obeyed {
    Continue { rescan: bool },
    Removed,
    Shutdown,
}

enum ErrorNext {
    Retry,
    Stop { removed: bool },
}

enum Waited {
    Command(FolderCommand),
    Changes(ChangeSet),
    WatcherGone,
}

fn scan_to_record(
    scan: &ScannedFile,
    discovered_at: chrono::DateTime<chrono::Utc>,
    failure: Option<String>,
) -> FileRecord {
    let (state, failure) = if scan.supported {
        (FileState::Pending, failure)
    } else {
        (FileState::Skipped, scan.skip_reason.clone())
    };
    FileRecord {
        rel_path: scan.rel_path.clone(),
        fingerprint: scan.fingerprint.clone(),
        size: scan.size,
        discovered_at,
        last_processed_at: None,
        state,
        failure,
    }
}

/// Split chunk texts into pool batches bounded by count and bytes
fn batch_texts(
    chunks: &[(fcd_domain::entities::ChunkDraft, SemanticMetadata)],
    max_chunks: usize,
    max_bytes: usize,
) -> Vec<Vec<String>> {
    let mut batches = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_bytes = 0usize;
    for (draft, _) in chunks {
        let len = draft.text.len();
        if !current.is_empty() && (current.len() >= max_chunks || current_bytes + len > max_bytes) {
            batches.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current.push(draft.text.clone());
        current_bytes += len;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcd_domain::entities::ChunkDraft;

    fn draft(index: u32, text: &str) -> (ChunkDraft, SemanticMetadata) {
        (
            ChunkDraft {
                chunk_index: index,
                start_offset: 0,
                end_offset: text.len(),
                token_estimate: 1,
                text: text.to_owned(),
            },
            SemanticMetadata {
                key_phrases: vec!["p".to_owned()],
                topics: vec![],
                readability: 0.5,
            },
        )
    }

    #[test]
    fn batches_respect_chunk_count() {
        let chunks: Vec<_> = (0..7).map(|i| draft(i, "text")).collect();
        let batches = batch_texts(&chunks, 3, usize::MAX);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[2].len(), 1);
    }

    #[test]
    fn batches_respect_byte_budget() {
        let chunks: Vec<_> = (0..4).map(|i| draft(i, "0123456789")).collect();
        let batches = batch_texts(&chunks, 100, 25);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
    }

    #[test]
    fn oversized_single_chunk_still_ships() {
        let chunks = vec![draft(0, "this text alone exceeds the byte budget")];
        let batches = batch_texts(&chunks, 8, 4);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
    }
}
