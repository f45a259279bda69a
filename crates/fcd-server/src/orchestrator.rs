//! Daemon orchestrator
//!
//! # Overview
//! Owns the folder set: spawns one lifecycle engine per configured
//! folder, aggregates their events into FMDM snapshots, broadcasts every
//! snapshot whole (no patches) on each transition plus a 1 Hz tick while
//! anything is indexing, and fronts folder-scoped queries for the MCP and
//! control surfaces through read leases.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fcd_application::lifecycle::{
    EngineDeps, FolderCommand, FolderHandle, FolderSettings, LifecycleEvent, spawn_folder_engine,
};
use fcd_application::pool::EmbeddingPool;
use fcd_application::search::{SearchEngine, SearchRequest, SearchResponse};
use fcd_domain::Error;
use fcd_domain::constants::time::FMDM_TICK_MS;
use fcd_domain::entities::{FmdmSnapshot, FolderProgress, FolderStatus, FolderView};
use fcd_domain::error::Result;
use fcd_domain::ids::{FolderId, ScanGeneration};
use fcd_domain::ports::{CapabilityProbe, FolderStore};
use fcd_domain::registry;

use crate::registry_file::{self, FolderConfigEntry, FolderRegistry};

/// Per-folder progress cache fed by lifecycle events
#[derive(Default)]
struct ProgressCache {
    generation: ScanGeneration,
    progress: FolderProgress,
}

/// Owner of every folder engine and the FMDM publisher
pub struct Orchestrator {
    deps: Arc<EngineDeps>,
    pool: Arc<EmbeddingPool>,
    probe: Arc<dyn CapabilityProbe>,
    search_engine: SearchEngine,
    expected_schema: i32,
    batch_chunks: usize,
    batch_bytes: usize,
    registry_path: PathBuf,
    folders: DashMap<FolderId, FolderHandle>,
    progress: DashMap<FolderId, ProgressCache>,
    fmdm: ArcSwap<FmdmSnapshot>,
    fanout: broadcast::Sender<Arc<FmdmSnapshot>>,
    events_tx: mpsc::UnboundedSender<LifecycleEvent>,
    registry_lock: Mutex<()>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Assemble the orchestrator and start its event and tick tasks
    #[must_use]
    pub fn new(
        deps: Arc<EngineDeps>,
        pool: Arc<EmbeddingPool>,
        probe: Arc<dyn CapabilityProbe>,
        search_engine: SearchEngine,
        expected_schema: i32,
        batch_chunks: usize,
        batch_bytes: usize,
        registry_path: PathBuf,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (fanout, _) = broadcast::channel(64);

        let orchestrator = Arc::new(Self {
            deps,
            pool,
            probe,
            search_engine,
            expected_schema,
            batch_chunks,
            batch_bytes,
            registry_path,
            folders: DashMap::new(),
            progress: DashMap::new(),
            fmdm: ArcSwap::from_pointee(FmdmSnapshot::default()),
            fanout,
            events_tx,
            registry_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(Self::event_loop(Arc::clone(&orchestrator), events_rx));
        tokio::spawn(Self::tick_loop(Arc::clone(&orchestrator)));
        orchestrator
    }

    async fn event_loop(
        orchestrator: Arc<Self>,
        mut events_rx: mpsc::UnboundedReceiver<LifecycleEvent>,
    ) {
        while let Some(event) = events_rx.recv().await {
            match event {
                LifecycleEvent::Progress {
                    folder,
                    generation,
                    progress,
                } => {
                    orchestrator
                        .progress
                        .insert(folder, ProgressCache { generation, progress });
                }
                LifecycleEvent::StatusChanged { .. } => {}
                LifecycleEvent::Removed { folder } => {
                    orchestrator.folders.remove(&folder);
                    orchestrator.progress.remove(&folder);
                    info!(%folder, "folder removed");
                }
            }
            orchestrator.publish();
        }
    }

    async fn tick_loop(orchestrator: Arc<Self>) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(FMDM_TICK_MS));
        loop {
            tokio::select! {
                () = orchestrator.shutdown.cancelled() => return,
                _ = interval.tick() => {
                    if orchestrator.fmdm.load().any_indexing() {
                        orchestrator.publish();
                    }
                }
            }
        }
    }

    /// Rebuild the snapshot from live handles and broadcast it whole
    fn publish(&self) {
        let mut views: Vec<FolderView> = self
            .folders
            .iter()
            .map(|entry| {
                let (status, error) = entry.value().status();
                let cache = self.progress.get(entry.key());
                FolderView {
                    path: entry.key().to_string(),
                    status,
                    model: entry.value().model_id(),
                    generation: cache.as_ref().map_or(ScanGeneration(0), |c| c.generation),
                    progress: cache.as_ref().map_or(FolderProgress::default(), |c| c.progress),
                    error,
                }
            })
            .collect();
        views.sort_by(|a, b| a.path.cmp(&b.path));

        let snapshot = Arc::new(FmdmSnapshot {
            folders: views,
            generated_at: Some(chrono::Utc::now()),
        });
        self.fmdm.store(Arc::clone(&snapshot));
        let _ = self.fanout.send(snapshot);
    }

    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<FmdmSnapshot> {
        self.fmdm.load_full()
    }

    /// Subscribe to snapshot broadcasts
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<FmdmSnapshot>> {
        self.fanout.subscribe()
    }

    /// Resume every folder from the durable registry (daemon start)
    pub async fn resume_from_registry(self: &Arc<Self>) {
        let registry = match registry_file::load(&self.registry_path) {
            Ok(registry) => registry,
            Err(e) => {
                warn!(error = %e, "folder registry unreadable; starting empty");
                FolderRegistry::default()
            }
        };
        for entry in registry.folders {
            let folder = FolderId::from_canonical(Path::new(&entry.path));
            self.spawn_engine(folder, entry.model);
        }
        self.publish();
    }

    fn spawn_engine(self: &Arc<Self>, folder: FolderId, model: String) {
        self.pool.reinstate_folder(&folder);
        let handle = spawn_folder_engine(
            folder.clone(),
            FolderSettings {
                model_id: model,
                expected_schema: self.expected_schema,
                max_batch_chunks: self.batch_chunks,
                max_batch_bytes: self.batch_bytes,
                priority: 10,
            },
            Arc::clone(&self.deps),
            self.events_tx.clone(),
        );
        self.folders.insert(folder, handle);
    }

    /// Add a folder and persist it.
    ///
    /// # Errors
    ///
    /// Invalid path, unknown model or duplicate folder.
    pub async fn add_folder(self: &Arc<Self>, path: &Path, model: Option<String>) -> Result<FolderId> {
        let canonical = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| Error::invalid_argument(format!("{}: {e}", path.display())))?;
        if !canonical.is_dir() {
            return Err(Error::invalid_argument(format!(
                "{} is not a directory",
                canonical.display()
            )));
        }
        let model = model.unwrap_or_else(|| registry::default_model().id.to_owned());
        if registry::get(&model).is_none() {
            return Err(Error::invalid_argument(format!("unknown model '{model}'")));
        }

        let folder = FolderId::from_canonical(&canonical);
        if self.folders.contains_key(&folder) {
            return Err(Error::invalid_argument(format!(
                "folder {folder} is already configured"
            )));
        }

        self.persist_registry_edit(|registry| {
            registry.folders.push(FolderConfigEntry {
                path: folder.to_string(),
                model: model.clone(),
            });
        })?;
        self.spawn_engine(folder.clone(), model);
        self.publish();
        info!(%folder, "folder added");
        Ok(folder)
    }

    /// Remove a folder: cancel its queued work, close its store, drop it
    /// from the registry.
    ///
    /// # Errors
    ///
    /// Unknown folder, or an engine that already stopped.
    pub async fn remove_folder(self: &Arc<Self>, path: &Path) -> Result<()> {
        let folder = self.resolve(path)?;
        // Unblock the engine if it is waiting on the pool
        self.pool.cancel_folder(&folder);
        if let Some(entry) = self.folders.get(&folder) {
            entry.value().send(FolderCommand::Remove).await?;
        }
        self.persist_registry_edit(|registry| {
            registry.folders.retain(|f| f.path != folder.to_string());
        })?;
        Ok(())
    }

    /// Trigger a re-scan, optionally switching the model.
    ///
    /// # Errors
    ///
    /// Unknown folder or model.
    pub async fn reindex_folder(
        self: &Arc<Self>,
        path: &Path,
        model: Option<String>,
    ) -> Result<()> {
        if let Some(ref model) = model
            && registry::get(model).is_none()
        {
            return Err(Error::invalid_argument(format!("unknown model '{model}'")));
        }
        let folder = self.resolve(path)?;
        if let Some(ref model) = model {
            self.persist_registry_edit(|registry| {
                for entry in &mut registry.folders {
                    if entry.path == folder.to_string() {
                        entry.model = model.clone();
                    }
                }
            })?;
        }
        let entry = self
            .folders
            .get(&folder)
            .ok_or_else(|| Error::not_found(format!("folder {folder}")))?;
        entry.value().send(FolderCommand::Reindex { model }).await
    }

    fn persist_registry_edit(&self, edit: impl FnOnce(&mut FolderRegistry)) -> Result<()> {
        let _guard = self
            .registry_lock
            .lock()
            .map_err(|_| Error::internal("registry lock poisoned"))?;
        let mut registry = registry_file::load(&self.registry_path)?;
        edit(&mut registry);
        registry_file::save(&self.registry_path, &registry)
    }

    /// Resolve a user-supplied path to a configured folder id
    fn resolve(&self, path: &Path) -> Result<FolderId> {
        let folder = FolderId::from_canonical(path);
        if self.folders.contains_key(&folder) {
            return Ok(folder);
        }
        // The path may not be canonical (daemon restart, symlinks)
        if let Ok(canonical) = std::fs::canonicalize(path) {
            let canonical_id = FolderId::from_canonical(&canonical);
            if self.folders.contains_key(&canonical_id) {
                return Ok(canonical_id);
            }
        }
        Err(Error::not_found(format!("folder {}", path.display())))
    }

    /// Read lease for one folder's store
    ///
    /// # Errors
    ///
    /// Unknown folder or store not open.
    pub fn read_lease(&self, path: &Path) -> Result<Arc<dyn FolderStore>> {
        let folder = self.resolve(path)?;
        let entry = self
            .folders
            .get(&folder)
            .ok_or_else(|| Error::not_found(format!("folder {folder}")))?;
        entry.value().read_lease()
    }

    /// Execute a search over one folder, or over all folders when `path`
    /// is `None` (scores merge into one ranked list).
    ///
    /// # Errors
    ///
    /// Unknown folder; store access failures.
    pub async fn search(
        self: &Arc<Self>,
        path: Option<&Path>,
        request: &SearchRequest,
    ) -> Result<SearchResponse> {
        let targets: Vec<FolderId> = match path {
            Some(path) => vec![self.resolve(path)?],
            None => self.folders.iter().map(|e| e.key().clone()).collect(),
        };
        if targets.is_empty() {
            return Ok(SearchResponse {
                hits: Vec::new(),
                truncated: false,
                fallback: false,
                reason: Some("no folders configured".to_owned()),
            });
        }

        let mut merged = SearchResponse {
            hits: Vec::new(),
            truncated: false,
            fallback: false,
            reason: None,
        };
        let mut errors: Vec<String> = Vec::new();
        for folder in targets {
            // Take what we need and release the map entry before awaiting
            let leased = self
                .folders
                .get(&folder)
                .map(|entry| (entry.value().read_lease(), entry.value().provider()));
            let Some((lease, provider)) = leased else { continue };
            let Ok(store) = lease else {
                errors.push(format!("{folder}: store unavailable"));
                continue;
            };
            let Some(provider) = provider else {
                errors.push(format!("{folder}: model not loaded"));
                continue;
            };
            match self.search_engine.search(&store, &provider, request).await {
                Ok(response) => {
                    merged.truncated |= response.truncated;
                    merged.fallback |= response.fallback;
                    if merged.reason.is_none() {
                        merged.reason = response.reason;
                    }
                    merged.hits.extend(response.hits);
                }
                Err(e) => errors.push(format!("{folder}: {e}")),
            }
        }
        merged
            .hits
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if !errors.is_empty() && merged.hits.is_empty() && merged.reason.is_none() {
            merged.reason = Some(errors.join("; "));
        }
        Ok(merged)
    }

    /// Per-folder handle access for the MCP layer
    #[must_use]
    pub fn folder_status(&self, path: &Path) -> Option<(FolderStatus, Option<String>, String)> {
        let folder = self.resolve(path).ok()?;
        let entry = self.folders.get(&folder)?;
        let (status, error) = entry.value().status();
        Some((status, error, entry.value().model_id()))
    }

    /// Hardware probe shared with diagnostics
    #[must_use]
    pub fn probe(&self) -> &Arc<dyn CapabilityProbe> {
        &self.probe
    }

    /// Iterate configured folder paths with their models
    #[must_use]
    pub fn folder_list(&self) -> Vec<(String, String)> {
        self.folders
            .iter()
            .map(|e| (e.key().to_string(), e.value().model_id()))
            .collect()
    }

    /// Per-folder active backends (diagnostics)
    #[must_use]
    pub fn active_backends(&self) -> HashMap<String, String> {
        self.folders
            .iter()
            .filter_map(|e| {
                e.value()
                    .provider()
                    .map(|p| (e.key().to_string(), p.active_backend().to_string()))
            })
            .collect()
    }

    /// Orderly shutdown: every engine closes its store before we return
    pub async fn shutdown(self: &Arc<Self>) {
        info!("daemon shutting down");
        self.shutdown.cancel();
        let handles: Vec<FolderId> = self.folders.iter().map(|e| e.key().clone()).collect();
        for folder in handles {
            if let Some((_, handle)) = self.folders.remove(&folder) {
                let _ = handle.send(FolderCommand::Shutdown).await;
                handle.join().await;
            }
        }
        self.pool.shutdown();
        info!("all folder stores closed");
    }
}
