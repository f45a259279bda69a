//! Daemon assembly
//!
//! # Overview
//! Wires configuration into providers, providers into the engine
//! dependencies, spawns the orchestrator, resumes every configured
//! folder, serves the control surface, and optionally speaks MCP on
//! stdio (the transport an MCP client subprocess uses). Shutdown
//! propagates through one cancellation token; every folder store is
//! closed before the function returns.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fcd_application::lifecycle::EngineDeps;
use fcd_application::pool::{EmbeddingPool, PoolLimits};
use fcd_application::search::{SearchEngine, SearchParams};
use fcd_domain::Error;
use fcd_domain::error::Result;
use fcd_infrastructure::config::FcdConfig;
use fcd_infrastructure::probe::SysinfoProbe;
use fcd_infrastructure::selector::PlatformBackendSelector;
use fcd_infrastructure::sidecar;
use fcd_providers::embed::{DefaultEmbeddingFactory, EmbeddingProviderKind};
use fcd_providers::extract::CompositeExtractor;
use fcd_providers::scan::WalkScanner;
use fcd_providers::store::SqliteStoreFactory;
use fcd_providers::watch::NotifyChangeWatcher;
use fcd_providers::{FrequencySemanticExtractor, ParagraphChunker};

use crate::cleanup::kill_stale_siblings;
use crate::control::{ControlState, router};
use crate::mcp::McpServer;
use crate::orchestrator::Orchestrator;
use crate::registry_file;

/// Run the daemon until a shutdown signal, control-surface shutdown or
/// (in stdio mode) the MCP client disconnecting.
///
/// # Errors
///
/// Configuration and bind failures; everything after startup is handled
/// internally.
pub async fn run_daemon(config: FcdConfig, serve_stdio: bool) -> Result<()> {
    // Stale subprocesses from a previous run can pin old native modules
    // and masquerade as store corruption at open
    let killed = kill_stale_siblings();
    if killed > 0 {
        info!(killed, "stale processes cleaned up before opening stores");
    }

    let expected = sidecar::resolve_expected_schema();
    info!(version = expected.version, source = ?expected.source, "expected schema resolved");

    let probe = Arc::new(SysinfoProbe::new());
    let selector = Arc::new(PlatformBackendSelector::new());
    let extractor = Arc::new(CompositeExtractor::with_defaults());
    let provider_kind = EmbeddingProviderKind::parse(&config.embedding.provider)
        .ok_or_else(|| {
            Error::config(format!(
                "unknown embedding provider '{}'",
                config.embedding.provider
            ))
        })?;

    let deps = Arc::new(EngineDeps {
        store_factory: Arc::new(SqliteStoreFactory::new()),
        scanner: Arc::new(WalkScanner::new(
            Arc::clone(&extractor) as _,
            config.indexing.fingerprint_budget_bytes,
        )),
        watcher: Arc::new(NotifyChangeWatcher::new(Duration::from_millis(
            config.watcher.debounce_ms,
        ))),
        extractor: Arc::clone(&extractor) as _,
        chunker: Arc::new(ParagraphChunker::new(
            config.indexing.chunk_target_tokens,
            config.indexing.chunk_overlap_tokens,
        )),
        semantic: Arc::new(FrequencySemanticExtractor::new()),
        provider_factory: Arc::new(DefaultEmbeddingFactory::new(
            provider_kind,
            config.model_cache_dir(),
            Arc::clone(&probe) as _,
            selector,
        )),
        pool: Arc::new(EmbeddingPool::start(&PoolLimits {
            workers: config.indexing.workers,
            queue_capacity: config.indexing.queue_capacity,
            folder_inflight_fraction: config.indexing.folder_inflight_fraction,
        })),
    });

    let search_engine = SearchEngine::new(SearchParams {
        top_k: config.search.top_k,
        chunk_budget: config.search.result_chunk_budget,
        token_budget: config.search.result_token_budget,
        recency_weight: config.search.recency_weight,
        recency_half_life_days: config.search.recency_half_life_days,
        readability_floor: config.search.readability_floor,
        deadline: Duration::from_millis(config.search.deadline_ms),
    });

    let orchestrator = Orchestrator::new(
        Arc::clone(&deps),
        Arc::clone(&deps.pool),
        Arc::clone(&probe) as _,
        search_engine,
        expected.version,
        config.indexing.max_batch_chunks,
        config.indexing.max_batch_bytes,
        registry_file::default_path(),
    );
    orchestrator.resume_from_registry().await;

    let shutdown = CancellationToken::new();
    let state = Arc::new(ControlState {
        orchestrator: Arc::clone(&orchestrator),
        shutdown: shutdown.clone(),
        model_cache_dir: config.model_cache_dir(),
        expected_schema: expected.version,
    });

    let listener = tokio::net::TcpListener::bind(&config.daemon.bind_addr)
        .await
        .map_err(|e| {
            Error::io_with_source(format!("bind {}", config.daemon.bind_addr), e)
        })?;
    info!(addr = %config.daemon.bind_addr, "control surface listening");

    let app = router(Arc::clone(&state));
    let http_shutdown = shutdown.clone();
    let http_task = tokio::spawn(async move {
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_shutdown.cancelled().await });
        if let Err(e) = serve.await {
            warn!(error = %e, "control surface stopped with error");
        }
    });

    let mcp_task = if serve_stdio {
        let server = McpServer::new(Arc::clone(&orchestrator));
        let mcp_shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            use rmcp::ServiceExt;
            match server.serve(rmcp::transport::stdio()).await {
                Ok(service) => {
                    if let Err(e) = service.waiting().await {
                        warn!(error = %e, "mcp stdio service ended with error");
                    }
                }
                Err(e) => warn!(error = %e, "mcp stdio service failed to start"),
            }
            // Client hung up; the daemon follows
            mcp_shutdown.cancel();
        }))
    } else {
        None
    };

    wait_for_shutdown(&shutdown).await;
    info!("shutdown signal received");

    orchestrator.shutdown().await;
    shutdown.cancel();
    let _ = http_task.await;
    if let Some(task) = mcp_task {
        task.abort();
    }
    info!("daemon stopped");
    Ok(())
}

async fn wait_for_shutdown(token: &CancellationToken) {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // Signal handler unavailable; rely on the control surface
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = token.cancelled() => {}
        () = ctrl_c => {}
        () = terminate => {}
    }
}
