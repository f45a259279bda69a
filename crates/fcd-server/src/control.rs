//! HTTP + websocket control surface
//!
//! # Overview
//! The local management API the CLI and TUI use: folder add / remove /
//! reindex, diagnostics, shutdown, and a websocket that pushes a full
//! FMDM snapshot on every change plus a 1 Hz heartbeat while indexing is
//! active. Bound to loopback; it is a management surface, not a public
//! API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::diagnostics::{DiagnosticsReport, FolderDiagnostics, directory_size};
use crate::orchestrator::Orchestrator;

/// Shared state behind every control route
pub struct ControlState {
    /// The folder-set owner
    pub orchestrator: Arc<Orchestrator>,
    /// Daemon-wide shutdown trigger
    pub shutdown: CancellationToken,
    /// Model cache root (diagnostics)
    pub model_cache_dir: PathBuf,
    /// Expected schema version in effect (diagnostics)
    pub expected_schema: i32,
}

/// Build the control router
#[must_use]
pub fn router(state: Arc<ControlState>) -> Router {
    Router::new()
        .route("/api/folders/add", post(add_folder))
        .route("/api/folders/remove", post(remove_folder))
        .route("/api/folders/reindex", post(reindex_folder))
        .route("/api/fmdm", get(fmdm_snapshot))
        .route("/api/diagnostics", get(diagnostics))
        .route("/api/shutdown", post(shutdown))
        .route("/ws", any(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AddFolderBody {
    path: String,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FolderBody {
    path: String,
}

#[derive(Debug, Deserialize)]
struct ReindexBody {
    path: String,
    model: Option<String>,
}

fn error_response(e: &fcd_domain::Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match e {
        fcd_domain::Error::InvalidArgument { .. } | fcd_domain::Error::NotFound { .. } => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "ok": false, "error": e.to_string() })))
}

async fn add_folder(
    State(state): State<Arc<ControlState>>,
    Json(body): Json<AddFolderBody>,
) -> impl IntoResponse {
    match state
        .orchestrator
        .add_folder(Path::new(&body.path), body.model)
        .await
    {
        Ok(folder) => (
            StatusCode::OK,
            Json(json!({ "ok": true, "folder": folder.to_string() })),
        ),
        Err(e) => error_response(&e),
    }
}

async fn remove_folder(
    State(state): State<Arc<ControlState>>,
    Json(body): Json<FolderBody>,
) -> impl IntoResponse {
    match state.orchestrator.remove_folder(Path::new(&body.path)).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "ok": true }))),
        Err(e) => error_response(&e),
    }
}

async fn reindex_folder(
    State(state): State<Arc<ControlState>>,
    Json(body): Json<ReindexBody>,
) -> impl IntoResponse {
    match state
        .orchestrator
        .reindex_folder(Path::new(&body.path), body.model)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({ "ok": true }))),
        Err(e) => error_response(&e),
    }
}

async fn fmdm_snapshot(State(state): State<Arc<ControlState>>) -> impl IntoResponse {
    Json(state.orchestrator.snapshot().as_ref().clone())
}

async fn diagnostics(State(state): State<Arc<ControlState>>) -> impl IntoResponse {
    let hardware = state.orchestrator.probe().profile().await;
    let folders = state
        .orchestrator
        .snapshot()
        .folders
        .iter()
        .map(|view| FolderDiagnostics {
            path: view.path.clone(),
            model: view.model.clone(),
            status: view.status.to_string(),
            error: view.error.clone(),
        })
        .collect();

    Json(DiagnosticsReport {
        version: env!("CARGO_PKG_VERSION").to_owned(),
        pid: std::process::id(),
        hardware,
        active_backends: state.orchestrator.active_backends(),
        folders,
        model_cache_bytes: directory_size(&state.model_cache_dir),
        expected_schema: state.expected_schema,
    })
}

async fn shutdown(State(state): State<Arc<ControlState>>) -> impl IntoResponse {
    state.shutdown.cancel();
    (StatusCode::OK, Json(json!({ "ok": true })))
}

async fn ws_upgrade(
    State(state): State<Arc<ControlState>>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| ws_session(state, socket))
}

/// Push a full snapshot immediately, then forward every broadcast until
/// the client goes away. Subscribers always receive whole snapshots.
async fn ws_session(state: Arc<ControlState>, mut socket: WebSocket) {
    let snapshot = state.orchestrator.snapshot();
    if send_snapshot(&mut socket, &snapshot).await.is_err() {
        return;
    }

    let mut updates = state.orchestrator.subscribe();
    loop {
        tokio::select! {
            () = state.shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
            update = updates.recv() => match update {
                Ok(snapshot) => {
                    if send_snapshot(&mut socket, &snapshot).await.is_err() {
                        return;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "fmdm subscriber lagged; resending current snapshot");
                    let snapshot = state.orchestrator.snapshot();
                    if send_snapshot(&mut socket, &snapshot).await.is_err() {
                        return;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket receive error");
                    return;
                }
            },
        }
    }
}

async fn send_snapshot(
    socket: &mut WebSocket,
    snapshot: &fcd_domain::entities::FmdmSnapshot,
) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(snapshot).unwrap_or_else(|_| "{}".to_owned());
    socket.send(Message::Text(payload.into())).await
}
