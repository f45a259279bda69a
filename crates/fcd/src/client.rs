//! Control-surface client

use std::path::Path;
use std::time::Duration;

use serde_json::{Value, json};

/// Client-side failure classification driving exit codes
#[derive(Debug)]
pub enum ClientError {
    /// Nothing is listening on the control address
    NotRunning,
    /// The daemon rejected the request (bad arguments)
    Rejected(String),
    /// Transport or daemon-internal failure
    Internal(String),
}

/// Minimal HTTP client for the daemon control surface
pub struct ControlClient {
    base: String,
    http: reqwest::Client,
}

impl ControlClient {
    /// Client for a daemon bound at `addr`
    #[must_use]
    pub fn new(addr: &str) -> Self {
        Self {
            base: format!("http://{addr}"),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn post(&self, route: &str, body: Value) -> Result<String, ClientError> {
        let response = self
            .http
            .post(format!("{}{route}", self.base))
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;
        Self::render(response).await
    }

    async fn get(&self, route: &str) -> Result<String, ClientError> {
        let response = self
            .http
            .get(format!("{}{route}", self.base))
            .send()
            .await
            .map_err(classify_transport)?;
        Self::render(response).await
    }

    async fn render(response: reqwest::Response) -> Result<String, ClientError> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Internal(format!("invalid daemon response: {e}")))?;
        if status.is_success() {
            Ok(serde_json::to_string_pretty(&body)
                .unwrap_or_else(|_| body.to_string()))
        } else {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("request failed")
                .to_owned();
            if status.is_client_error() {
                Err(ClientError::Rejected(message))
            } else {
                Err(ClientError::Internal(message))
            }
        }
    }

    /// `POST /api/shutdown`
    pub async fn stop(&self) -> Result<String, ClientError> {
        self.post("/api/shutdown", json!({})).await
    }

    /// `POST /api/folders/add`
    pub async fn add(&self, path: &Path, model: Option<String>) -> Result<String, ClientError> {
        self.post(
            "/api/folders/add",
            json!({ "path": path.display().to_string(), "model": model }),
        )
        .await
    }

    /// `POST /api/folders/remove`
    pub async fn remove(&self, path: &Path) -> Result<String, ClientError> {
        self.post(
            "/api/folders/remove",
            json!({ "path": path.display().to_string() }),
        )
        .await
    }

    /// `POST /api/folders/reindex`
    pub async fn reindex(
        &self,
        path: &Path,
        model: Option<String>,
    ) -> Result<String, ClientError> {
        self.post(
            "/api/folders/reindex",
            json!({ "path": path.display().to_string(), "model": model }),
        )
        .await
    }

    /// `GET /api/diagnostics`
    pub async fn diagnostics(&self) -> Result<String, ClientError> {
        self.get("/api/diagnostics").await
    }

    /// `GET /api/fmdm`
    pub async fn status(&self) -> Result<String, ClientError> {
        self.get("/api/fmdm").await
    }
}

fn classify_transport(e: reqwest::Error) -> ClientError {
    if e.is_connect() {
        ClientError::NotRunning
    } else {
        ClientError::Internal(format!("transport error: {e}"))
    }
}
