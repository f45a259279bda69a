//! MCP server handler
//!
//! # Overview
//! Implements `rmcp::ServerHandler` over the orchestrator. Every tool
//! resolves its folder through a read lease (the store stays owned by
//! the folder's lifecycle engine) and renders its result as one JSON
//! text content block. Tool failures become MCP errors; search-time
//! embedding failures never do (the engine degrades to its marked
//! fallback instead).

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use rmcp::ErrorData as McpError;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::{RoleServer, ServerHandler, service::RequestContext};
use serde::Serialize;
use tracing::debug;

use fcd_application::search::SearchRequest;
use fcd_domain::registry;

use super::args::{
    DescribeIndexArgs, GetChunksArgs, GetDocumentDataArgs, ListDocumentsArgs, SearchContentArgs,
};
use crate::orchestrator::Orchestrator;

const DEFAULT_TEXT_CAP: usize = 64 * 1024;

/// The MCP-facing server
#[derive(Clone)]
pub struct McpServer {
    orchestrator: Arc<Orchestrator>,
}

#[derive(Serialize)]
struct DocumentDataResult {
    path: String,
    text_len: u64,
    page_count: Option<u32>,
    language_hint: Option<String>,
    extracted_at: String,
    text: Option<String>,
    truncated: bool,
}

#[derive(Serialize)]
struct DescribeIndexResult {
    folder: String,
    status: String,
    error: Option<String>,
    model: String,
    dimensions: Option<usize>,
    documents: u64,
    chunks: u64,
    schema_version: i32,
}

impl McpServer {
    /// Server over the given orchestrator
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    fn parse_args<T: serde::de::DeserializeOwned>(
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<T, McpError> {
        serde_json::from_value(serde_json::Value::Object(arguments.unwrap_or_default()))
            .map_err(|e| McpError::invalid_params(format!("Invalid arguments: {e}"), None))
    }

    fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
        let rendered = serde_json::to_string_pretty(value)
            .map_err(|e| McpError::internal_error(format!("serialization failed: {e}"), None))?;
        Ok(CallToolResult::success(vec![Content::text(rendered)]))
    }

    async fn search_content(&self, args: SearchContentArgs) -> Result<CallToolResult, McpError> {
        let request = SearchRequest {
            query: args.query,
            top_k: args.top_k,
            document: args.document,
            extension: args.extension,
            require_phrases: args.phrases,
        };
        let folder = args.folder.as_deref().map(Path::new);
        let response = self
            .orchestrator
            .search(folder, &request)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        debug!(hits = response.hits.len(), fallback = response.fallback, "search served");
        Self::json_result(&response)
    }

    async fn list_documents(&self, args: ListDocumentsArgs) -> Result<CallToolResult, McpError> {
        let store = self
            .orchestrator
            .read_lease(Path::new(&args.folder))
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        let page = store
            .list_documents(
                args.filter.as_deref(),
                args.cursor.as_deref(),
                args.limit.unwrap_or(50),
            )
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        #[derive(Serialize)]
        struct ListResult {
            documents: Vec<fcd_domain::entities::DocumentSummary>,
            next_cursor: Option<String>,
        }
        Self::json_result(&ListResult {
            documents: page.documents,
            next_cursor: page.next_cursor,
        })
    }

    async fn get_document_data(
        &self,
        args: GetDocumentDataArgs,
    ) -> Result<CallToolResult, McpError> {
        let store = self
            .orchestrator
            .read_lease(Path::new(&args.folder))
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        let document = store
            .document_by_path(&args.path)
            .await
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        let include_text = args.include_text.unwrap_or(true);
        let cap = args.max_bytes.unwrap_or(DEFAULT_TEXT_CAP);
        let (text, truncated) = if include_text {
            let full = store
                .document_text(document.id)
                .await
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
            let sliced = slice_pages(&full, &document.pages, args.from_page, args.to_page);
            let truncated = sliced.len() > cap;
            let mut bounded = sliced;
            if truncated {
                let mut cut = cap;
                while cut > 0 && !bounded.is_char_boundary(cut) {
                    cut -= 1;
                }
                bounded.truncate(cut);
            }
            (Some(bounded), truncated)
        } else {
            (None, false)
        };

        Self::json_result(&DocumentDataResult {
            path: document.rel_path,
            text_len: document.text_len,
            page_count: document.page_count,
            language_hint: document.language_hint,
            extracted_at: document.extracted_at.to_rfc3339(),
            text,
            truncated,
        })
    }

    async fn get_chunks(&self, args: GetChunksArgs) -> Result<CallToolResult, McpError> {
        let store = self
            .orchestrator
            .read_lease(Path::new(&args.folder))
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        let document = store
            .document_by_path(&args.document)
            .await
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        let range = match (args.from, args.to) {
            (None, None) => None,
            (from, to) => Some((from.unwrap_or(0), to.unwrap_or(u32::MAX))),
        };
        let chunks = store
            .chunks_for_document(document.id, range)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Self::json_result(&chunks)
    }

    async fn describe_index(&self, args: DescribeIndexArgs) -> Result<CallToolResult, McpError> {
        let path = Path::new(&args.folder);
        let (status, error, model) = self
            .orchestrator
            .folder_status(path)
            .ok_or_else(|| McpError::invalid_params(format!("unknown folder {}", args.folder), None))?;

        // A folder in Error still answers with its status; counts need the store
        let (documents, chunks, dimensions, schema_version) =
            match self.orchestrator.read_lease(path) {
                Ok(store) => {
                    let documents = store.document_count().await.unwrap_or(0);
                    let chunks = store.embedding_count().await.unwrap_or(0);
                    let dims = store.vector_dims().await.unwrap_or(None);
                    (documents, chunks, dims, store.schema_version())
                }
                Err(_) => (0, 0, None, 0),
            };

        let dimensions = dimensions.or_else(|| registry::get(&model).map(|m| m.dims));
        Self::json_result(&DescribeIndexResult {
            folder: args.folder,
            status: status.to_string(),
            error,
            model,
            dimensions,
            documents,
            chunks,
            schema_version,
        })
    }
}

/// Slice extracted text down to an inclusive page range
fn slice_pages(
    text: &str,
    pages: &[fcd_domain::entities::PageOffset],
    from_page: Option<u32>,
    to_page: Option<u32>,
) -> String {
    if pages.is_empty() || (from_page.is_none() && to_page.is_none()) {
        return text.to_owned();
    }
    let from = from_page.unwrap_or(1);
    let to = to_page.unwrap_or(u32::MAX);
    let start = pages
        .iter()
        .find(|p| p.page >= from)
        .map_or(0, |p| p.offset.min(text.len()));
    let end = pages
        .iter()
        .find(|p| p.page > to)
        .map_or(text.len(), |p| p.offset.min(text.len()));
    text.get(start..end).unwrap_or("").to_owned()
}

fn tool<T: schemars::JsonSchema>(name: &'static str, description: &'static str) -> Tool {
    let schema = serde_json::to_value(schemars::schema_for!(T))
        .ok()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    Tool {
        name: Cow::Borrowed(name),
        title: None,
        description: Some(Cow::Borrowed(description)),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: None,
        execution: None,
        icons: None,
        meta: Default::default(),
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "Folder Context Daemon".to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                ..Default::default()
            },
            instructions: Some(
                "Semantic search over locally indexed folders.\n\n\
                 Tools:\n\
                 - `search_content`: rank chunks by semantic similarity to a natural-language \
                   query; optional folder/document/extension filters and a top_k override. \
                   Responses carry a truncation flag and mark substring fallbacks.\n\
                 - `list_documents`: paginated documents of a folder with size, chunk count \
                   and last-indexed time.\n\
                 - `get_document_data`: extracted text (optionally by page range) plus \
                   document metadata, bounded by a byte cap with an explicit truncated flag.\n\
                 - `get_chunks`: chunks of one document with offsets and semantic metadata.\n\
                 - `describe_index`: model, dimensionality, document/chunk totals, schema \
                   version and lifecycle status of a folder.\n\n\
                 Folders are added and removed through the daemon control surface, not MCP."
                    .to_owned(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _pagination: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: vec![
                tool::<SearchContentArgs>(
                    "search_content",
                    "Semantic search across indexed folders with ranked, filtered chunks",
                ),
                tool::<ListDocumentsArgs>(
                    "list_documents",
                    "List indexed documents of a folder with pagination",
                ),
                tool::<GetDocumentDataArgs>(
                    "get_document_data",
                    "Fetch extracted text and metadata for one document",
                ),
                tool::<GetChunksArgs>(
                    "get_chunks",
                    "Fetch chunks with offsets and semantic metadata for one document",
                ),
                tool::<DescribeIndexArgs>(
                    "describe_index",
                    "Describe a folder's index: model, dimensions, totals, status",
                ),
            ],
            meta: Default::default(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        match request.name.as_ref() {
            "search_content" => {
                self.search_content(Self::parse_args(request.arguments)?).await
            }
            "list_documents" => {
                self.list_documents(Self::parse_args(request.arguments)?).await
            }
            "get_document_data" => {
                self.get_document_data(Self::parse_args(request.arguments)?).await
            }
            "get_chunks" => self.get_chunks(Self::parse_args(request.arguments)?).await,
            "describe_index" => {
                self.describe_index(Self::parse_args(request.arguments)?).await
            }
            _ => Err(McpError::invalid_params(
                format!("Unknown tool: {}", request.name),
                None,
            )),
        }
    }
}
