//! MCP tool surface
//!
//! Typed tool handlers over the orchestrator: `search_content`,
//! `list_documents`, `get_document_data`, `get_chunks` and
//! `describe_index`. Argument schemas are generated with schemars and
//! advertised through `list_tools`.

mod args;
mod server;

pub use args::{
    DescribeIndexArgs, GetChunksArgs, GetDocumentDataArgs, ListDocumentsArgs, SearchContentArgs,
};
pub use server::McpServer;
