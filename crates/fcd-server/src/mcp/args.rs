//! Tool argument types

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Arguments for `search_content`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchContentArgs {
    /// Natural-language query
    pub query: String,
    /// Folder to search; all folders when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    /// ANN candidate count override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    /// Restrict results to one document (relative path)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    /// Restrict results to files with this extension (no dot)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Require these phrases among a chunk's key phrases
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phrases: Vec<String>,
}

/// Arguments for `list_documents`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListDocumentsArgs {
    /// Folder to list
    pub folder: String,
    /// Path substring filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Cursor from a previous page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    /// Page size (clamped server-side)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Arguments for `get_document_data`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetDocumentDataArgs {
    /// Folder the document lives in
    pub folder: String,
    /// Document path relative to the folder root
    pub path: String,
    /// Include the extracted text (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_text: Option<bool>,
    /// First page to include, 1-based
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_page: Option<u32>,
    /// Last page to include, 1-based inclusive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_page: Option<u32>,
    /// Byte cap for returned text (default 64 KiB)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<usize>,
}

/// Arguments for `get_chunks`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetChunksArgs {
    /// Folder the document lives in
    pub folder: String,
    /// Document path relative to the folder root
    pub document: String,
    /// First chunk ordinal, inclusive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<u32>,
    /// Last chunk ordinal, inclusive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<u32>,
}

/// Arguments for `describe_index`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DescribeIndexArgs {
    /// Folder to describe
    pub folder: String,
}
