//! Error handling types

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Folder Context Daemon
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (simple form)
    #[error("I/O error: {source}")]
    IoSimple {
        /// The underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// I/O operation error (with context)
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// JSON parsing or serialization error
    #[error("JSON parsing error: {source}")]
    Json {
        /// The underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// Configuration-related error
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration for '{key}': {message}")]
    ConfigInvalid {
        /// The configuration key that is invalid
        key: String,
        /// Reason why it is invalid
        message: String,
    },

    /// Database-related error
    #[error("Database error: {message}")]
    Database {
        /// Description of the database error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Store accessed before open (or after close). Retryable: distinct from
    /// an authoritative zero-row answer.
    #[error("Store not open for folder '{folder}'")]
    StoreNotOpen {
        /// Folder whose store was addressed
        folder: String,
    },

    /// A second opener hit the exclusive store lock
    #[error("Store already open: {path}")]
    AlreadyOpen {
        /// Path of the locked database
        path: String,
    },

    /// Structural corruption of a store file. Recovery renames the file and
    /// rebuilds; contrast with [`Error::Environment`].
    #[error("Store corruption: {message}")]
    Corruption {
        /// What the integrity check reported
        message: String,
    },

    /// Environment failure (runtime libraries, drivers, ABI) while opening a
    /// store or loading a model. Never destroys data.
    #[error("Environment error: {message}")]
    Environment {
        /// Description naming the failing runtime component
        message: String,
    },

    /// Stored schema version is newer than this binary understands
    #[error("Schema version {stored} is newer than supported {expected}; upgrade the fcd binary")]
    SchemaMismatch {
        /// Version found in the store
        stored: i32,
        /// Version this binary expects
        expected: i32,
    },

    /// Embedding provider operation error
    #[error("Embedding provider error: {message}")]
    Embedding {
        /// Description of the embedding error
        message: String,
    },

    /// Model download failed; retryable with backoff
    #[error("Model download failed: {message}")]
    ModelDownload {
        /// Description of the download failure
        message: String,
    },

    /// Every execution backend failed to produce an inference session
    #[error("All execution backends failed for model '{model}'")]
    AllBackendsFailed {
        /// Model the session was requested for
        model: String,
    },

    /// Per-batch inference failure; caller may retry once
    #[error("Inference failed: {message}")]
    Inference {
        /// Description of the inference failure
        message: String,
    },

    /// Text extraction failure for a single file
    #[error("Extraction error: {message}")]
    Extraction {
        /// Description of the extraction failure
        message: String,
    },

    /// Resource not found error
    #[error("Not found: {resource}")]
    NotFound {
        /// The resource that was not found
        resource: String,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument
        message: String,
    },

    /// Operation was cancelled (folder removal, daemon shutdown)
    #[error("Cancelled: {operation}")]
    Cancelled {
        /// The operation that was cancelled
        operation: String,
    },

    /// Operation exceeded its deadline
    #[error("Timed out: {operation}")]
    Timeout {
        /// The operation that timed out
        operation: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },
}

// Basic error creation methods
impl Error {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// I/O and database error creation methods
impl Error {
    /// Create an I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// Create an I/O error with source
    pub fn io_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a database error
    pub fn database<S: Into<String>>(message: S) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Create a database error with source
    pub fn database_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Pipeline error creation methods
impl Error {
    /// Create an embedding provider error
    pub fn embedding<S: Into<String>>(message: S) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a model download error
    pub fn model_download<S: Into<String>>(message: S) -> Self {
        Self::ModelDownload {
            message: message.into(),
        }
    }

    /// Create an inference error
    pub fn inference<S: Into<String>>(message: S) -> Self {
        Self::Inference {
            message: message.into(),
        }
    }

    /// Create an extraction error
    pub fn extraction<S: Into<String>>(message: S) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(operation: S) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }
}

impl Error {
    /// Whether retrying the operation with backoff is a sensible policy.
    ///
    /// Transient I/O, model downloads and a not-yet-open store are
    /// retryable; corruption, schema mismatches and invalid arguments
    /// are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::IoSimple { .. }
                | Self::Io { .. }
                | Self::ModelDownload { .. }
                | Self::StoreNotOpen { .. }
                | Self::Timeout { .. }
        )
    }
}

// Note: OS-specific and external crate error conversions are excluded for
// domain purity. The provider layer is responsible for these conversions.
