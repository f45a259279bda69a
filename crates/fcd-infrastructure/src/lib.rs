//! # Infrastructure Layer
//!
//! Process-level concerns for the Folder Context Daemon: configuration
//! loading and validation, logging initialization, hardware capability
//! probing, execution-backend selection and schema-version sidecar
//! resolution.

/// Configuration types and the figment-based loader
pub mod config;
/// Logging initialization (tracing subscriber + optional file appender)
pub mod logging;
/// Hardware capability probe
pub mod probe;
/// Execution-provider selection
pub mod selector;
/// Schema-version sidecar resolution
pub mod sidecar;

pub use config::FcdConfig;
pub use probe::SysinfoProbe;
pub use selector::PlatformBackendSelector;
