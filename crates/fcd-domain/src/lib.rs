//! # Domain Layer
//!
//! Core types for the Folder Context Daemon: the entities persisted in
//! per-folder stores, the port traits the outer layers implement, and the
//! domain error type every fallible operation returns.
//!
//! ## Architecture
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`entities`] | Folder, file, document and chunk records plus the FMDM snapshot |
//! | [`ids`] | Identifier value objects, compared by value |
//! | [`ports`] | Port interfaces implemented by providers and infrastructure |
//! | [`registry`] | Curated embedding-model catalog |
//! | [`constants`] | Domain constants |
//! | [`error`] | Domain error types |
//!
//! The domain crate performs no I/O. Everything async here is a trait
//! definition; implementations live in `fcd-providers` and
//! `fcd-infrastructure`.

/// Domain-level constants
pub mod constants;
/// Core business entities
pub mod entities;
/// Domain error types
pub mod error;
/// Identifier value objects
pub mod ids;
/// Port interfaces for providers and infrastructure
pub mod ports;
/// Curated embedding-model catalog
pub mod registry;

pub use error::{Error, Result};
