//! sqlite + HNSW hybrid store
//!
//! # Overview
//! One sqlite database per folder under `.fcd/` holds files, documents,
//! chunks and vectors with transactional semantics; an in-memory HNSW
//! graph projected from the vectors table serves ANN search. The graph is
//! rebuilt from sqlite at open, so it never carries durable state of its
//! own; one file to lock, one file to police for corruption.

mod ann;
mod schema;
mod sqlite;

pub use ann::AnnIndex;
pub use schema::{LATEST_VERSION, MIGRATIONS};
pub use sqlite::{SqliteFolderStore, SqliteStoreFactory};
