//! Schema migrations
//!
//! Forward-only SQL batches; `MIGRATIONS[n]` upgrades a store from
//! version `n` to `n + 1`. The stored version lives in
//! `PRAGMA user_version`. A store whose version is *newer* than
//! [`LATEST_VERSION`] is refused, never downgraded.

use fcd_domain::constants::store::LATEST_SCHEMA_VERSION;

/// Latest version these migrations produce
pub const LATEST_VERSION: i32 = LATEST_SCHEMA_VERSION;

/// Ordered migration batches
pub const MIGRATIONS: &[&str] = &[
    // v0 -> v1: relational core
    r"
    CREATE TABLE folder_meta (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE files (
        rel_path          TEXT PRIMARY KEY,
        fingerprint       TEXT NOT NULL,
        size              INTEGER NOT NULL,
        discovered_at     TEXT NOT NULL,
        last_processed_at TEXT,
        state             TEXT NOT NULL DEFAULT 'pending',
        failure           TEXT
    );
    CREATE TABLE documents (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        rel_path     TEXT NOT NULL UNIQUE,
        text         TEXT NOT NULL,
        text_len     INTEGER NOT NULL,
        page_count   INTEGER,
        extracted_at TEXT NOT NULL,
        FOREIGN KEY (rel_path) REFERENCES files (rel_path)
            ON DELETE CASCADE ON UPDATE CASCADE
    );
    CREATE TABLE chunks (
        document_id    INTEGER NOT NULL,
        chunk_index    INTEGER NOT NULL,
        start_offset   INTEGER NOT NULL,
        end_offset     INTEGER NOT NULL,
        token_estimate INTEGER NOT NULL,
        text           TEXT NOT NULL,
        key_phrases    TEXT NOT NULL,
        PRIMARY KEY (document_id, chunk_index),
        FOREIGN KEY (document_id) REFERENCES documents (id) ON DELETE CASCADE
    );
    ",
    // v1 -> v2: vectors, one per chunk, cascade with it
    r"
    CREATE TABLE vectors (
        document_id    INTEGER NOT NULL,
        chunk_index    INTEGER NOT NULL,
        model_id       TEXT NOT NULL,
        schema_version INTEGER NOT NULL,
        dims           INTEGER NOT NULL,
        data           BLOB NOT NULL,
        PRIMARY KEY (document_id, chunk_index),
        FOREIGN KEY (document_id, chunk_index)
            REFERENCES chunks (document_id, chunk_index) ON DELETE CASCADE
    );
    CREATE INDEX idx_files_state ON files (state);
    ",
    // v2 -> v3: semantic re-rank columns, page offsets, recency index
    r"
    ALTER TABLE documents ADD COLUMN language_hint TEXT;
    ALTER TABLE documents ADD COLUMN pages TEXT NOT NULL DEFAULT '[]';
    ALTER TABLE chunks ADD COLUMN topics TEXT NOT NULL DEFAULT '[]';
    ALTER TABLE chunks ADD COLUMN readability REAL NOT NULL DEFAULT 0.0;
    CREATE INDEX idx_documents_extracted_at ON documents (extracted_at);
    ",
];
