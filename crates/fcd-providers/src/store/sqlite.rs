//! sqlite folder store
//!
//! # Overview
//! `SqliteStoreFactory` opens (creating, migrating, integrity-checking and
//! exclusively locking) the per-folder database; `SqliteFolderStore`
//! implements the [`FolderStore`] port over it. Every per-file mutation is
//! one transaction; mutations for different files are never combined, so
//! a crash can only lose the file in flight, never observed state.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Column, Row};
use tracing::{debug, info, warn};

use fcd_domain::Error;
use fcd_domain::constants::store::{DB_FILE, FOLDER_DATA_DIR, LOCK_FILE, STATE_FILE};
use fcd_domain::entities::{
    ChunkRecord, DocumentRecord, DocumentSummary, FileRecord, FileState, Fingerprint,
    SemanticMetadata,
};
use fcd_domain::error::Result;
use fcd_domain::ids::{ChunkKey, DocumentId, FolderId, ScanGeneration};
use fcd_domain::ports::{AnnHit, DocumentPage, FolderStore, ProcessedFile, StoreFactory};

use super::ann::AnnIndex;
use super::schema::{LATEST_VERSION, MIGRATIONS};

/// Small JSON sidecar next to the database: schema version and scan
/// generation, readable without opening sqlite
#[derive(Debug, Serialize, Deserialize)]
struct FolderStateFile {
    schema_version: i32,
    scan_generation: u64,
    model_id: Option<String>,
}

fn db_err(context: &str, e: sqlx::Error) -> Error {
    Error::database_with_source(format!("{context}: {e}"), e)
}

fn is_corruption_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["not a database", "malformed", "database disk image", "corrupt"]
        .iter()
        .any(|marker| lower.contains(marker))
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn parse_ts(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChunkRecord> {
    let key_phrases: Vec<String> =
        serde_json::from_str(&row.try_get::<String, _>("key_phrases").map_err(|e| db_err("chunk row", e))?)?;
    let topics: Vec<String> = if row.columns().iter().any(|c| c.name() == "topics") {
        serde_json::from_str(&row.try_get::<String, _>("topics").map_err(|e| db_err("chunk row", e))?)?
    } else {
        Vec::new()
    };
    Ok(ChunkRecord {
        key: ChunkKey::new(
            DocumentId(row.try_get("document_id").map_err(|e| db_err("chunk row", e))?),
            row.try_get::<i64, _>("chunk_index").map_err(|e| db_err("chunk row", e))? as u32,
        ),
        start_offset: row.try_get::<i64, _>("start_offset").map_err(|e| db_err("chunk row", e))?
            as usize,
        end_offset: row.try_get::<i64, _>("end_offset").map_err(|e| db_err("chunk row", e))?
            as usize,
        token_estimate: row
            .try_get::<i64, _>("token_estimate")
            .map_err(|e| db_err("chunk row", e))? as u32,
        text: row.try_get("text").map_err(|e| db_err("chunk row", e))?,
        semantic: SemanticMetadata {
            key_phrases,
            topics,
            readability: row
                .try_get::<f64, _>("readability")
                .unwrap_or(0.0) as f32,
        },
    })
}

fn file_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FileRecord> {
    let state_raw: String = row.try_get("state").map_err(|e| db_err("file row", e))?;
    let state = FileState::parse(&state_raw)
        .ok_or_else(|| Error::internal(format!("unknown file state '{state_raw}'")))?;
    Ok(FileRecord {
        rel_path: row.try_get("rel_path").map_err(|e| db_err("file row", e))?,
        fingerprint: Fingerprint(row.try_get("fingerprint").map_err(|e| db_err("file row", e))?),
        size: row.try_get::<i64, _>("size").map_err(|e| db_err("file row", e))? as u64,
        discovered_at: parse_ts(Some(
            row.try_get::<String, _>("discovered_at")
                .map_err(|e| db_err("file row", e))?,
        ))
        .unwrap_or_else(Utc::now),
        last_processed_at: parse_ts(
            row.try_get::<Option<String>, _>("last_processed_at")
                .map_err(|e| db_err("file row", e))?,
        ),
        state,
        failure: row.try_get("failure").map_err(|e| db_err("file row", e))?,
    })
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DocumentRecord> {
    let pages = row
        .try_get::<String, _>("pages")
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();
    Ok(DocumentRecord {
        id: DocumentId(row.try_get("id").map_err(|e| db_err("document row", e))?),
        rel_path: row.try_get("rel_path").map_err(|e| db_err("document row", e))?,
        text_len: row.try_get::<i64, _>("text_len").map_err(|e| db_err("document row", e))? as u64,
        page_count: row
            .try_get::<Option<i64>, _>("page_count")
            .map_err(|e| db_err("document row", e))?
            .map(|v| v as u32),
        pages,
        language_hint: row.try_get("language_hint").unwrap_or(None),
        extracted_at: parse_ts(Some(
            row.try_get::<String, _>("extracted_at")
                .map_err(|e| db_err("document row", e))?,
        ))
        .unwrap_or_else(Utc::now),
    })
}

/// The per-folder store handle
pub struct SqliteFolderStore {
    folder: FolderId,
    pool: SqlitePool,
    ann: RwLock<AnnIndex>,
    schema_version: i32,
    open: AtomicBool,
    state_path: PathBuf,
    // Held for the lifetime of the handle; dropping releases the OS lock
    _lock: std::fs::File,
}

impl std::fmt::Debug for SqliteFolderStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteFolderStore")
            .field("folder", &self.folder)
            .field("schema_version", &self.schema_version)
            .field("open", &self.open.load(std::sync::atomic::Ordering::Relaxed))
            .field("state_path", &self.state_path)
            .finish_non_exhaustive()
    }
}

impl SqliteFolderStore {
    fn guard(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::StoreNotOpen {
                folder: self.folder.to_string(),
            })
        }
    }

    async fn meta_get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM folder_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("meta get", e))?;
        row.map(|r| r.try_get::<String, _>("value").map_err(|e| db_err("meta get", e)))
            .transpose()
    }

    async fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO folder_meta (key, value) VALUES (?, ?)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("meta set", e))?;
        Ok(())
    }

    async fn write_state_file(&self) -> Result<()> {
        let state = FolderStateFile {
            schema_version: self.schema_version,
            scan_generation: self.scan_generation().await?.0,
            model_id: self.model_id().await?,
        };
        let json = serde_json::to_string_pretty(&state)?;
        tokio::fs::write(&self.state_path, json)
            .await
            .map_err(|e| {
                Error::io_with_source(format!("write {}", self.state_path.display()), e)
            })?;
        Ok(())
    }

    async fn document_id_for_path(&self, rel_path: &str) -> Result<Option<DocumentId>> {
        let row = sqlx::query("SELECT id FROM documents WHERE rel_path = ?")
            .bind(rel_path)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("document id lookup", e))?;
        Ok(row.map(|r| DocumentId(r.get("id"))))
    }

    fn validate_outcome(&self, outcome: &ProcessedFile) -> Result<()> {
        if outcome.chunks.len() != outcome.vectors.len() {
            return Err(Error::invalid_argument(format!(
                "{}: {} chunks but {} vectors",
                outcome.rel_path,
                outcome.chunks.len(),
                outcome.vectors.len()
            )));
        }
        for (draft, semantic) in &outcome.chunks {
            if !semantic.is_storable() {
                return Err(Error::invalid_argument(format!(
                    "{} chunk {}: empty or oversized key-phrase list rejected",
                    outcome.rel_path, draft.chunk_index
                )));
            }
        }
        let dims: Option<usize> = outcome.vectors.first().map(Vec::len);
        if let Some(dims) = dims {
            if outcome.vectors.iter().any(|v| v.len() != dims) {
                return Err(Error::invalid_argument(format!(
                    "{}: vectors with mixed dimensionality",
                    outcome.rel_path
                )));
            }
            if let Ok(ann) = self.ann.read()
                && let Some(existing) = ann.dims()
                && existing != dims
            {
                return Err(Error::invalid_argument(format!(
                    "{}: vector dims {dims} differ from folder dims {existing}",
                    outcome.rel_path
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FolderStore for SqliteFolderStore {
    fn schema_version(&self) -> i32 {
        self.schema_version
    }

    async fn model_id(&self) -> Result<Option<String>> {
        self.guard()?;
        self.meta_get("model_id").await
    }

    async fn set_model_id(&self, model_id: &str) -> Result<()> {
        self.guard()?;
        let previous = self.meta_get("model_id").await?;
        self.meta_set("model_id", model_id).await?;
        if previous.as_deref().is_some_and(|p| p != model_id) {
            // Model swap: the graph may change dimensionality; old-model
            // vectors are replaced file by file as reprocessing runs
            if let Ok(mut ann) = self.ann.write() {
                ann.clear();
            }
            info!(folder = %self.folder, from = ?previous, to = %model_id, "model changed; ann graph reset");
        }
        self.write_state_file().await
    }

    async fn scan_generation(&self) -> Result<ScanGeneration> {
        self.guard()?;
        let raw = self.meta_get("scan_generation").await?;
        Ok(ScanGeneration(
            raw.and_then(|v| v.parse().ok()).unwrap_or(0),
        ))
    }

    async fn bump_scan_generation(&self) -> Result<ScanGeneration> {
        self.guard()?;
        let next = self.scan_generation().await?.next();
        self.meta_set("scan_generation", &next.0.to_string()).await?;
        self.write_state_file().await?;
        Ok(next)
    }

    async fn set_last_full_scan(&self, at: DateTime<Utc>) -> Result<()> {
        self.guard()?;
        self.meta_set("last_full_scan", &at.to_rfc3339()).await
    }

    async fn last_full_scan(&self) -> Result<Option<DateTime<Utc>>> {
        self.guard()?;
        Ok(parse_ts(self.meta_get("last_full_scan").await?))
    }

    async fn reset_processing(&self) -> Result<u64> {
        self.guard()?;
        let result = sqlx::query("UPDATE files SET state = 'pending' WHERE state = 'processing'")
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("reset processing", e))?;
        let reset = result.rows_affected();
        if reset > 0 {
            warn!(folder = %self.folder, reset, "files left in processing by a previous run; requeued");
        }
        Ok(reset)
    }

    async fn file_records(&self) -> Result<Vec<FileRecord>> {
        self.guard()?;
        let rows = sqlx::query("SELECT * FROM files ORDER BY rel_path")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err("file records", e))?;
        rows.iter().map(file_from_row).collect()
    }

    async fn pending_files(&self) -> Result<Vec<FileRecord>> {
        self.guard()?;
        let rows =
            sqlx::query("SELECT * FROM files WHERE state = 'pending' ORDER BY discovered_at, rel_path")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_err("pending files", e))?;
        rows.iter().map(file_from_row).collect()
    }

    async fn upsert_file(&self, record: &FileRecord) -> Result<()> {
        self.guard()?;
        sqlx::query(
            "INSERT INTO files (rel_path, fingerprint, size, discovered_at, last_processed_at, state, failure)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (rel_path) DO UPDATE SET
                 fingerprint = excluded.fingerprint,
                 size = excluded.size,
                 last_processed_at = excluded.last_processed_at,
                 state = excluded.state,
                 failure = excluded.failure",
        )
        .bind(&record.rel_path)
        .bind(record.fingerprint.as_str())
        .bind(record.size as i64)
        .bind(record.discovered_at.to_rfc3339())
        .bind(record.last_processed_at.map(|t| t.to_rfc3339()))
        .bind(record.state.as_str())
        .bind(&record.failure)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("upsert file", e))?;
        Ok(())
    }

    async fn mark_processing(&self, rel_path: &str) -> Result<()> {
        self.guard()?;
        sqlx::query("UPDATE files SET state = 'processing' WHERE rel_path = ?")
            .bind(rel_path)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("mark processing", e))?;
        Ok(())
    }

    async fn mark_failed(&self, rel_path: &str, reason: &str) -> Result<()> {
        self.guard()?;
        sqlx::query(
            "UPDATE files SET state = 'failed', failure = ?, last_processed_at = ? WHERE rel_path = ?",
        )
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .bind(rel_path)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("mark failed", e))?;
        Ok(())
    }

    async fn mark_skipped(&self, rel_path: &str, reason: &str) -> Result<()> {
        self.guard()?;
        sqlx::query(
            "UPDATE files SET state = 'skipped', failure = ?, last_processed_at = ? WHERE rel_path = ?",
        )
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .bind(rel_path)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("mark skipped", e))?;
        Ok(())
    }

    async fn rename_file(&self, old_rel: &str, new_rel: &str) -> Result<()> {
        self.guard()?;
        // documents.rel_path follows via ON UPDATE CASCADE
        sqlx::query("UPDATE files SET rel_path = ? WHERE rel_path = ?")
            .bind(new_rel)
            .bind(old_rel)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("rename file", e))?;
        Ok(())
    }

    async fn remove_file(&self, rel_path: &str) -> Result<()> {
        self.guard()?;
        let document = self.document_id_for_path(rel_path).await?;
        sqlx::query("DELETE FROM files WHERE rel_path = ?")
            .bind(rel_path)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("remove file", e))?;
        if let Some(document) = document
            && let Ok(mut ann) = self.ann.write()
        {
            ann.remove_document(document);
        }
        Ok(())
    }

    async fn write_processed(&self, outcome: &ProcessedFile) -> Result<DocumentId> {
        self.guard()?;
        self.validate_outcome(outcome)?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(|e| db_err("begin", e))?;

        let previous = sqlx::query("SELECT id FROM documents WHERE rel_path = ?")
            .bind(&outcome.rel_path)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_err("document lookup", e))?
            .map(|r| DocumentId(r.get("id")));

        let page_count = if outcome.pages.is_empty() {
            None
        } else {
            Some(outcome.pages.len() as i64)
        };

        let pages_json = serde_json::to_string(&outcome.pages)?;
        let document_id = match previous {
            Some(id) => {
                sqlx::query(
                    "UPDATE documents SET text = ?, text_len = ?, page_count = ?, pages = ?, language_hint = ?, extracted_at = ? WHERE id = ?",
                )
                .bind(&outcome.text)
                .bind(outcome.text.len() as i64)
                .bind(page_count)
                .bind(&pages_json)
                .bind(&outcome.language_hint)
                .bind(&now)
                .bind(id.0)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_err("update document", e))?;
                // Replace chunks wholesale; vectors cascade
                sqlx::query("DELETE FROM chunks WHERE document_id = ?")
                    .bind(id.0)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_err("delete chunks", e))?;
                id
            }
            None => {
                let row = sqlx::query(
                    "INSERT INTO documents (rel_path, text, text_len, page_count, pages, language_hint, extracted_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
                )
                .bind(&outcome.rel_path)
                .bind(&outcome.text)
                .bind(outcome.text.len() as i64)
                .bind(page_count)
                .bind(&pages_json)
                .bind(&outcome.language_hint)
                .bind(&now)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| db_err("insert document", e))?;
                DocumentId(row.get("id"))
            }
        };

        for ((draft, semantic), vector) in outcome.chunks.iter().zip(&outcome.vectors) {
            sqlx::query(
                "INSERT INTO chunks (document_id, chunk_index, start_offset, end_offset, token_estimate, text, key_phrases, topics, readability)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(document_id.0)
            .bind(i64::from(draft.chunk_index))
            .bind(draft.start_offset as i64)
            .bind(draft.end_offset as i64)
            .bind(i64::from(draft.token_estimate))
            .bind(&draft.text)
            .bind(serde_json::to_string(&semantic.key_phrases)?)
            .bind(serde_json::to_string(&semantic.topics)?)
            .bind(f64::from(semantic.readability))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("insert chunk", e))?;

            sqlx::query(
                "INSERT INTO vectors (document_id, chunk_index, model_id, schema_version, dims, data)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(document_id.0)
            .bind(i64::from(draft.chunk_index))
            .bind(&outcome.model_id)
            .bind(self.schema_version)
            .bind(vector.len() as i64)
            .bind(encode_vector(vector))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("insert vector", e))?;
        }

        sqlx::query(
            "UPDATE files SET state = 'done', failure = NULL, fingerprint = ?, size = ?, last_processed_at = ? WHERE rel_path = ?",
        )
        .bind(outcome.fingerprint.as_str())
        .bind(outcome.size as i64)
        .bind(&now)
        .bind(&outcome.rel_path)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("finish file", e))?;

        tx.commit().await.map_err(|e| db_err("commit", e))?;

        // Post-commit graph update. A crash here is safe: the graph is a
        // projection rebuilt from sqlite at the next open.
        if let Ok(mut ann) = self.ann.write() {
            ann.remove_document(document_id);
            for ((draft, _), vector) in outcome.chunks.iter().zip(&outcome.vectors) {
                ann.insert(
                    ChunkKey::new(document_id, draft.chunk_index),
                    vector.clone(),
                );
            }
        }

        debug!(
            folder = %self.folder,
            file = %outcome.rel_path,
            chunks = outcome.chunks.len(),
            "file committed"
        );
        Ok(document_id)
    }

    async fn embedding_count(&self) -> Result<u64> {
        // The count targets the chunks table: vectors land in the same
        // transaction, so the counts agree, and the answer does not
        // depend on vector-table build order. Zero here is authoritative
        // because guard() already separated "store not open".
        self.guard()?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_err("embedding count", e))?;
        Ok(count as u64)
    }

    async fn document_count(&self) -> Result<u64> {
        self.guard()?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_err("document count", e))?;
        Ok(count as u64)
    }

    async fn vector_dims(&self) -> Result<Option<usize>> {
        self.guard()?;
        if let Ok(ann) = self.ann.read()
            && let Some(dims) = ann.dims()
        {
            return Ok(Some(dims));
        }
        let row: Option<i64> = sqlx::query_scalar("SELECT dims FROM vectors LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("vector dims", e))?;
        Ok(row.map(|d| d as usize))
    }

    async fn ann_search(&self, query: &[f32], k: usize) -> Result<Vec<AnnHit>> {
        self.guard()?;
        let hits = self
            .ann
            .read()
            .map_err(|_| Error::internal("ann lock poisoned"))?
            .search(query, k);
        Ok(hits
            .into_iter()
            .map(|(key, score)| AnnHit { key, score })
            .collect())
    }

    async fn chunk(&self, key: ChunkKey) -> Result<ChunkRecord> {
        self.guard()?;
        let row = sqlx::query("SELECT * FROM chunks WHERE document_id = ? AND chunk_index = ?")
            .bind(key.document_id.0)
            .bind(i64::from(key.chunk_index))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("chunk", e))?
            .ok_or_else(|| Error::not_found(format!("chunk {key}")))?;
        chunk_from_row(&row)
    }

    async fn chunks_for_document(
        &self,
        document: DocumentId,
        range: Option<(u32, u32)>,
    ) -> Result<Vec<ChunkRecord>> {
        self.guard()?;
        let rows = match range {
            Some((from, to)) => {
                sqlx::query(
                    "SELECT * FROM chunks WHERE document_id = ? AND chunk_index BETWEEN ? AND ? ORDER BY chunk_index",
                )
                .bind(document.0)
                .bind(i64::from(from))
                .bind(i64::from(to))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM chunks WHERE document_id = ? ORDER BY chunk_index")
                    .bind(document.0)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| db_err("chunks for document", e))?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn neighbor_chunks(&self, key: ChunkKey, window: usize) -> Result<Vec<ChunkRecord>> {
        self.guard()?;
        let low = i64::from(key.chunk_index).saturating_sub(window as i64);
        let high = i64::from(key.chunk_index) + window as i64;
        let rows = sqlx::query(
            "SELECT * FROM chunks WHERE document_id = ? AND chunk_index BETWEEN ? AND ? AND chunk_index != ? ORDER BY chunk_index",
        )
        .bind(key.document_id.0)
        .bind(low)
        .bind(high)
        .bind(i64::from(key.chunk_index))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("neighbor chunks", e))?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn document(&self, id: DocumentId) -> Result<DocumentRecord> {
        self.guard()?;
        let row = sqlx::query(
            "SELECT id, rel_path, text_len, page_count, pages, language_hint, extracted_at FROM documents WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("document", e))?
        .ok_or_else(|| Error::not_found(format!("document {id}")))?;
        document_from_row(&row)
    }

    async fn document_by_path(&self, rel_path: &str) -> Result<DocumentRecord> {
        self.guard()?;
        let row = sqlx::query(
            "SELECT id, rel_path, text_len, page_count, pages, language_hint, extracted_at FROM documents WHERE rel_path = ?",
        )
        .bind(rel_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("document by path", e))?
        .ok_or_else(|| Error::not_found(format!("document '{rel_path}'")))?;
        document_from_row(&row)
    }

    async fn document_text(&self, id: DocumentId) -> Result<String> {
        self.guard()?;
        sqlx::query_scalar("SELECT text FROM documents WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("document text", e))?
            .ok_or_else(|| Error::not_found(format!("document {id}")))
    }

    async fn list_documents(
        &self,
        filter: Option<&str>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<DocumentPage> {
        self.guard()?;
        let after: i64 = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let pattern = filter.map(|f| format!("%{f}%"));
        let limit = limit.clamp(1, 500) as i64;

        let rows = sqlx::query(
            "SELECT d.id, d.rel_path, f.size, f.last_processed_at,
                    (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id) AS chunk_count
             FROM documents d
             JOIN files f ON f.rel_path = d.rel_path
             WHERE d.id > ? AND (? IS NULL OR d.rel_path LIKE ?)
             ORDER BY d.id
             LIMIT ?",
        )
        .bind(after)
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("list documents", e))?;

        let mut documents = Vec::with_capacity(rows.len().min(limit as usize));
        for row in rows.iter().take(limit as usize) {
            documents.push(DocumentSummary {
                id: DocumentId(row.try_get("id").map_err(|e| db_err("list documents", e))?),
                rel_path: row
                    .try_get("rel_path")
                    .map_err(|e| db_err("list documents", e))?,
                size: row.try_get::<i64, _>("size").map_err(|e| db_err("list documents", e))?
                    as u64,
                last_indexed_at: parse_ts(
                    row.try_get::<Option<String>, _>("last_processed_at")
                        .map_err(|e| db_err("list documents", e))?,
                ),
                chunk_count: row
                    .try_get::<i64, _>("chunk_count")
                    .map_err(|e| db_err("list documents", e))? as u64,
            });
        }
        let next_cursor = (rows.len() as i64 > limit)
            .then(|| documents.last().map(|d| d.id.0.to_string()))
            .flatten();

        Ok(DocumentPage {
            documents,
            next_cursor,
        })
    }

    async fn substring_scan(
        &self,
        needle: &str,
        doc_limit: usize,
        hit_limit: usize,
    ) -> Result<Vec<ChunkRecord>> {
        self.guard()?;
        // instr() keeps the needle literal; LIKE would interpret % and _
        let rows = sqlx::query(
            "SELECT c.* FROM chunks c
             WHERE c.document_id IN
                 (SELECT id FROM documents ORDER BY extracted_at DESC LIMIT ?)
               AND instr(lower(c.text), lower(?)) > 0
             ORDER BY c.document_id, c.chunk_index
             LIMIT ?",
        )
        .bind(doc_limit as i64)
        .bind(needle)
        .bind(hit_limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("substring scan", e))?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn flush(&self) -> Result<()> {
        self.guard()?;
        self.write_state_file().await
    }

    async fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let _ = self.write_state_file_unguarded().await;
        self.pool.close().await;
        info!(folder = %self.folder, "store closed");
        Ok(())
    }
}

impl SqliteFolderStore {
    async fn write_state_file_unguarded(&self) -> Result<()> {
        let generation = sqlx::query("SELECT value FROM folder_meta WHERE key = 'scan_generation'")
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .and_then(|r| r.try_get::<String, _>("value").ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let model_id = sqlx::query("SELECT value FROM folder_meta WHERE key = 'model_id'")
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .and_then(|r| r.try_get::<String, _>("value").ok());
        let state = FolderStateFile {
            schema_version: self.schema_version,
            scan_generation: generation,
            model_id,
        };
        let json = serde_json::to_string_pretty(&state)?;
        tokio::fs::write(&self.state_path, json)
            .await
            .map_err(|e| Error::io_with_source(format!("write {}", self.state_path.display()), e))?;
        Ok(())
    }
}

/// Opens folder stores with locking, integrity check and migrations
pub struct SqliteStoreFactory;

impl SqliteStoreFactory {
    /// Construct the factory
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Hidden data directory for a folder
    #[must_use]
    pub fn data_dir(folder: &FolderId) -> PathBuf {
        folder.as_path().join(FOLDER_DATA_DIR)
    }

    /// Database path for a folder
    #[must_use]
    pub fn db_path(folder: &FolderId) -> PathBuf {
        Self::data_dir(folder).join(DB_FILE)
    }

    async fn load_ann(pool: &SqlitePool, model_id: Option<&str>) -> Result<AnnIndex> {
        let rows = match model_id {
            Some(model) => {
                sqlx::query("SELECT document_id, chunk_index, data FROM vectors WHERE model_id = ?")
                    .bind(model)
                    .fetch_all(pool)
                    .await
            }
            None => {
                sqlx::query("SELECT document_id, chunk_index, data FROM vectors")
                    .fetch_all(pool)
                    .await
            }
        }
        .map_err(|e| db_err("load vectors", e))?;

        let mut ann = AnnIndex::new();
        for row in rows {
            let key = ChunkKey::new(
                DocumentId(row.try_get("document_id").map_err(|e| db_err("load vectors", e))?),
                row.try_get::<i64, _>("chunk_index").map_err(|e| db_err("load vectors", e))?
                    as u32,
            );
            let blob: Vec<u8> = row.try_get("data").map_err(|e| db_err("load vectors", e))?;
            ann.insert(key, decode_vector(&blob));
        }
        Ok(ann)
    }

    async fn migrate(pool: &SqlitePool, db_path: &Path, expected: i32) -> Result<i32> {
        let stored: i32 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(pool)
            .await
            .map_err(|e| db_err("read user_version", e))?;

        let target = expected.clamp(1, LATEST_VERSION);
        if stored > target {
            return Err(Error::SchemaMismatch {
                stored,
                expected: target,
            });
        }
        for version in stored..target {
            let batch = MIGRATIONS[version as usize];
            sqlx::raw_sql(batch)
                .execute(pool)
                .await
                .map_err(|e| db_err(&format!("migration to v{}", version + 1), e))?;
            sqlx::raw_sql(&format!("PRAGMA user_version = {}", version + 1))
                .execute(pool)
                .await
                .map_err(|e| db_err("set user_version", e))?;
            info!(db = %db_path.display(), version = version + 1, "schema migrated");
        }
        Ok(target)
    }
}

impl Default for SqliteStoreFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreFactory for SqliteStoreFactory {
    async fn open(
        &self,
        folder: &FolderId,
        expected_schema: i32,
    ) -> Result<std::sync::Arc<dyn FolderStore>> {
        let data_dir = Self::data_dir(folder);
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| Error::io_with_source(format!("create {}", data_dir.display()), e))?;

        let lock_path = data_dir.join(LOCK_FILE);
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| Error::io_with_source(format!("open {}", lock_path.display()), e))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(Error::AlreadyOpen {
                path: Self::db_path(folder).display().to_string(),
            });
        }

        let db_path = data_dir.join(DB_FILE);
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                // Damage can already surface here (journal-mode pragma on
                // a mangled file), not only at the integrity check
                let message = e.to_string();
                if is_corruption_message(&message) {
                    Error::Corruption { message }
                } else {
                    db_err(&format!("open {}", db_path.display()), e)
                }
            })?;

        // Integrity verdict decides corruption vs everything else
        let verdict: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&pool)
            .await
            .map_err(|e| {
                let message = e.to_string();
                if is_corruption_message(&message) {
                    Error::Corruption { message }
                } else {
                    db_err("integrity check", e)
                }
            })?;
        if verdict.to_lowercase() != "ok" {
            pool.close().await;
            return Err(Error::Corruption {
                message: format!("integrity check: {verdict}"),
            });
        }

        let schema_version = Self::migrate(&pool, &db_path, expected_schema).await?;

        let model_id: Option<String> =
            sqlx::query_scalar("SELECT value FROM folder_meta WHERE key = 'model_id'")
                .fetch_optional(&pool)
                .await
                .map_err(|e| db_err("read model id", e))?;
        let ann = Self::load_ann(&pool, model_id.as_deref()).await?;
        debug!(folder = %folder, vectors = ann.len(), "ann graph loaded");

        let store = SqliteFolderStore {
            folder: folder.clone(),
            pool,
            ann: RwLock::new(ann),
            schema_version,
            open: AtomicBool::new(true),
            state_path: data_dir.join(STATE_FILE),
            _lock: lock_file,
        };
        store.write_state_file_unguarded().await?;
        Ok(std::sync::Arc::new(store))
    }
}
