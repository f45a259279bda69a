//! In-memory HNSW projection of the vectors table
//!
//! # Overview
//! `hnsw_rs` graphs cannot remove points, so deletions are tombstoned and
//! the graph is rebuilt once tombstones pass a threshold. Counts and
//! invariants always come from sqlite; this structure only has to return
//! good candidates.

use std::collections::{HashMap, HashSet};

use hnsw_rs::prelude::*;
use tracing::debug;

use fcd_domain::ids::{ChunkKey, DocumentId};

const MAX_NB_CONNECTION: usize = 24;
const EF_CONSTRUCTION: usize = 200;
const MIN_CAPACITY: usize = 4_096;
const TOMBSTONE_FLOOR: usize = 1_024;

fn nb_layers(capacity: usize) -> usize {
    16.min((capacity as f32).ln().trunc() as usize).max(4)
}

/// Tombstoning HNSW wrapper keyed by chunk
pub struct AnnIndex {
    hnsw: Hnsw<'static, f32, DistCosine>,
    keys: Vec<ChunkKey>,
    vectors: Vec<Vec<f32>>,
    by_key: HashMap<ChunkKey, usize>,
    tombstones: HashSet<usize>,
    capacity: usize,
    dims: Option<usize>,
}

impl AnnIndex {
    /// Empty index; dimensionality is fixed by the first insert
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            hnsw: Hnsw::new(
                MAX_NB_CONNECTION,
                capacity,
                nb_layers(capacity),
                EF_CONSTRUCTION,
                DistCosine {},
            ),
            keys: Vec::new(),
            vectors: Vec::new(),
            by_key: HashMap::new(),
            tombstones: HashSet::new(),
            capacity,
            dims: None,
        }
    }

    /// Live (non-tombstoned) point count
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len() - self.tombstones.len()
    }

    /// Whether no live points exist
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensionality of stored vectors, `None` while empty
    #[must_use]
    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    /// Insert a vector for `key`, replacing any previous vector for it
    pub fn insert(&mut self, key: ChunkKey, vector: Vec<f32>) {
        if let Some(&old_id) = self.by_key.get(&key) {
            self.tombstones.insert(old_id);
        }
        if self.keys.len() >= self.capacity {
            self.rebuild(self.capacity * 2);
        }

        let id = self.keys.len();
        self.dims.get_or_insert(vector.len());
        self.hnsw.insert((&vector, id));
        self.keys.push(key);
        self.vectors.push(vector);
        self.by_key.insert(key, id);
    }

    /// Tombstone every chunk of a document
    pub fn remove_document(&mut self, document: DocumentId) {
        let doomed: Vec<ChunkKey> = self
            .by_key
            .keys()
            .filter(|k| k.document_id == document)
            .copied()
            .collect();
        for key in doomed {
            if let Some(id) = self.by_key.remove(&key) {
                self.tombstones.insert(id);
            }
        }
        self.maybe_rebuild();
    }

    /// Drop everything (model swap with changed dimensionality)
    pub fn clear(&mut self) {
        *self = Self::with_capacity(self.capacity.max(MIN_CAPACITY));
    }

    /// Approximate top-`k` live neighbours by cosine similarity
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(ChunkKey, f32)> {
        if self.is_empty() || k == 0 {
            return Vec::new();
        }
        // Oversample so tombstoned points cannot crowd out live ones
        let request = (k + self.tombstones.len()).min(self.keys.len());
        let ef_search = (request * 2).max(64);
        let neighbours = self.hnsw.search(query, request, ef_search);

        let mut out = Vec::with_capacity(k);
        for neighbour in neighbours {
            let id = neighbour.d_id;
            if self.tombstones.contains(&id) {
                continue;
            }
            // A replaced key maps to its newest id only
            let key = self.keys[id];
            if self.by_key.get(&key) != Some(&id) {
                continue;
            }
            out.push((key, 1.0 - neighbour.distance));
            if out.len() == k {
                break;
            }
        }
        out
    }

    fn maybe_rebuild(&mut self) {
        let threshold = TOMBSTONE_FLOOR.max(self.len() / 5);
        if self.tombstones.len() > threshold {
            self.rebuild(self.capacity);
        }
    }

    fn rebuild(&mut self, capacity: usize) {
        debug!(
            live = self.len(),
            tombstones = self.tombstones.len(),
            capacity,
            "rebuilding ann graph"
        );
        let mut fresh = Self::with_capacity(capacity.max(MIN_CAPACITY).max(self.len() * 2));
        let mut survivors: Vec<(ChunkKey, usize)> = self
            .by_key
            .iter()
            .map(|(k, id)| (*k, *id))
            .collect();
        // Keep ascending key order so ordinals stay contiguous per document
        survivors.sort_by_key(|(k, _)| *k);
        for (key, id) in survivors {
            fresh.insert(key, std::mem::take(&mut self.vectors[id]));
        }
        *self = fresh;
    }
}

impl Default for AnnIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(components: &[f32]) -> Vec<f32> {
        let norm = components.iter().map(|c| c * c).sum::<f32>().sqrt();
        components.iter().map(|c| c / norm).collect()
    }

    fn key(doc: i64, idx: u32) -> ChunkKey {
        ChunkKey::new(DocumentId(doc), idx)
    }

    #[test]
    fn nearest_neighbour_wins() {
        let mut index = AnnIndex::new();
        index.insert(key(1, 0), unit(&[1.0, 0.0, 0.0]));
        index.insert(key(1, 1), unit(&[0.0, 1.0, 0.0]));
        index.insert(key(2, 0), unit(&[0.0, 0.0, 1.0]));

        let hits = index.search(&unit(&[0.9, 0.1, 0.0]), 2);
        assert_eq!(hits.first().map(|(k, _)| *k), Some(key(1, 0)));
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn removed_document_stops_matching() {
        let mut index = AnnIndex::new();
        index.insert(key(1, 0), unit(&[1.0, 0.0]));
        index.insert(key(2, 0), unit(&[0.8, 0.2]));
        index.remove_document(DocumentId(1));

        let hits = index.search(&unit(&[1.0, 0.0]), 2);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, key(2, 0));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn reinsert_replaces_previous_vector() {
        let mut index = AnnIndex::new();
        index.insert(key(1, 0), unit(&[1.0, 0.0]));
        index.insert(key(1, 0), unit(&[0.0, 1.0]));
        assert_eq!(index.len(), 1);

        let hits = index.search(&unit(&[0.0, 1.0]), 1);
        assert_eq!(hits[0].0, key(1, 0));
        assert!(hits[0].1 > 0.99);
    }

    #[test]
    fn search_empty_index_is_empty() {
        let index = AnnIndex::new();
        assert!(index.search(&[1.0, 0.0], 5).is_empty());
    }
}
