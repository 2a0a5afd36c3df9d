//! Versioned in-memory vector index
//!
//! The index state is one immutable `IndexSnapshot` behind an
//! `Arc`. Readers clone the `Arc` and search without holding any lock;
//! writers build the next snapshot and swap the pointer atomically.
//! `rebuild` is therefore safe to run concurrently with searches: a search
//! sees either the old index or the new one, never a half-built state.

use crate::error::{Error, Result};
use crate::record::MemoryRecord;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One indexed record vector
#[derive(Debug, Clone)]
struct IndexEntry {
    vector: Vec<f32>,
    created_at: DateTime<Utc>,
    /// Excluded entries (tombstoned records) keep their vector data so the
    /// exclusion is reversible until purge
    excluded: bool,
}

/// Immutable point-in-time index state
#[derive(Debug, Default, Clone)]
struct IndexSnapshot {
    entries: HashMap<Uuid, IndexEntry>,
}

/// A single search result: record reference plus raw similarity
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record_id: Uuid,
    pub score: f32,
}

/// Searchable index over all record embeddings
pub struct VectorIndex {
    dimension: usize,
    snapshot: RwLock<Arc<IndexSnapshot>>,
}

impl VectorIndex {
    /// Create an empty index with a fixed embedding dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            snapshot: RwLock::new(Arc::new(IndexSnapshot::default())),
        }
    }

    /// Configured embedding dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert or update a record's vector (incremental, no rebuild)
    pub async fn insert(&self, record: &MemoryRecord) -> Result<()> {
        if record.embedding.len() != self.dimension {
            return Err(Error::Index(format!(
                "Embedding dimension {} does not match index dimension {}",
                record.embedding.len(),
                self.dimension
            )));
        }

        let mut guard = self.snapshot.write().await;
        let next = Arc::make_mut(&mut guard);
        next.entries.insert(
            record.id,
            IndexEntry {
                vector: record.embedding.clone(),
                created_at: record.created_at,
                excluded: record.tombstoned,
            },
        );
        Ok(())
    }

    /// Exclude a tombstoned record from future searches.
    ///
    /// Vector data is retained; the exclusion is reversible via `restore`
    /// until the record is purged. Returns `false` if the id is unknown.
    pub async fn remove(&self, id: &Uuid) -> bool {
        let mut guard = self.snapshot.write().await;
        let next = Arc::make_mut(&mut guard);
        match next.entries.get_mut(id) {
            Some(entry) => {
                entry.excluded = true;
                true
            }
            None => false,
        }
    }

    /// Re-include a previously removed record
    pub async fn restore(&self, id: &Uuid) -> bool {
        let mut guard = self.snapshot.write().await;
        let next = Arc::make_mut(&mut guard);
        match next.entries.get_mut(id) {
            Some(entry) => {
                entry.excluded = false;
                true
            }
            None => false,
        }
    }

    /// Delete a record's vector data entirely (on purge)
    pub async fn purge(&self, id: &Uuid) -> bool {
        let mut guard = self.snapshot.write().await;
        let next = Arc::make_mut(&mut guard);
        next.entries.remove(id).is_some()
    }

    /// Whether the index holds an entry for this id (excluded or not)
    pub async fn contains(&self, id: &Uuid) -> bool {
        self.snapshot.read().await.entries.contains_key(id)
    }

    /// Number of live (non-excluded) entries
    pub async fn live_len(&self) -> usize {
        self.snapshot
            .read()
            .await
            .entries
            .values()
            .filter(|e| !e.excluded)
            .count()
    }

    /// Return the k nearest live entries by cosine similarity.
    ///
    /// Equal scores tie-break toward the more recent record; this is a
    /// documented policy, not an accident of sort stability.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(Error::Index(format!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        // Clone the Arc and search lock-free on the snapshot
        let snapshot = self.snapshot.read().await.clone();

        let mut scored: Vec<(SearchHit, DateTime<Utc>)> = snapshot
            .entries
            .iter()
            .filter(|(_, entry)| !entry.excluded)
            .map(|(id, entry)| {
                (
                    SearchHit {
                        record_id: *id,
                        score: cosine_similarity(query, &entry.vector),
                    },
                    entry.created_at,
                )
            })
            .collect();

        scored.sort_by(|(a, a_ts), (b, b_ts)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b_ts.cmp(a_ts))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(hit, _)| hit).collect())
    }

    /// Rebuild the index from scratch and swap it in atomically.
    ///
    /// Concurrent readers keep searching the old snapshot until the swap
    /// completes. Tombstoned records enter the new snapshot excluded.
    pub async fn rebuild(&self, records: &[MemoryRecord]) -> Result<()> {
        let mut entries = HashMap::with_capacity(records.len());
        for record in records {
            if record.embedding.len() != self.dimension {
                return Err(Error::Index(format!(
                    "Record {} has dimension {}, index expects {}",
                    record.id,
                    record.embedding.len(),
                    self.dimension
                )));
            }
            entries.insert(
                record.id,
                IndexEntry {
                    vector: record.embedding.clone(),
                    created_at: record.created_at,
                    excluded: record.tombstoned,
                },
            );
        }

        let next = Arc::new(IndexSnapshot { entries });
        *self.snapshot.write().await = next;
        tracing::info!(count = records.len(), "Index rebuilt");
        Ok(())
    }
}

/// Cosine similarity clamped to [0, 1].
///
/// Zero vectors (no token signal) score 0 against everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}
