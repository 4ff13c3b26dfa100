//! In-memory vector index over the active resume's chunks.
//!
//! The installed index is an immutable [`IndexSnapshot`] behind an `Arc`.
//! `rebuild` builds the next snapshot off to the side and swaps the pointer;
//! the `RwLock` is only held for that clone/swap, so queries never wait on a
//! build and never see a half-built index. Rebuilds are serialised by a
//! separate async mutex that also owns the fixed dimensionality.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::rag::chunk::Chunk;
use crate::rag::embedding::{cosine_similarity, EmbeddingVector};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{chunks} chunks but {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },
}

/// Where the installed chunks came from.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSource {
    pub document_id: Uuid,
    pub filename: String,
    pub char_count: usize,
}

#[derive(Debug)]
struct IndexEntry {
    chunk: Chunk,
    vector: EmbeddingVector,
}

/// One immutable generation of the index.
#[derive(Debug)]
pub struct IndexSnapshot {
    generation: Uuid,
    source: Option<IndexSource>,
    built_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl IndexSnapshot {
    fn empty() -> Self {
        Self {
            generation: Uuid::new_v4(),
            source: None,
            built_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn generation(&self) -> Uuid {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Top-`k` chunks by cosine similarity, best first. Ties keep chunk order.
    pub fn query(&self, vector: &[f32], k: usize) -> Vec<(Chunk, f32)> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(vector, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| (self.entries[i].chunk.clone(), score))
            .collect()
    }
}

/// Summary of the installed index, for status endpoints and logs.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub generation: Uuid,
    pub chunk_count: usize,
    pub dims: Option<usize>,
    pub source: Option<IndexSource>,
    pub built_at: DateTime<Utc>,
}

/// Process-wide resume index. Lifecycle: `new` → `rebuild`* / `query`* → `reset`.
pub struct VectorIndex {
    current: RwLock<Arc<IndexSnapshot>>,
    /// Writer lock; holds the dimensionality once fixed.
    writer: Mutex<Option<usize>>,
}

impl VectorIndex {
    /// `dims` pins the dimensionality up front (the configured model's);
    /// `None` lets the first rebuild fix it.
    pub fn new(dims: Option<usize>) -> Self {
        Self {
            current: RwLock::new(Arc::new(IndexSnapshot::empty())),
            writer: Mutex::new(dims),
        }
    }

    /// The currently installed snapshot.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    fn install(&self, snapshot: IndexSnapshot) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(snapshot);
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Number of chunks in the installed snapshot.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub async fn dims(&self) -> Option<usize> {
        *self.writer.lock().await
    }

    /// Replaces the whole index with `chunks` / `vectors`.
    ///
    /// On error the previously installed snapshot is untouched.
    pub async fn rebuild(
        &self,
        source: IndexSource,
        chunks: Vec<Chunk>,
        vectors: Vec<EmbeddingVector>,
    ) -> Result<Uuid, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let mut dims = self.writer.lock().await;

        let expected = match *dims {
            Some(d) => Some(d),
            None => vectors.first().map(Vec::len),
        };
        if let Some(expected) = expected {
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        let snapshot = IndexSnapshot {
            generation: Uuid::new_v4(),
            source: Some(source),
            built_at: Utc::now(),
            entries: chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexEntry { chunk, vector })
                .collect(),
        };
        let generation = snapshot.generation;
        let chunk_count = snapshot.len();

        self.install(snapshot);
        *dims = expected;

        info!(
            "Vector index rebuilt: generation={} chunks={}",
            generation, chunk_count
        );
        Ok(generation)
    }

    /// Top-`k` chunks for `vector` from one consistent snapshot.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<(Chunk, f32)>, IndexError> {
        let snapshot = self.snapshot();
        if let Some(entry) = snapshot.entries.first() {
            if entry.vector.len() != vector.len() {
                return Err(IndexError::DimensionMismatch {
                    expected: entry.vector.len(),
                    actual: vector.len(),
                });
            }
        }
        Ok(snapshot.query(vector, k))
    }

    /// Drops the installed resume. The dimensionality stays fixed.
    pub async fn reset(&self) {
        let _writer = self.writer.lock().await;
        self.install(IndexSnapshot::empty());
        info!("Vector index reset");
    }

    pub async fn status(&self) -> IndexStatus {
        let dims = self.dims().await;
        let snapshot = self.snapshot();
        IndexStatus {
            generation: snapshot.generation(),
            chunk_count: snapshot.len(),
            dims,
            source: snapshot.source.clone(),
            built_at: snapshot.built_at,
        }
    }
}
