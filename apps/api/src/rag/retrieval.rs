use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::rag::chunk::Chunk;
use crate::rag::embedding::{Embedder, EmbeddingError};
use crate::rag::index::{IndexError, VectorIndex};

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Nothing is indexed yet. Short-circuits the search; never returned publicly.
    #[error("resume index is empty")]
    IndexEmpty,

    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("retrieval timed out after {0:?}")]
    Timeout(Duration),
}

/// Query-side view of the resume index.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    timeout: Duration,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>, timeout: Duration) -> Self {
        Self {
            embedder,
            index,
            timeout,
        }
    }

    /// Texts of the `k` chunks most relevant to `query`, best first.
    ///
    /// Empty before any resume is ingested, and for a blank query.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError> {
        Ok(self
            .search(query, k)
            .await?
            .into_iter()
            .map(|(chunk, _)| chunk.text)
            .collect())
    }

    /// Like [`retrieve`](Self::retrieve) but keeps chunk metadata and scores.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<(Chunk, f32)>, RetrievalError> {
        match self.try_search(query, k).await {
            Err(RetrievalError::IndexEmpty) => Ok(Vec::new()),
            other => other,
        }
    }

    async fn try_search(&self, query: &str, k: usize) -> Result<Vec<(Chunk, f32)>, RetrievalError> {
        let query = query.trim();
        if query.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if self.index.is_empty() {
            return Err(RetrievalError::IndexEmpty);
        }

        let vector = tokio::time::timeout(self.timeout, self.embedder.embed(query))
            .await
            .map_err(|_| RetrievalError::Timeout(self.timeout))??;

        let results = self.index.query(&vector, k)?;
        debug!(
            "Retrieved {} chunks for query of {} chars",
            results.len(),
            query.chars().count()
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::chunk::ChunkConfig;
    use crate::rag::embedding::HashingEmbedder;
    use crate::rag::ingest::IngestPipeline;
    use bytes::Bytes;

    fn components(dims: usize) -> (IngestPipeline, Retriever) {
        components_with(dims, ChunkConfig::default())
    }

    fn components_with(dims: usize, chunk_config: ChunkConfig) -> (IngestPipeline, Retriever) {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(dims));
        let index = Arc::new(VectorIndex::new(Some(dims)));
        let pipeline = IngestPipeline::new(
            embedder.clone(),
            index.clone(),
            chunk_config,
            Duration::from_secs(5),
        );
        let retriever = Retriever::new(embedder, index, Duration::from_secs(5));
        (pipeline, retriever)
    }

    #[tokio::test]
    async fn test_retrieve_before_ingest_is_empty() {
        let (_, retriever) = components(64);
        for query in ["", "   ", "payments migration", "anything at all"] {
            assert!(retriever.retrieve(query, DEFAULT_TOP_K).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_ingest_then_retrieve() {
        let (pipeline, retriever) = components(384);
        let resume = "Alice is a backend engineer with 5 years of Go experience. \
                      She led a payments migration.";
        pipeline
            .ingest(Bytes::from_static(resume.as_bytes()), "alice.txt")
            .await
            .unwrap();

        let results = retriever
            .retrieve("payments migration", DEFAULT_TOP_K)
            .await
            .unwrap();
        assert_eq!(results.first().map(String::as_str), Some(resume));
    }

    #[tokio::test]
    async fn test_blank_query_after_ingest_is_empty() {
        let (pipeline, retriever) = components(64);
        pipeline
            .ingest(Bytes::from_static(b"Rust and Go engineer."), "cv.txt")
            .await
            .unwrap();
        assert!(retriever.retrieve("  \n", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relevant_chunk_ranks_first() {
        let (pipeline, retriever) = components_with(512, ChunkConfig::new(80, 0).unwrap());
        let mut resume = String::new();
        resume.push_str("Education: BSc Computer Science, focus on compilers.\n\n");
        resume.push_str("Hobbies: marathon running and landscape photography.\n\n");
        resume.push_str("Experience: led the payments migration from a monolith to services.\n\n");
        resume.push_str("Skills: Kubernetes, Terraform, PostgreSQL.");
        pipeline
            .ingest(Bytes::from(resume.into_bytes()), "cv.md")
            .await
            .unwrap();

        let results = retriever.retrieve("payments migration", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].contains("payments migration"), "{results:?}");
    }
}
