//! Resume ingestion: extraction → chunking → embedding → index rebuild.
//!
//! Every step either succeeds or the whole ingest fails with an
//! [`IngestError`]; the index is only touched by the final swap, so a failed,
//! timed-out or abandoned ingest leaves the previous resume in place.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::rag::chunk::{split, ChunkConfig};
use crate::rag::embedding::{Embedder, EmbeddingError};
use crate::rag::extract::{detect_format, extract_text, ExtractError, ResumeFormat};
use crate::rag::index::{IndexError, IndexSource, VectorIndex};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported resume format: {0}")]
    UnsupportedFormat(String),

    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("embedding dimensions do not match the index: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("ingestion timed out after {0:?}")]
    Timeout(Duration),
}

impl IngestError {
    /// Stable machine-readable kind, used as the API error code.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            IngestError::ExtractionFailed(_) => "EXTRACTION_FAILED",
            IngestError::EmbeddingFailed(_) => "EMBEDDING_FAILED",
            IngestError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            IngestError::Timeout(_) => "TIMEOUT",
        }
    }
}

impl From<ExtractError> for IngestError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::UnsupportedFormat(name) => IngestError::UnsupportedFormat(name),
            other => IngestError::ExtractionFailed(other.to_string()),
        }
    }
}

impl From<EmbeddingError> for IngestError {
    fn from(e: EmbeddingError) -> Self {
        match e {
            EmbeddingError::DimensionMismatch { expected, actual } => {
                IngestError::DimensionMismatch { expected, actual }
            }
            other => IngestError::EmbeddingFailed(other.to_string()),
        }
    }
}

impl From<IndexError> for IngestError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::DimensionMismatch { expected, actual } => {
                IngestError::DimensionMismatch { expected, actual }
            }
            other => IngestError::EmbeddingFailed(other.to_string()),
        }
    }
}

/// Raw extracted text of one uploaded resume.
#[derive(Debug, Clone)]
pub struct ResumeDocument {
    pub id: Uuid,
    pub filename: String,
    pub format: ResumeFormat,
    pub text: String,
}

/// Outcome of a successful ingest.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: Uuid,
    pub filename: String,
    pub format: ResumeFormat,
    pub char_count: usize,
    pub chunk_count: usize,
    pub generation: Uuid,
    pub embedding_model: String,
}

pub struct IngestPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    chunk_config: ChunkConfig,
    timeout: Duration,
}

impl IngestPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
        chunk_config: ChunkConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            chunk_config,
            timeout,
        }
    }

    /// Replaces the indexed resume with the one in `bytes`.
    pub async fn ingest(&self, bytes: Bytes, filename: &str) -> Result<IngestReport, IngestError> {
        tokio::time::timeout(self.timeout, self.run(bytes, filename))
            .await
            .map_err(|_| IngestError::Timeout(self.timeout))?
    }

    async fn run(&self, bytes: Bytes, filename: &str) -> Result<IngestReport, IngestError> {
        // Step 1: Extract
        let document = extract_document(bytes, filename).await?;
        info!(
            "Extracted {} chars from {} ({:?})",
            document.text.chars().count(),
            document.filename,
            document.format
        );

        // Step 2: Chunk
        let chunks = split(
            &document.id.to_string(),
            &document.text,
            &self.chunk_config,
        );
        info!("Resume {} split into {} chunks", document.id, chunks.len());
        for chunk in &chunks {
            debug!("Chunk {}:\n{}\n---", chunk.index, chunk.text);
        }

        // Step 3: Embed (one batch call)
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        // Step 4: Swap the index
        let chunk_count = chunks.len();
        let source = IndexSource {
            document_id: document.id,
            filename: document.filename.clone(),
            char_count: document.text.chars().count(),
        };
        let generation = self.index.rebuild(source, chunks, vectors).await?;

        Ok(IngestReport {
            document_id: document.id,
            filename: document.filename,
            format: document.format,
            char_count: document.text.chars().count(),
            chunk_count,
            generation,
            embedding_model: self.embedder.model_name().to_string(),
        })
    }
}

/// Detects the format and extracts text on the blocking pool.
async fn extract_document(bytes: Bytes, filename: &str) -> Result<ResumeDocument, IngestError> {
    let format = detect_format(&bytes, filename)?;

    let text = tokio::task::spawn_blocking(move || extract_text(&bytes, format))
        .await
        .map_err(|e| IngestError::ExtractionFailed(format!("extraction worker failed: {e}")))??;

    if text.trim().is_empty() {
        return Err(IngestError::ExtractionFailed(
            "document contains no extractable text".to_string(),
        ));
    }

    Ok(ResumeDocument {
        id: Uuid::new_v4(),
        filename: filename.to_string(),
        format,
        text,
    })
}
