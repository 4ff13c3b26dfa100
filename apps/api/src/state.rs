use std::sync::Arc;

use crate::config::Config;
use crate::interview::controller::TurnController;
use crate::llm_client::QuestionGenerator;
use crate::rag::embedding::Embedder;
use crate::rag::index::VectorIndex;
use crate::rag::ingest::IngestPipeline;
use crate::rag::retrieval::Retriever;
use crate::speech::Transcriber;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// The single process-wide resume index. Replaced wholesale on every upload.
    pub index: Arc<VectorIndex>,
    pub ingest: Arc<IngestPipeline>,
    pub retriever: Retriever,
    pub interview: Arc<TurnController>,
    pub transcriber: Arc<dyn Transcriber>,
}

impl AppState {
    /// Wires the RAG components around one embedder. The index dimension is
    /// pinned to the embedder's so a model change cannot mix vector spaces.
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn QuestionGenerator>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        let index = Arc::new(VectorIndex::new(Some(embedder.dims())));
        let ingest = Arc::new(IngestPipeline::new(
            embedder.clone(),
            index.clone(),
            config.rag.chunk,
            config.rag.ingest_timeout(),
        ));
        let retriever = Retriever::new(embedder, index.clone(), config.rag.retrieval_timeout());
        let interview = Arc::new(TurnController::new(
            retriever.clone(),
            generator,
            config.rag.top_k,
            config.llm.generation_timeout(),
        ));

        Self {
            config,
            index,
            ingest,
            retriever,
            interview,
            transcriber,
        }
    }
}
