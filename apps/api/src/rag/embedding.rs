//! Embedding providers.
//!
//! - `LocalEmbedder` - sentence-transformer models run in-process through
//!   fastembed (ONNX). The default; the model is fetched on first use.
//!   Needs the `local-embeddings` feature.
//! - [`HashingEmbedder`] - feature-hashing bag of words. Deterministic and
//!   offline; opt in with `EMBEDDING_PROVIDER=hashing`. Tests use it too.
//! - [`HttpEmbedder`] - any OpenAI-compatible `POST {url}/embeddings` endpoint,
//!   batched, with retry on 429 / 5xx / network errors.
//!
//! The same provider instance serves ingestion and query embedding, and every
//! vector it returns is checked against [`Embedder::dims`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;

pub type EmbeddingVector = Vec<f32>;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("embedding model returned {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding model returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding worker failed: {0}")]
    Worker(String),
}

/// Maps text to fixed-length vectors.
///
/// `embed_batch` must equal mapping `embed` over the inputs.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    fn dims(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError>;

    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }
}

/// Model used by the `local` provider when `EMBEDDING_MODEL` is unset.
pub const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";

/// Models the `local` provider can run, with their output dimensions.
pub const LOCAL_MODELS: &[(&str, usize)] = &[
    ("all-minilm-l6-v2", 384),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("bge-large-en-v1.5", 1024),
    ("nomic-embed-text-v1", 768),
    ("nomic-embed-text-v1.5", 768),
    ("multilingual-e5-small", 384),
    ("multilingual-e5-base", 768),
    ("multilingual-e5-large", 1024),
];

pub fn local_model_dims(name: &str) -> Option<usize> {
    LOCAL_MODELS
        .iter()
        .find(|(model, _)| *model == name)
        .map(|(_, dims)| *dims)
}

/// Builds the provider named in the configuration.
///
/// | `EMBEDDING_PROVIDER` | Provider |
/// |---|---|
/// | `local` | `LocalEmbedder` (needs the `local-embeddings` feature) |
/// | `openai` | [`HttpEmbedder`] |
/// | `hashing` | [`HashingEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => anyhow::bail!(
            "The local embedding provider requires --features local-embeddings; \
             set EMBEDDING_PROVIDER=openai or hashing instead"
        ),
        "hashing" => Ok(Arc::new(HashingEmbedder::named(
            config.model.clone(),
            config.dims,
        ))),
        "openai" => Ok(Arc::new(HttpEmbedder::new(config)?)),
        other => anyhow::bail!("Unknown embedding provider: {other}"),
    }
}

/// Checks a provider response against the requested batch.
fn validate_batch(
    vectors: &[EmbeddingVector],
    expected_count: usize,
    dims: usize,
) -> Result<(), EmbeddingError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingError::CountMismatch {
            expected: expected_count,
            actual: vectors.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dims,
            actual: bad.len(),
        });
    }
    Ok(())
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, zero or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

// ────────────────────────────────────────────────────────────────────────────
// HashingEmbedder
// ────────────────────────────────────────────────────────────────────────────

/// Feature-hashing bag-of-words embedder.
///
/// Each lower-cased alphanumeric token is hashed (FNV-1a) into one of `dims`
/// buckets with a hash-derived sign; the result is L2-normalised. Texts that
/// share words land close together, which is enough for resume retrieval
/// without a model download.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    model: String,
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self::named("hashing-bow".to_string(), dims)
    }

    /// Reports `model` as its model name, so stored vectors can be told apart
    /// by configuration.
    pub fn named(model: String, dims: usize) -> Self {
        Self {
            model,
            dims: dims.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> EmbeddingVector {
        let mut vector = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dims as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        // CPU-bound; keep it off the async workers.
        let embedder = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || texts.iter().map(|t| embedder.embed_sync(t)).collect())
            .await
            .map_err(|e| EmbeddingError::Worker(e.to_string()))
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}

// ────────────────────────────────────────────────────────────────────────────
// LocalEmbedder
// ────────────────────────────────────────────────────────────────────────────

/// Runs a sentence-transformer model in-process with fastembed.
///
/// The model is loaded on the first embed call, inside the blocking pool,
/// and kept for the life of the process. Inference also runs on the blocking
/// pool.
#[cfg(feature = "local-embeddings")]
#[derive(Clone)]
pub struct LocalEmbedder {
    model_name: String,
    model: fastembed::EmbeddingModel,
    dims: usize,
    batch_size: usize,
    loaded: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings")]
const LOCAL_BATCH_SIZE: usize = 64;

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = to_fastembed_model(&config.model)?;
        let dims = local_model_dims(&config.model).unwrap_or(config.dims);
        if dims != config.dims {
            anyhow::bail!(
                "{} produces {dims}-dimensional vectors, configured for {}",
                config.model,
                config.dims
            );
        }

        Ok(Self {
            model_name: config.model.clone(),
            model,
            dims,
            batch_size: LOCAL_BATCH_SIZE,
            loaded: Arc::new(std::sync::Mutex::new(None)),
        })
    }

    fn embed_blocking(&self, texts: Vec<String>) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        let mut slot = self
            .loaded
            .lock()
            .map_err(|_| EmbeddingError::Worker("local model lock poisoned".to_string()))?;

        if slot.is_none() {
            tracing::info!("Loading local embedding model: {}", self.model_name);
            let options = fastembed::InitOptions::new(self.model.clone())
                .with_show_download_progress(true);
            let model = fastembed::TextEmbedding::try_new(options).map_err(|e| {
                EmbeddingError::Worker(format!("failed to load {}: {e}", self.model_name))
            })?;
            *slot = Some(model);
        }

        let Some(model) = slot.as_mut() else {
            return Err(EmbeddingError::Worker("local model not loaded".to_string()));
        };
        model
            .embed(texts, Some(self.batch_size))
            .map_err(|e| EmbeddingError::Worker(format!("local embedding failed: {e}")))
    }
}

#[cfg(feature = "local-embeddings")]
fn to_fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
    use fastembed::EmbeddingModel;
    match name {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(EmbeddingModel::MultilingualE5Large),
        other => anyhow::bail!("Unknown local embedding model: '{other}'"),
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embedder = self.clone();
        let inputs = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_blocking(inputs))
            .await
            .map_err(|e| EmbeddingError::Worker(e.to_string()))??;
        validate_batch(&vectors, texts.len(), self.dims)?;
        debug!("Embedded {} texts with {}", texts.len(), self.model_name);
        Ok(vectors)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// HttpEmbedder
// ────────────────────────────────────────────────────────────────────────────

/// OpenAI-compatible embeddings client.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("EMBEDDING_URL required for the openai provider"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_error: Option<EmbeddingError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, ... capped at 32s
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(
                    "Embedding call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(format!("{}/embeddings", self.url))
                .json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(EmbeddingError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let message = response.text().await.unwrap_or_default();
                last_error = Some(EmbeddingError::Api {
                    status: status.as_u16(),
                    message,
                });
                continue;
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(EmbeddingError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: EmbeddingsResponse = response.json().await?;
            debug!("Embedded {} texts with {}", texts.len(), self.model);
            return Ok(order_by_index(parsed.data));
        }

        Err(last_error.unwrap_or(EmbeddingError::Api {
            status: 0,
            message: "embedding failed after retries".to_string(),
        }))
    }
}

/// Restores input order; providers may return items out of order.
fn order_by_index(mut items: Vec<EmbeddingItem>) -> Vec<EmbeddingVector> {
    if items.iter().all(|item| item.index.is_some()) {
        items.sort_by_key(|item| item.index);
    }
    items.into_iter().map(|item| item.embedding).collect()
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.request(texts).await?;
        validate_batch(&vectors, texts.len(), self.dims)?;
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_hashing_is_deterministic_and_normalised() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_sync("Led a payments migration in Go");
        let b = embedder.embed_sync("Led a payments migration in Go");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_is_case_and_punctuation_insensitive() {
        let embedder = HashingEmbedder::new(128);
        let a = embedder.embed_sync("Payments, Migration!");
        let b = embedder.embed_sync("payments migration");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_ranks_shared_words_higher() {
        let embedder = HashingEmbedder::new(384);
        let query = embedder.embed_sync("payments migration");
        let related = embedder.embed_sync("She led a payments migration at a fintech");
        let unrelated = embedder.embed_sync("Organised the office holiday party");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed_sync("  ...  ").iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let embedder = HashingEmbedder::new(32);
        let texts = vec!["backend engineer".to_string(), "data pipelines".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        for (text, vector) in texts.iter().zip(&batch) {
            assert_eq!(&embedder.embed(text).await.unwrap(), vector);
        }
    }

    #[test]
    fn test_validate_batch_rejects_wrong_dims() {
        let err = validate_batch(&[vec![0.0; 3]], 1, 4).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_validate_batch_rejects_wrong_count() {
        let err = validate_batch(&[vec![0.0; 4]], 2, 4).unwrap_err();
        assert!(matches!(err, EmbeddingError::CountMismatch { .. }));
    }

    #[test]
    fn test_order_by_index() {
        let items = vec![
            EmbeddingItem {
                index: Some(1),
                embedding: vec![1.0],
            },
            EmbeddingItem {
                index: Some(0),
                embedding: vec![0.0],
            },
        ];
        assert_eq!(order_by_index(items), vec![vec![0.0], vec![1.0]]);
    }

    fn embedding_config(vars: &[(&str, &str)]) -> EmbeddingConfig {
        crate::config::Config::from_lookup(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
        .unwrap()
        .embedding
    }

    #[test]
    fn test_local_model_table() {
        assert_eq!(local_model_dims(DEFAULT_LOCAL_MODEL), Some(384));
        assert_eq!(local_model_dims("bge-large-en-v1.5"), Some(1024));
        assert_eq!(local_model_dims("hashing-bow"), None);
    }

    #[cfg(feature = "local-embeddings")]
    #[test]
    fn test_create_embedder_defaults_to_local_model() {
        // Construction must not download or load the model.
        let embedder = create_embedder(&embedding_config(&[])).unwrap();
        assert_eq!(embedder.model_name(), "all-minilm-l6-v2");
        assert_eq!(embedder.dims(), 384);
    }

    #[cfg(feature = "local-embeddings")]
    #[test]
    fn test_every_local_model_maps_to_fastembed() {
        for (name, _) in LOCAL_MODELS {
            assert!(to_fastembed_model(name).is_ok(), "{name}");
        }
        assert!(to_fastembed_model("word2vec").is_err());
    }

    #[cfg(not(feature = "local-embeddings"))]
    #[test]
    fn test_local_provider_needs_feature() {
        let err = create_embedder(&embedding_config(&[])).err().unwrap();
        assert!(err.to_string().contains("local-embeddings"));
    }

    #[test]
    fn test_create_embedder_hashing_honours_model_name() {
        let embedder = create_embedder(&embedding_config(&[("EMBEDDING_PROVIDER", "hashing")])).unwrap();
        assert_eq!(embedder.model_name(), "hashing-bow");
        assert_eq!(embedder.dims(), 384);

        let embedder = create_embedder(&embedding_config(&[
            ("EMBEDDING_PROVIDER", "hashing"),
            ("EMBEDDING_MODEL", "hashing-v2"),
            ("EMBEDDING_DIMS", "256"),
        ]))
        .unwrap();
        assert_eq!(embedder.model_name(), "hashing-v2");
        assert_eq!(embedder.dims(), 256);
    }

    #[tokio::test]
    async fn test_http_max_retries_counts_retries_after_first_attempt() {
        let (url, hits) = crate::test_support::status_server(503).await;
        let embedder = HttpEmbedder::new(&embedding_config(&[
            ("EMBEDDING_PROVIDER", "openai"),
            ("EMBEDDING_URL", url.as_str()),
            ("EMBEDDING_MAX_RETRIES", "1"),
        ]))
        .unwrap();

        let err = embedder.embed("rust").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Api { status: 503, .. }));
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
