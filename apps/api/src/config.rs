use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::rag::chunk::ChunkConfig;
use crate::rag::embedding::{local_model_dims, DEFAULT_LOCAL_MODEL, LOCAL_MODELS};
use crate::rag::retrieval::DEFAULT_TOP_K;

/// Application configuration loaded from environment variables.
/// Every key has a default; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub max_upload_bytes: usize,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub speech: SpeechConfig,
    pub rag: RagConfig,
}

/// Question-generation endpoint (OpenAI-compatible chat completions).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    /// No key means generation is disabled and every turn uses the static fallback.
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Outer bound on one turn's generation call, retries included.
    pub generation_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// `"local"` (fastembed, on-box), `"openai"` (any OpenAI-compatible
    /// endpoint) or `"hashing"` (bag-of-words, no model files).
    pub provider: String,
    pub model: String,
    pub dims: usize,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Base URL of a Whisper-compatible transcription service. None disables `/transcribe`.
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub chunk: ChunkConfig,
    pub top_k: usize,
    pub ingest_timeout_secs: u64,
    pub retrieval_timeout_secs: u64,
}

impl LlmConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

impl RagConfig {
    pub fn ingest_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest_timeout_secs)
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let chunk_size: usize = parse_or(&get, "CHUNK_SIZE", 500)?;
        let chunk_overlap: usize = parse_or(&get, "CHUNK_OVERLAP", 50)?;
        let chunk = ChunkConfig::new(chunk_size, chunk_overlap)
            .context("CHUNK_SIZE / CHUNK_OVERLAP are inconsistent")?;

        let top_k: usize = parse_or(&get, "RETRIEVAL_TOP_K", DEFAULT_TOP_K)?;
        if top_k == 0 {
            bail!("RETRIEVAL_TOP_K must be at least 1");
        }

        let provider = get("EMBEDDING_PROVIDER").unwrap_or_else(|| "local".to_string());
        let embedding = match provider.as_str() {
            "local" => {
                let model = get("EMBEDDING_MODEL")
                    .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string())
                    .to_lowercase();
                let known = local_model_dims(&model).with_context(|| {
                    format!(
                        "Unknown local embedding model '{model}' (supported: {})",
                        LOCAL_MODELS
                            .iter()
                            .map(|(name, _)| *name)
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                })?;
                let dims = parse_or(&get, "EMBEDDING_DIMS", known)?;
                if dims != known {
                    bail!("EMBEDDING_DIMS={dims} does not match {model}, which produces {known}");
                }
                EmbeddingConfig {
                    provider,
                    model,
                    dims,
                    url: None,
                    api_key: None,
                    timeout_secs: parse_or(&get, "EMBEDDING_TIMEOUT_SECS", 30)?,
                    max_retries: 0,
                }
            }
            "hashing" => EmbeddingConfig {
                provider,
                model: get("EMBEDDING_MODEL").unwrap_or_else(|| "hashing-bow".to_string()),
                dims: parse_or(&get, "EMBEDDING_DIMS", 384)?,
                url: None,
                api_key: None,
                timeout_secs: parse_or(&get, "EMBEDDING_TIMEOUT_SECS", 30)?,
                max_retries: parse_or(&get, "EMBEDDING_MAX_RETRIES", 3)?,
            },
            "openai" => EmbeddingConfig {
                provider,
                model: get("EMBEDDING_MODEL")
                    .unwrap_or_else(|| "text-embedding-3-small".to_string()),
                dims: parse_or(&get, "EMBEDDING_DIMS", 1536)?,
                url: Some(
                    get("EMBEDDING_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                ),
                api_key: get("EMBEDDING_API_KEY"),
                timeout_secs: parse_or(&get, "EMBEDDING_TIMEOUT_SECS", 30)?,
                max_retries: parse_or(&get, "EMBEDDING_MAX_RETRIES", 3)?,
            },
            other => bail!(
                "Unknown EMBEDDING_PROVIDER '{other}' (expected 'local', 'openai' or 'hashing')"
            ),
        };
        if embedding.dims == 0 {
            bail!("EMBEDDING_DIMS must be greater than zero");
        }

        Ok(Config {
            port: parse_or(&get, "PORT", 8000)?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?,
            llm: LlmConfig {
                api_url: get("LLM_API_URL")
                    .unwrap_or_else(|| "https://router.huggingface.co/v1".to_string()),
                api_key: get("LLM_API_KEY").or_else(|| get("HF_TOKEN")),
                model: get("LLM_MODEL")
                    .unwrap_or_else(|| "meta-llama/Meta-Llama-3-8B-Instruct".to_string()),
                timeout_secs: parse_or(&get, "LLM_TIMEOUT_SECS", 60)?,
                max_retries: parse_or(&get, "LLM_MAX_RETRIES", 3)?,
                generation_timeout_secs: parse_or(&get, "GENERATION_TIMEOUT_SECS", 90)?,
            },
            embedding,
            speech: SpeechConfig {
                url: get("STT_URL"),
                api_key: get("STT_API_KEY"),
                model: get("STT_MODEL").unwrap_or_else(|| "whisper-1".to_string()),
                timeout_secs: parse_or(&get, "STT_TIMEOUT_SECS", 120)?,
            },
            rag: RagConfig {
                chunk,
                top_k,
                ingest_timeout_secs: parse_or(&get, "INGEST_TIMEOUT_SECS", 120)?,
                retrieval_timeout_secs: parse_or(&get, "RETRIEVAL_TIMEOUT_SECS", 30)?,
            },
        })
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.rag.chunk.chunk_size(), 500);
        assert_eq!(config.rag.chunk.overlap(), 50);
        assert_eq!(config.rag.top_k, 3);
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.embedding.model, "all-minilm-l6-v2");
        assert_eq!(config.embedding.dims, 384);
        assert!(config.llm.api_key.is_none());
        assert!(config.speech.url.is_none());
    }

    #[test]
    fn test_hf_token_is_accepted_as_llm_key() {
        let config = config_from(&[("HF_TOKEN", "hf_abc")]).unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("hf_abc"));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_overlap_not_smaller_than_chunk_is_rejected() {
        assert!(config_from(&[("CHUNK_SIZE", "50"), ("CHUNK_OVERLAP", "50")]).is_err());
    }

    #[test]
    fn test_unknown_embedding_provider_is_rejected() {
        let err = config_from(&[("EMBEDDING_PROVIDER", "word2vec")]).unwrap_err();
        assert!(err.to_string().contains("word2vec"));
    }

    #[test]
    fn test_openai_embedding_defaults() {
        let config = config_from(&[("EMBEDDING_PROVIDER", "openai")]).unwrap();
        assert_eq!(config.embedding.dims, 1536);
        assert_eq!(
            config.embedding.url.as_deref(),
            Some("https://api.openai.com/v1")
        );
    }

    #[test]
    fn test_local_model_sets_dims() {
        let config = config_from(&[("EMBEDDING_MODEL", "BGE-Base-EN-v1.5")]).unwrap();
        assert_eq!(config.embedding.model, "bge-base-en-v1.5");
        assert_eq!(config.embedding.dims, 768);
    }

    #[test]
    fn test_local_model_rejects_conflicting_dims() {
        let err = config_from(&[("EMBEDDING_DIMS", "768")]).unwrap_err();
        assert!(err.to_string().contains("all-minilm-l6-v2"));
        assert!(config_from(&[("EMBEDDING_MODEL", "word2vec-google")]).is_err());
    }

    #[test]
    fn test_hashing_provider_is_opt_in() {
        let config = config_from(&[("EMBEDDING_PROVIDER", "hashing")]).unwrap();
        assert_eq!(config.embedding.model, "hashing-bow");
        assert_eq!(config.embedding.dims, 384);
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config_from(&[("PORT", "  "), ("LLM_MODEL", "")]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.llm.model, "meta-llama/Meta-Llama-3-8B-Instruct");
    }
}
