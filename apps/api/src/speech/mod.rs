//! Speech-to-text for spoken answers.
//!
//! Talks to any Whisper-compatible `POST {url}/audio/transcriptions` endpoint
//! (OpenAI, faster-whisper-server, LocalAI). Handlers depend on the
//! [`Transcriber`] trait only.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SpeechConfig;

pub mod handlers;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("unrecognized audio format: {0}")]
    UnrecognizedFormat(String),

    #[error("transcription timed out after {0:?}")]
    Timeout(Duration),

    #[error("transcription service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("transcription API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Bytes, filename: &str)
        -> Result<String, TranscriptionError>;
}

pub fn create_transcriber(config: &SpeechConfig) -> anyhow::Result<Arc<dyn Transcriber>> {
    match &config.url {
        Some(url) => {
            let transcriber = HttpTranscriber::new(url, config)?;
            info!(
                "Transcriber initialized (model: {}, url: {})",
                transcriber.model, transcriber.url
            );
            Ok(Arc::new(transcriber))
        }
        None => {
            warn!("No STT_URL configured; /transcribe will return 503");
            Ok(Arc::new(DisabledTranscriber))
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct HttpTranscriber {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl HttpTranscriber {
    pub fn new(base_url: &str, config: &SpeechConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/audio/transcriptions", base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout,
        })
    }

    async fn send(&self, audio: Bytes, filename: &str) -> Result<String, TranscriptionError> {
        let part = Part::bytes(audio.to_vec()).file_name(filename.to_string());
        let form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .part("file", part);

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Err(TranscriptionError::Timeout(self.timeout)),
            Err(e) if e.is_connect() => {
                return Err(TranscriptionError::ServiceUnavailable(e.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, body));
        }

        let parsed: TranscriptionResponse = response.json().await?;
        debug!("Transcribed {filename}: {} chars", parsed.text.len());
        Ok(parsed.text.trim().to_string())
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        audio: Bytes,
        filename: &str,
    ) -> Result<String, TranscriptionError> {
        if audio.is_empty() {
            return Err(TranscriptionError::UnrecognizedFormat(
                "empty audio upload".to_string(),
            ));
        }
        tokio::time::timeout(self.timeout, self.send(audio, filename))
            .await
            .map_err(|_| TranscriptionError::Timeout(self.timeout))?
    }
}

/// Maps a non-success response to the error the caller can act on.
fn classify_failure(status: StatusCode, body: String) -> TranscriptionError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNSUPPORTED_MEDIA_TYPE => {
            TranscriptionError::UnrecognizedFormat(body)
        }
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => {
            TranscriptionError::ServiceUnavailable(format!("upstream timeout: {body}"))
        }
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            TranscriptionError::ServiceUnavailable(format!("status {s}: {body}"))
        }
        s => TranscriptionError::Api {
            status: s.as_u16(),
            message: body,
        },
    }
}

/// Used when no transcription service is configured.
pub struct DisabledTranscriber;

#[async_trait]
impl Transcriber for DisabledTranscriber {
    async fn transcribe(
        &self,
        _audio: Bytes,
        _filename: &str,
    ) -> Result<String, TranscriptionError> {
        Err(TranscriptionError::ServiceUnavailable(
            "speech-to-text is not configured".to_string(),
        ))
    }
}
