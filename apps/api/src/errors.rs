use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::rag::ingest::IngestError;
use crate::speech::TranscriptionError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Transcription error: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Ingest(e) => {
                let status = match e {
                    IngestError::UnsupportedFormat(_) | IngestError::ExtractionFailed(_) => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    IngestError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    IngestError::EmbeddingFailed(_) | IngestError::DimensionMismatch { .. } => {
                        tracing::error!("Resume ingest failed: {e}");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.kind(), e.to_string())
            }
            AppError::Transcription(e) => match e {
                TranscriptionError::UnrecognizedFormat(_) => (
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    "UNRECOGNIZED_FORMAT",
                    "Audio format not recognized".to_string(),
                ),
                TranscriptionError::Timeout(_) => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "TIMEOUT",
                    e.to_string(),
                ),
                TranscriptionError::ServiceUnavailable(_) => {
                    tracing::warn!("Transcription unavailable: {e}");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "SERVICE_UNAVAILABLE",
                        "Speech-to-text is currently unavailable".to_string(),
                    )
                }
                TranscriptionError::Api { .. } | TranscriptionError::Http(_) => {
                    tracing::error!("Transcription error: {e}");
                    (
                        StatusCode::BAD_GATEWAY,
                        "TRANSCRIPTION_ERROR",
                        "The speech-to-text service returned an error".to_string(),
                    )
                }
            },
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
