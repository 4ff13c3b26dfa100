use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::analysis::{analyze_professionalism, ProfessionalismReport};
use crate::errors::AppError;
use crate::rag::handlers::read_upload;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TranscriptionResponse {
    pub text: String,
    pub analysis: ProfessionalismReport,
}

/// POST /api/v1/transcribe
/// Multipart `audio` (or any file part) → transcript plus its professionalism analysis.
pub async fn handle_transcribe(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TranscriptionResponse>, AppError> {
    let upload = read_upload(multipart, "audio").await?;
    info!(
        "Transcribing {} ({} bytes)",
        upload.filename,
        upload.bytes.len()
    );

    let text = state
        .transcriber
        .transcribe(upload.bytes, &upload.filename)
        .await?;

    Ok(Json(analyze_transcript(text).await?))
}

/// Runs the regex analysis on the blocking pool, like `/analyze`.
async fn analyze_transcript(text: String) -> Result<TranscriptionResponse, AppError> {
    tokio::task::spawn_blocking(move || {
        let analysis = analyze_professionalism(&text);
        TranscriptionResponse { text, analysis }
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))
}
