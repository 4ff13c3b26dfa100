use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::rag::index::IndexStatus;
use crate::rag::ingest::IngestReport;
use crate::state::AppState;

const MAX_SEARCH_K: usize = 20;

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub index: usize,
    pub score: f32,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

/// An uploaded file pulled out of a multipart body.
pub struct Upload {
    pub filename: String,
    pub bytes: Bytes,
}

/// Reads the part named `field`, falling back to the first part carrying a filename.
pub async fn read_upload(mut multipart: Multipart, field: &str) -> Result<Upload, AppError> {
    let mut fallback: Option<Upload> = None;

    while let Some(part) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        let is_named = part.name() == Some(field);
        let filename = part.file_name().map(str::to_string);
        if !is_named && (filename.is_none() || fallback.is_some()) {
            continue;
        }
        let bytes = part
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("failed to read upload: {e}")))?;
        let upload = Upload {
            filename: filename.unwrap_or_else(|| field.to_string()),
            bytes,
        };
        if is_named {
            return Ok(upload);
        }
        fallback = Some(upload);
    }

    fallback.ok_or_else(|| AppError::Validation(format!("missing '{field}' file field")))
}

/// POST /api/v1/resume
pub async fn handle_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<IngestReport>), AppError> {
    let upload = read_upload(multipart, "file").await?;
    if upload.bytes.is_empty() {
        return Err(AppError::Validation("uploaded file is empty".to_string()));
    }
    info!(
        "Resume upload received: {} ({} bytes)",
        upload.filename,
        upload.bytes.len()
    );

    let report = state.ingest.ingest(upload.bytes, &upload.filename).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /api/v1/resume
pub async fn handle_status(State(state): State<AppState>) -> Json<IndexStatus> {
    Json(state.index.status().await)
}

/// DELETE /api/v1/resume
pub async fn handle_reset(State(state): State<AppState>) -> StatusCode {
    state.index.reset().await;
    info!("Resume index reset");
    StatusCode::NO_CONTENT
}

/// GET /api/v1/resume/search?q=&k=
pub async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let k = params.k.unwrap_or(state.config.rag.top_k);
    if k == 0 || k > MAX_SEARCH_K {
        return Err(AppError::Validation(format!(
            "k must be between 1 and {MAX_SEARCH_K}"
        )));
    }

    let results = state
        .retriever
        .search(&params.q, k)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let hits = results
        .into_iter()
        .map(|(chunk, score)| SearchHit {
            chunk_id: chunk.id,
            index: chunk.index,
            score,
            text: chunk.text,
        })
        .collect();

    Ok(Json(SearchResponse {
        query: params.q,
        hits,
    }))
}
