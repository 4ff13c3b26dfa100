use axum::Json;

use crate::analysis::{analyze_professionalism, AnalyzeRequest, ProfessionalismReport};
use crate::errors::AppError;

/// POST /api/v1/analyze
pub async fn handle_analyze(
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<ProfessionalismReport>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::Validation("text must not be empty".to_string()));
    }
    // Regex scanning is CPU work; keep it off the async workers.
    let report = tokio::task::spawn_blocking(move || analyze_professionalism(&req.text))
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(Json(report))
}
