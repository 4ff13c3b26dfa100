pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::analysis::handlers as analysis;
use crate::interview::handlers as interview;
use crate::rag::handlers as resume;
use crate::speech::handlers as speech;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_handler))
        // Interview
        .route("/api/v1/questions", get(interview::handle_questions))
        .route("/api/v1/interview/turn", post(interview::handle_turn))
        // Resume index
        .route(
            "/api/v1/resume",
            post(resume::handle_upload)
                .get(resume::handle_status)
                .delete(resume::handle_reset),
        )
        .route("/api/v1/resume/search", get(resume::handle_search))
        // Answer analysis
        .route("/api/v1/transcribe", post(speech::handle_transcribe))
        .route("/api/v1/analyze", post(analysis::handle_analyze))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}
