use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::interview::models::{TurnReply, TurnRequest};
use crate::interview::questions::{known_roles, questions_for_role};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RoleQuery {
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct QuestionsResponse {
    pub questions: Vec<String>,
    pub known_roles: [&'static str; 3],
}

/// POST /api/v1/interview/turn
pub async fn handle_turn(
    State(state): State<AppState>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnReply>, AppError> {
    if req.role.trim().is_empty() {
        return Err(AppError::Validation("role must not be empty".to_string()));
    }
    let reply = state.interview.next_turn(&req.role, &req.history).await;
    Ok(Json(reply))
}

/// GET /api/v1/questions?role=
pub async fn handle_questions(Query(params): Query<RoleQuery>) -> Json<QuestionsResponse> {
    let list = questions_for_role(&params.role);
    let questions = if list.is_empty() {
        vec![format!("No questions found for role: {}", params.role)]
    } else {
        list.iter().map(|q| q.to_string()).collect()
    };
    Json(QuestionsResponse {
        questions,
        known_roles: known_roles(),
    })
}
