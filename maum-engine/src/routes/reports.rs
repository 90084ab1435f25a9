use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use maum_shared::errors::{AppError, AppResult};
use maum_shared::types::auth::AuthUser;
use maum_shared::types::ApiResponse;

use crate::models::Report;
use crate::services::match_service;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReportRequest {
    pub target_id: Uuid,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

/// POST /reports - append-only audit record; no match state changes.
pub async fn create_report(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateReportRequest>,
) -> AppResult<Json<ApiResponse<Report>>> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let report = match_service::report(&mut conn, user.id, req.target_id, req.reason)?;

    Ok(Json(ApiResponse::ok(report)))
}
