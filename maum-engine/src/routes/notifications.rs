use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use maum_shared::errors::{AppError, AppResult};
use maum_shared::types::auth::AuthUser;
use maum_shared::types::pagination::{Paginated, PaginationParams};
use maum_shared::types::ApiResponse;

use crate::models::Notification;
use crate::services::notification_service;
use crate::AppState;

/// GET /notifications - the caller's notifications, newest first.
pub async fn list_notifications(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Notification>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let (items, total) = notification_service::list_notifications(
        &mut conn,
        user.id,
        params.limit() as i64,
        params.offset() as i64,
    )?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total as u64, &params))))
}

#[derive(Debug, Serialize)]
pub struct ReadAllResponse {
    pub marked_read: usize,
}

/// POST /notifications/read-all
pub async fn mark_all_read(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<ReadAllResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let marked_read = notification_service::mark_all_read(&mut conn, user.id)?;

    Ok(Json(ApiResponse::ok(ReadAllResponse { marked_read })))
}
