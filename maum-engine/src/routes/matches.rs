use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use maum_shared::errors::{AppError, AppResult, ErrorCode};
use maum_shared::types::auth::AuthUser;
use maum_shared::types::pagination::{Paginated, PaginationParams};
use maum_shared::types::ApiResponse;

use crate::models::{Match, Profile};
use crate::schema::profiles;
use crate::services::match_service::{self, LikeOutcome};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    pub target_id: Uuid,
}

/// POST /likes - like a user; may complete a mutual match.
pub async fn send_like(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<TargetRequest>,
) -> AppResult<Json<ApiResponse<LikeOutcome>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    // Liking a user who has no profile yet is a 404, not a dangling record.
    profiles::table
        .filter(profiles::user_id.eq(req.target_id))
        .first::<Profile>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "target profile not found"))?;

    let outcome = match_service::like(
        &mut conn,
        user.id,
        req.target_id,
        Utc::now().date_naive(),
        state.config.daily_like_limit,
    )?;

    Ok(Json(ApiResponse::ok(outcome)))
}

/// POST /passes - pass on a user; quota-exempt.
pub async fn send_pass(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<TargetRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    match_service::pass(&mut conn, user.id, req.target_id)?;

    Ok(Json(ApiResponse::ok(serde_json::json!({}))))
}

/// POST /blocks - block a user and cancel every match between the pair.
pub async fn send_block(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<TargetRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    match_service::block(&mut conn, user.id, req.target_id)?;

    Ok(Json(ApiResponse::ok(serde_json::json!({}))))
}

/// POST /matches/:id/leave - cancel a single match as a participant.
pub async fn leave_match(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Match>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let updated = match_service::leave(&mut conn, user.id, match_id)?;

    Ok(Json(ApiResponse::ok(updated)))
}

/// GET /matches - mutual matches involving the caller.
pub async fn list_matches(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Match>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let (items, total) = match_service::list_accepted(
        &mut conn,
        user.id,
        params.limit() as i64,
        params.offset() as i64,
    )?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total as u64, &params))))
}

/// GET /likes/received - pending likes waiting on the caller.
pub async fn list_received_likes(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Match>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let (items, total) = match_service::list_received_pending(
        &mut conn,
        user.id,
        params.limit() as i64,
        params.offset() as i64,
    )?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total as u64, &params))))
}
