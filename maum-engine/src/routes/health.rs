use axum::Json;
use maum_shared::types::api::HealthResponse;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy("maum-engine", env!("CARGO_PKG_VERSION")))
}
