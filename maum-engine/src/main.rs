use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod config;
mod models;
mod routes;
mod schema;
mod services;

use crate::config::AppConfig;
use maum_shared::clients::db::{create_pool, DbPool};
use services::explainer::Explainer;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub explainer: Explainer,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    maum_shared::middleware::init_tracing("maum-engine");

    let config = AppConfig::load()?;
    let port = config.port;

    let db = create_pool(&config.database_url)?;
    let explainer = Explainer::from_config(&config.explainer_url, config.explainer_timeout_secs)?;

    let state = Arc::new(AppState { db, config, explainer });

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/recommendations", get(routes::recommendations::get_recommendations))
        .route("/likes", post(routes::matches::send_like))
        .route("/likes/received", get(routes::matches::list_received_likes))
        .route("/passes", post(routes::matches::send_pass))
        .route("/blocks", post(routes::matches::send_block))
        .route("/matches", get(routes::matches::list_matches))
        .route("/matches/:id/leave", post(routes::matches::leave_match))
        .route("/reports", post(routes::reports::create_report))
        .route("/notifications", get(routes::notifications::list_notifications))
        .route("/notifications/read-all", post(routes::notifications::mark_all_read))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "maum-engine starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
