//! 路由表

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::api::ApiState;

/// 构建 HTTP 路由
pub fn build_router(state: ApiState) -> Router {
    let body_limit = state.service.config().request_body_limit();
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/health", get(handlers::health))
        .route("/api/omr/process", post(handlers::process_omr))
        .route("/api/omr/batch", post(handlers::process_omr))
        .route(
            "/api/omr/validate-template",
            post(handlers::validate_template),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
