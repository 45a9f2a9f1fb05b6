use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

use super::handlers;
use super::AppState;

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(make_span_with_request_id)
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let status = res.status();
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
        .layer(middleware::from_fn(request_id_middleware))
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Recommendations
        .route(
            "/recommendations/:user_id",
            get(handlers::get_recommendations),
        )
        .route(
            "/recommendations/:user_id/refresh",
            post(handlers::refresh_recommendations),
        )
        // Interactions
        .route("/interactions", post(handlers::record_interaction))
        // Disease extraction
        .route(
            "/llm/parse-disease-history",
            post(handlers::parse_disease_history),
        )
        .route(
            "/users/:user_id/disease-history",
            post(handlers::update_disease_history),
        )
}
