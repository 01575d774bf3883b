pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::analysis::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.upload_limit;

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/analyze", post(handlers::handle_analyze))
        .route("/api/v1/analyses", get(handlers::handle_list_analyses))
        .route("/api/v1/analyses/:id", get(handlers::handle_get_analysis))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}
