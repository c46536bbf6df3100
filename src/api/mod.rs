use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

pub mod handlers;
pub mod responses;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::get_health))
        .route("/api/assets/{asset_id}/samples", post(handlers::post_sample))
        .route("/api/assets/{asset_id}/state", get(handlers::get_asset_state))
        .with_state(state)
}
