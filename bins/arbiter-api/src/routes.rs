// Route table for the Arbiter API

use crate::handlers;
use crate::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/run", post(handlers::run))
        .route("/submit", post(handlers::submit))
        .route("/submissions/:id", get(handlers::get_submission))
        .route("/languages", get(handlers::list_languages))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
}
