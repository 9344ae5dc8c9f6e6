pub mod analysis;
pub mod auth;
pub mod detections;
pub mod health;
pub mod reports;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::routes())
        .merge(analysis::routes())
        .merge(detections::routes())
        .merge(reports::routes())
}
