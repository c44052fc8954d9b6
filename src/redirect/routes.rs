use axum::{routing::get, Router};
use std::sync::Arc;

use crate::analytics::AnalyticsCollector;
use crate::storage::Storage;

use super::handlers::{health_check, redirect_link, RedirectState};

pub fn create_redirect_router(
    storage: Arc<dyn Storage>,
    collector: Arc<AnalyticsCollector>,
) -> Router {
    let state = Arc::new(RedirectState { storage, collector });

    Router::new()
        .route("/", get(health_check))
        .route("/{*slug}", get(redirect_link))
        .with_state(state)
}
