pub mod batches;
pub mod health;
pub mod jobs;
pub mod page;
pub mod settings;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(page::handle_index))
        .route("/health", get(health::health_handler))
        // Review
        .route("/api/v1/jobs", get(jobs::handle_list_jobs))
        .route("/api/v1/jobs/:id", get(jobs::handle_get_job))
        .route("/api/v1/jobs/:id/approve", post(jobs::handle_approve))
        .route("/api/v1/jobs/:id/unapprove", post(jobs::handle_unapprove))
        .route("/api/v1/jobs/:id/retry", post(jobs::handle_retry))
        .route("/api/v1/stats", get(jobs::handle_stats))
        .route("/api/v1/export", post(jobs::handle_export))
        // Batches
        .route(
            "/api/v1/batches",
            get(batches::handle_list_batches).post(batches::handle_start_batch),
        )
        // Settings
        .route(
            "/api/v1/settings/filter-criteria",
            get(settings::handle_get_criteria).put(settings::handle_put_criteria),
        )
        .route("/api/v1/config", get(settings::handle_get_config))
        .with_state(state)
}
