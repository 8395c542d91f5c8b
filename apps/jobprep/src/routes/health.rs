use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::ledger::batches;
use crate::state::AppState;

/// GET /health
/// Returns service status, version, whether the ledger answers and whether
/// a batch is running.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let (database, batch_running) = match batches::batch_in_progress(&state.db).await {
        Ok(running) => ("ok", Some(running)),
        Err(_) => ("unavailable", None),
    };
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "jobprep",
        "database": database,
        "llm_backend": state.llm.backend_name(),
        "batch_running": batch_running,
    }))
}
