use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::ledger::batches;
use crate::models::BatchRunRow;
use crate::pipeline::{self, BatchRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BatchListQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/batches
pub async fn handle_list_batches(
    State(state): State<AppState>,
    Query(params): Query<BatchListQuery>,
) -> Result<Json<Vec<BatchRunRow>>, AppError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 200);
    Ok(Json(batches::list_batches(&state.db, limit).await?))
}

/// POST /api/v1/batches
/// Registers the batch, then runs it in the background. A request without a
/// JSON body runs every step without scraping.
pub async fn handle_start_batch(
    State(state): State<AppState>,
    request: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let request = match request {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => BatchRequest::default(),
        Err(rejection) => return Err(AppError::Validation(rejection.body_text())),
    };
    let (batch_id, run_key) = pipeline::start(&state).await?;

    pipeline::spawn(state.clone(), batch_id, run_key.clone(), request);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "batch_id": batch_id, "run_key": run_key, "status": "running" })),
    ))
}
