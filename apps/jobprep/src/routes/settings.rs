use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::filter::{self, FilterCriteria};
use crate::state::AppState;

/// GET /api/v1/settings/filter-criteria
pub async fn handle_get_criteria(
    State(state): State<AppState>,
) -> Result<Json<FilterCriteria>, AppError> {
    Ok(Json(filter::load_criteria(&state.db).await?))
}

/// PUT /api/v1/settings/filter-criteria
pub async fn handle_put_criteria(
    State(state): State<AppState>,
    Json(criteria): Json<FilterCriteria>,
) -> Result<Json<FilterCriteria>, AppError> {
    filter::save_criteria(&state.db, &criteria).await?;
    Ok(Json(criteria))
}

/// GET /api/v1/config
/// Secrets are masked.
pub async fn handle_get_config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "config": state.config.masked(),
        "validation": state.config.validate(),
        "contact_sources": state.finder.source_names(),
    }))
}
