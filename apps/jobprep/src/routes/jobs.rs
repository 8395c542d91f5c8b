use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::export::{self, ExportReport};
use crate::ledger::{self, artifacts, JobFilter, LedgerStats};
use crate::models::{ContactRow, EmailRow, JobRow, JobStatus, ResumeRow};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct JobsQuery {
    pub status: Option<String>,
    pub company: Option<String>,
    pub min_score: Option<f64>,
    pub approved: Option<bool>,
    pub limit: Option<i64>,
}

impl JobsQuery {
    fn into_filter(self) -> Result<JobFilter, AppError> {
        let status = self
            .status
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<JobStatus>())
            .transpose()
            .map_err(AppError::Validation)?;
        if let Some(score) = self.min_score {
            if !(0.0..=1.0).contains(&score) {
                return Err(AppError::Validation(format!("min_score {score} is outside 0..1")));
            }
        }
        Ok(JobFilter {
            status,
            company: self.company.filter(|c| !c.trim().is_empty()),
            min_confidence: self.min_score,
            approved: self.approved,
            limit: Some(self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 1000)),
        })
    }
}

#[derive(Serialize)]
pub struct JobDetail {
    pub job: JobRow,
    pub resume: Option<ResumeRow>,
    pub contact: Option<ContactRow>,
    pub email: Option<EmailRow>,
}

/// GET /api/v1/jobs
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobsQuery>,
) -> Result<Json<Vec<JobRow>>, AppError> {
    let jobs = ledger::list_jobs(&state.db, &params.into_filter()?).await?;
    Ok(Json(jobs))
}

/// GET /api/v1/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<JobDetail>, AppError> {
    let job = ledger::get_job(&state.db, id).await?;
    let resume = match job.resume_id {
        Some(rid) => artifacts::get_resume(&state.db, rid).await?,
        None => None,
    };
    let contact = match job.contact_id {
        Some(cid) => artifacts::get_contact(&state.db, cid).await?,
        None => None,
    };
    let email = match job.email_id {
        Some(eid) => artifacts::get_email(&state.db, eid).await?,
        None => None,
    };
    Ok(Json(JobDetail {
        job,
        resume,
        contact,
        email,
    }))
}

/// POST /api/v1/jobs/:id/approve
pub async fn handle_approve(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<JobRow>, AppError> {
    Ok(Json(ledger::set_approval(&state.db, id, true).await?))
}

/// POST /api/v1/jobs/:id/unapprove
pub async fn handle_unapprove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<JobRow>, AppError> {
    Ok(Json(ledger::set_approval(&state.db, id, false).await?))
}

/// POST /api/v1/jobs/:id/retry
/// Clears the failure count so the next batch picks the job up again.
pub async fn handle_retry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<JobRow>, AppError> {
    Ok(Json(ledger::reset_attempts(&state.db, id).await?))
}

/// GET /api/v1/stats
pub async fn handle_stats(State(state): State<AppState>) -> Result<Json<LedgerStats>, AppError> {
    Ok(Json(ledger::stats(&state.db).await?))
}

/// POST /api/v1/export
pub async fn handle_export(State(state): State<AppState>) -> Result<Json<ExportReport>, AppError> {
    let report = export::export_approved(&state.db, &state.config.paths.export_dir).await?;
    Ok(Json(report))
}
