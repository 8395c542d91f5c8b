//! Ledger: every read and write of the `jobs` table.
//!
//! Two rules live here and nowhere else:
//! - a posting URL is recorded at most once (insert is a no-op on conflict)
//! - `status` only moves to `JobStatus::next()`, and the write is a
//!   compare-and-set on the expected current status.

pub mod artifacts;
pub mod batches;
pub mod settings;

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::errors::AppError;
use crate::models::{JobPosting, JobRow, JobStatus, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    Duplicate,
}

/// Query options for `list_jobs`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub company: Option<String>,
    pub min_confidence: Option<f64>,
    pub approved: Option<bool>,
    pub limit: Option<i64>,
}

/// Status counts for the dashboard.
#[derive(Debug, Default, Clone, Serialize)]
pub struct LedgerStats {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub rejected: i64,
    pub approved: i64,
    pub awaiting_approval: i64,
    pub with_errors: i64,
}

/// Records a posting. A URL that is already in the ledger is reported as a
/// duplicate and leaves the existing row untouched.
pub async fn insert_job(pool: &SqlitePool, posting: &JobPosting) -> Result<InsertOutcome, AppError> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO jobs
            (url, external_id, title, company, location, description, salary_range,
             employment_type, experience_level, posted_at, source_feed, status,
             created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'new', ?, ?)
        ON CONFLICT(url) DO NOTHING
        "#,
    )
    .bind(&posting.url)
    .bind(&posting.external_id)
    .bind(&posting.title)
    .bind(&posting.company)
    .bind(&posting.location)
    .bind(&posting.description)
    .bind(&posting.salary_range)
    .bind(&posting.employment_type)
    .bind(&posting.experience_level)
    .bind(posting.posted_at)
    .bind(&posting.source_feed)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        debug!("Duplicate posting skipped: {}", posting.url);
        return Ok(InsertOutcome::Duplicate);
    }
    Ok(InsertOutcome::Inserted(result.last_insert_rowid()))
}

pub async fn get_job(pool: &SqlitePool, id: i64) -> Result<JobRow, AppError> {
    sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))
}

pub async fn list_jobs(pool: &SqlitePool, filter: &JobFilter) -> Result<Vec<JobRow>, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM jobs WHERE 1 = 1");

    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(company) = filter.company.as_deref().filter(|c| !c.is_empty()) {
        qb.push(" AND company LIKE ")
            .push_bind(format!("%{company}%"));
    }
    if let Some(min) = filter.min_confidence {
        qb.push(" AND verdict_confidence >= ").push_bind(min);
    }
    match filter.approved {
        Some(true) => {
            qb.push(" AND approved_at IS NOT NULL");
        }
        Some(false) => {
            qb.push(" AND approved_at IS NULL");
        }
        None => {}
    }
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(filter.limit.unwrap_or(200).clamp(1, 1000));

    Ok(qb.build_query_as::<JobRow>().fetch_all(pool).await?)
}

/// Jobs the batch pipeline still has work for, oldest first.
/// Rejected jobs and jobs that exhausted their attempts are excluded.
pub async fn pending_jobs(
    pool: &SqlitePool,
    max_attempts: i64,
    limit: i64,
) -> Result<Vec<JobRow>, AppError> {
    let pending: Vec<&str> = JobStatus::ALL
        .iter()
        .filter(|s| s.is_pipeline_pending())
        .map(|s| s.as_str())
        .collect();
    Ok(sqlx::query_as::<_, JobRow>(
        r#"
        SELECT * FROM jobs
        WHERE status IN (SELECT value FROM json_each(?))
          AND (verdict IS NULL OR verdict != 'reject')
          AND attempts < ?
        ORDER BY created_at ASC, id ASC
        LIMIT ?
        "#,
    )
    .bind(Json(pending))
    .bind(max_attempts)
    .bind(limit)
    .fetch_all(pool)
    .await?)
}

/// Approved jobs whose email is drafted and which have not been exported yet.
pub async fn exportable_jobs(pool: &SqlitePool) -> Result<Vec<JobRow>, AppError> {
    Ok(sqlx::query_as::<_, JobRow>(
        "SELECT * FROM jobs WHERE status = 'email_ready' AND approved_at IS NOT NULL ORDER BY id",
    )
    .fetch_all(pool)
    .await?)
}

/// Records a filter verdict and advances `new -> filtered`.
pub async fn record_verdict(
    pool: &SqlitePool,
    id: i64,
    verdict: Verdict,
    confidence: f64,
    reasoning: &str,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE jobs SET verdict = ?, verdict_confidence = ?, verdict_reasoning = ? WHERE id = ? AND status = 'new'",
    )
    .bind(verdict)
    .bind(confidence)
    .bind(reasoning)
    .bind(id)
    .execute(&mut *tx)
    .await?;
    complete_step(&mut tx, id, JobStatus::New, None).await?;
    tx.commit().await?;
    Ok(())
}

/// Advances `id` from `from` to `from.next()`, optionally linking an artifact
/// column in the same statement. Fails without writing if the row is not
/// currently at `from`. Clears failure bookkeeping on success.
pub(crate) async fn complete_step(
    conn: &mut SqliteConnection,
    id: i64,
    from: JobStatus,
    link: Option<(&'static str, i64)>,
) -> Result<JobStatus, AppError> {
    let to = from.next().ok_or_else(|| AppError::InvalidTransition {
        job_id: id,
        expected: from.to_string(),
        found: from.to_string(),
    })?;

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE jobs SET status = ");
    qb.push_bind(to);
    if let Some((column, value)) = link {
        qb.push(format!(", {column} = ")).push_bind(value);
    }
    if to == JobStatus::Exported {
        qb.push(", exported_at = ").push_bind(Utc::now());
    }
    qb.push(", attempts = 0, last_error = NULL, updated_at = ")
        .push_bind(Utc::now())
        .push(" WHERE id = ")
        .push_bind(id)
        .push(" AND status = ")
        .push_bind(from);
    if from == JobStatus::Filtered {
        qb.push(" AND (verdict IS NULL OR verdict != 'reject')");
    }
    if to == JobStatus::Exported {
        qb.push(" AND approved_at IS NOT NULL");
    }

    let result = qb.build().execute(&mut *conn).await?;
    if result.rows_affected() == 1 {
        info!(job_id = id, "Job advanced {from} -> {to}");
        return Ok(to);
    }

    let current: Option<(JobStatus, Option<Verdict>, bool)> =
        sqlx::query_as("SELECT status, verdict, approved_at IS NOT NULL FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
    match current {
        None => Err(AppError::NotFound(format!("Job {id} not found"))),
        Some((status, _, _)) if status != from => Err(AppError::InvalidTransition {
            job_id: id,
            expected: from.to_string(),
            found: status.to_string(),
        }),
        Some((_, Some(Verdict::Reject), _)) => Err(AppError::Conflict(format!(
            "Job {id} was rejected by the filter"
        ))),
        Some((_, _, false)) => Err(AppError::Conflict(format!("Job {id} is not approved"))),
        Some(_) => Err(AppError::Conflict(format!("Job {id} could not be advanced"))),
    }
}

/// Marks an approved `email_ready` job as exported.
pub async fn mark_exported(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    let mut conn = pool.acquire().await?;
    complete_step(&mut conn, id, JobStatus::EmailReady, None).await?;
    Ok(())
}

/// Records a failed step. The status is left where it was.
pub async fn record_failure(pool: &SqlitePool, id: i64, error: &str) -> Result<i64, AppError> {
    let attempts: Option<i64> = sqlx::query_scalar(
        "UPDATE jobs SET attempts = attempts + 1, last_error = ?, updated_at = ? WHERE id = ? RETURNING attempts",
    )
    .bind(error)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await?;
    attempts.ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))
}

/// Clears failure bookkeeping so the pipeline picks the job up again.
pub async fn reset_attempts(pool: &SqlitePool, id: i64) -> Result<JobRow, AppError> {
    let result = sqlx::query("UPDATE jobs SET attempts = 0, last_error = NULL, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Job {id} not found")));
    }
    get_job(pool, id).await
}

/// Human approval. Only a drafted (`email_ready`) job can be approved, and an
/// exported job can no longer be unapproved. The status guard is part of the
/// UPDATE, so approval cannot race a concurrent status change.
pub async fn set_approval(pool: &SqlitePool, id: i64, approved: bool) -> Result<JobRow, AppError> {
    let now = Utc::now();
    let result = if approved {
        sqlx::query("UPDATE jobs SET approved_at = ?, updated_at = ? WHERE id = ? AND status = 'email_ready'")
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?
    } else {
        sqlx::query("UPDATE jobs SET approved_at = NULL, updated_at = ? WHERE id = ? AND status != 'exported'")
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?
    };

    if result.rows_affected() == 0 {
        let job = get_job(pool, id).await?;
        return Err(if approved {
            AppError::Conflict(format!(
                "Job {id} is '{}'; only email_ready jobs can be approved",
                job.status
            ))
        } else {
            AppError::Conflict(format!("Job {id} is already exported"))
        });
    }
    info!(job_id = id, approved, "Approval updated");
    get_job(pool, id).await
}

pub async fn stats(pool: &SqlitePool) -> Result<LedgerStats, AppError> {
    let rows: Vec<(JobStatus, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
            .fetch_all(pool)
            .await?;

    let mut stats = LedgerStats::default();
    for status in JobStatus::ALL {
        stats.by_status.insert(status.to_string(), 0);
    }
    for (status, count) in rows {
        stats.total += count;
        stats.by_status.insert(status.to_string(), count);
    }

    let (rejected, approved, awaiting, with_errors): (i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(verdict = 'reject'), 0),
            COALESCE(SUM(approved_at IS NOT NULL), 0),
            COALESCE(SUM(status = 'email_ready' AND approved_at IS NULL), 0),
            COALESCE(SUM(last_error IS NOT NULL), 0)
        FROM jobs
        "#,
    )
    .fetch_one(pool)
    .await?;
    stats.rejected = rejected;
    stats.approved = approved;
    stats.awaiting_approval = awaiting;
    stats.with_errors = with_errors;
    Ok(stats)
}
