use chrono::Utc;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::errors::AppError;
use crate::models::BatchRunRow;

/// Counters written when a batch finishes.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchCounters {
    pub jobs_scraped: i64,
    pub jobs_new: i64,
    pub jobs_advanced: i64,
    pub jobs_failed: i64,
}

/// Inserts a `running` batch row. The check and the insert are one
/// statement, backed by a partial unique index, so concurrent callers get
/// exactly one row and everyone else a `Conflict`.
pub async fn start_batch(pool: &SqlitePool, run_key: &str) -> Result<i64, AppError> {
    let result = sqlx::query(
        r#"
        INSERT INTO batch_runs (run_key, started_at, status)
        SELECT ?, ?, 'running'
        WHERE NOT EXISTS (SELECT 1 FROM batch_runs WHERE status = 'running')
        "#,
    )
    .bind(run_key)
    .bind(Utc::now())
    .execute(pool)
    .await;

    match result {
        Ok(done) if done.rows_affected() == 1 => Ok(done.last_insert_rowid()),
        Ok(_) => Err(already_running()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(already_running()),
        Err(e) => Err(e.into()),
    }
}

fn already_running() -> AppError {
    AppError::Conflict("A batch is already running".into())
}

pub async fn finish_batch(
    pool: &SqlitePool,
    id: i64,
    status: &str,
    counters: &BatchCounters,
    errors: &[String],
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE batch_runs
        SET completed_at = ?, status = ?, jobs_scraped = ?, jobs_new = ?,
            jobs_advanced = ?, jobs_failed = ?, error_log = ?
        WHERE id = ?
        "#,
    )
    .bind(Utc::now())
    .bind(status)
    .bind(counters.jobs_scraped)
    .bind(counters.jobs_new)
    .bind(counters.jobs_advanced)
    .bind(counters.jobs_failed)
    .bind(Json(errors))
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fails a batch that is still `running`, e.g. after its task panicked.
/// Returns false when the batch had already been finished.
pub async fn abandon_batch(pool: &SqlitePool, id: i64, error: &str) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE batch_runs SET status = 'failed', completed_at = ?, error_log = ? WHERE id = ? AND status = 'running'",
    )
    .bind(Utc::now())
    .bind(Json(vec![error.to_string()]))
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn list_batches(pool: &SqlitePool, limit: i64) -> Result<Vec<BatchRunRow>, AppError> {
    Ok(
        sqlx::query_as::<_, BatchRunRow>("SELECT * FROM batch_runs ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(pool)
            .await?,
    )
}

/// True while any batch is still marked running.
pub async fn batch_in_progress(pool: &SqlitePool) -> Result<bool, AppError> {
    let running: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM batch_runs WHERE status = 'running'")
        .fetch_one(pool)
        .await?;
    Ok(running > 0)
}

/// Marks batches left `running` by a previous process as failed.
pub async fn fail_stale_batches(pool: &SqlitePool) -> Result<u64, AppError> {
    let result = sqlx::query(
        "UPDATE batch_runs SET status = 'failed', completed_at = ? WHERE status = 'running'",
    )
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;

    #[tokio::test]
    async fn test_batch_lifecycle() {
        let pool = memory_pool().await;
        let id = start_batch(&pool, "run-1").await.unwrap();
        assert!(batch_in_progress(&pool).await.unwrap());

        let counters = BatchCounters {
            jobs_scraped: 10,
            jobs_new: 4,
            jobs_advanced: 3,
            jobs_failed: 1,
        };
        finish_batch(&pool, id, "completed", &counters, &["job 2: timeout".to_string()])
            .await
            .unwrap();

        assert!(!batch_in_progress(&pool).await.unwrap());
        let runs = list_batches(&pool, 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, "completed");
        assert_eq!(runs[0].jobs_new, 4);
        assert_eq!(runs[0].error_log.0, vec!["job 2: timeout".to_string()]);
        assert!(runs[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn test_only_one_running_batch() {
        let pool = memory_pool().await;
        let id = start_batch(&pool, "run-1").await.unwrap();
        assert!(matches!(start_batch(&pool, "run-2").await, Err(AppError::Conflict(_))));

        assert!(abandon_batch(&pool, id, "task panicked").await.unwrap());
        assert!(!abandon_batch(&pool, id, "again").await.unwrap());
        let run = &list_batches(&pool, 1).await.unwrap()[0];
        assert_eq!(run.status, "failed");
        assert_eq!(run.error_log.0, vec!["task panicked".to_string()]);

        start_batch(&pool, "run-2").await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_starts_on_file_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
        let pool = crate::db::create_pool(&url).await.unwrap();

        for round in 0..20 {
            let (name_a, name_b) = (format!("a-{round}"), format!("b-{round}"));
            let (a, b) = tokio::join!(start_batch(&pool, &name_a), start_batch(&pool, &name_b));
            assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1, "round {round}");
            assert!(matches!(a.err().or(b.err()), Some(AppError::Conflict(_))));
            fail_stale_batches(&pool).await.unwrap();
        }
        assert_eq!(list_batches(&pool, 100).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_fail_stale_batches() {
        let pool = memory_pool().await;
        start_batch(&pool, "orphan").await.unwrap();
        assert_eq!(fail_stale_batches(&pool).await.unwrap(), 1);
        assert!(!batch_in_progress(&pool).await.unwrap());
        assert_eq!(list_batches(&pool, 1).await.unwrap()[0].status, "failed");
    }
}
