//! Batch orchestrator: moves pending jobs through the preparation steps.
//!
//! Each job runs its remaining steps in order until it reaches
//! `email_ready`. The first failing step stops that job, is recorded on its
//! row, and the batch moves on to the next job.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::contacts;
use crate::email;
use crate::errors::AppError;
use crate::feed::{self, ScrapeReport};
use crate::filter::{self, FilterCriteria};
use crate::ledger::{self, batches, batches::BatchCounters};
use crate::models::{JobRow, JobStatus, Verdict};
use crate::resume::{self, ResumeDocument};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Filter,
    Customize,
    Contact,
    Email,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Filter => "filter",
            Step::Customize => "customize",
            Step::Contact => "contact",
            Step::Email => "email",
        }
    }

    /// The step that moves a job out of `status`.
    pub fn for_status(status: JobStatus) -> Option<Step> {
        match status {
            JobStatus::New => Some(Step::Filter),
            JobStatus::Filtered => Some(Step::Customize),
            JobStatus::ResumeReady => Some(Step::Contact),
            JobStatus::ContactFound => Some(Step::Email),
            JobStatus::EmailReady | JobStatus::Exported => None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Which steps a batch may run. All enabled by default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepToggles {
    #[serde(default = "default_true")]
    pub filter: bool,
    #[serde(default = "default_true")]
    pub customize: bool,
    #[serde(default = "default_true")]
    pub contact: bool,
    #[serde(default = "default_true")]
    pub email: bool,
}

impl Default for StepToggles {
    fn default() -> Self {
        Self {
            filter: true,
            customize: true,
            contact: true,
            email: true,
        }
    }
}

impl StepToggles {
    pub fn enabled(&self, step: Step) -> bool {
        match step {
            Step::Filter => self.filter,
            Step::Customize => self.customize,
            Step::Contact => self.contact,
            Step::Email => self.email,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Pull the configured searches into the ledger first.
    #[serde(default)]
    pub scrape: bool,
    /// Overrides `MAX_JOBS_PER_BATCH`.
    #[serde(default)]
    pub max_jobs: Option<usize>,
    #[serde(default)]
    pub steps: StepToggles,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub batch_id: i64,
    pub run_key: String,
    pub status: String,
    pub scrape: Option<ScrapeReport>,
    pub jobs_processed: usize,
    /// Jobs that completed at least one step.
    pub jobs_advanced: usize,
    pub jobs_failed: usize,
    pub jobs_rejected: usize,
    pub jobs_email_ready: usize,
    pub errors: Vec<String>,
}

/// Registers a new running batch. Refuses while another batch is running.
pub async fn start(state: &AppState) -> Result<(i64, String), AppError> {
    let run_key = format!(
        "{}-{}",
        Utc::now().format("%Y%m%d-%H%M%S"),
        &Uuid::new_v4().simple().to_string()[..8]
    );
    let id = batches::start_batch(&state.db, &run_key).await?;
    info!(batch_id = id, "Batch {run_key} started");
    Ok((id, run_key))
}

/// Starts and runs a batch to completion.
pub async fn run_batch(state: &AppState, request: BatchRequest) -> Result<BatchReport, AppError> {
    let (id, run_key) = start(state).await?;
    execute(state, id, run_key, request).await
}

/// Runs an already started batch in the background.
pub fn spawn(state: AppState, batch_id: i64, run_key: String, request: BatchRequest) -> JoinHandle<()> {
    let db = state.db.clone();
    supervise(db, batch_id, async move { execute(&state, batch_id, run_key, request).await })
}

/// Drives a batch task to completion. If the task errors before recording its
/// outcome, or panics, the batch row is failed so it stops blocking new runs.
pub fn supervise<F>(db: SqlitePool, batch_id: i64, run: F) -> JoinHandle<()>
where
    F: Future<Output = Result<BatchReport, AppError>> + Send + 'static,
{
    tokio::spawn(async move {
        let failure = match tokio::spawn(run).await {
            Ok(Ok(_)) => return,
            Ok(Err(e)) => e.to_string(),
            Err(e) if e.is_panic() => "batch task panicked".to_string(),
            Err(e) => format!("batch task stopped: {e}"),
        };
        error!(batch_id, "Background batch failed: {failure}");
        match batches::abandon_batch(&db, batch_id, &failure).await {
            Ok(true) => warn!(batch_id, "Batch marked failed"),
            Ok(false) => {}
            Err(e) => error!(batch_id, "Could not mark batch failed: {e}"),
        }
    })
}

/// Runs an already started batch and records its outcome on the batch row.
#[instrument(skip(state, run_key, request))]
pub async fn execute(
    state: &AppState,
    batch_id: i64,
    run_key: String,
    request: BatchRequest,
) -> Result<BatchReport, AppError> {
    let mut report = BatchReport {
        batch_id,
        run_key,
        ..Default::default()
    };

    let outcome = process(state, &request, &mut report).await;
    if let Err(e) = &outcome {
        error!("Batch aborted: {e}");
        report.errors.push(format!("batch aborted: {e}"));
    }

    report.status = if outcome.is_ok() && (report.errors.is_empty() || report.jobs_advanced > 0) {
        "completed".to_string()
    } else {
        "failed".to_string()
    };
    let counters = BatchCounters {
        jobs_scraped: report.scrape.as_ref().map_or(0, |s| s.scraped as i64),
        jobs_new: report.scrape.as_ref().map_or(0, |s| s.inserted as i64),
        jobs_advanced: report.jobs_advanced as i64,
        jobs_failed: report.jobs_failed as i64,
    };
    batches::finish_batch(&state.db, batch_id, &report.status, &counters, &report.errors).await?;

    info!(
        "Batch {} {}: {} processed, {} advanced, {} failed, {} rejected, {} ready for review",
        report.run_key,
        report.status,
        report.jobs_processed,
        report.jobs_advanced,
        report.jobs_failed,
        report.jobs_rejected,
        report.jobs_email_ready
    );
    outcome.map(|_| report)
}

async fn process(state: &AppState, request: &BatchRequest, report: &mut BatchReport) -> Result<(), AppError> {
    let config = &state.config;
    let max_jobs = request
        .max_jobs
        .unwrap_or(config.scrape.max_jobs_per_batch)
        .max(1);

    if request.scrape {
        let scrape = feed::scrape_into_ledger(&state.db, &state.reader, &config.scrape.searches, max_jobs).await?;
        report.errors.extend(scrape.errors.iter().map(|e| format!("scrape: {e}")));
        report.scrape = Some(scrape);
    }

    let mut steps = request.steps;
    let criteria = if steps.filter {
        filter::load_criteria(&state.db).await?
    } else {
        FilterCriteria::default()
    };
    // A missing base resume is a setup problem, not a job failure.
    let base_resume = if steps.customize {
        match resume::load_base_resume(&config.paths.base_resume).await {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("Skipping resume customization: {e}");
                report.errors.push(format!("base resume: {e}"));
                steps.customize = false;
                None
            }
        }
    } else {
        None
    };

    let jobs = ledger::pending_jobs(&state.db, config.pipeline.max_attempts, max_jobs as i64).await?;
    info!("{} pending jobs", jobs.len());
    let delay = Duration::try_from_secs_f64(config.scrape.delay_seconds).unwrap_or_default();

    for (i, job) in jobs.into_iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        report.jobs_processed += 1;
        let outcome = advance_job(state, job, &steps, &criteria, base_resume.as_ref()).await?;
        if outcome.steps_completed > 0 {
            report.jobs_advanced += 1;
        }
        match outcome.status {
            JobStatus::EmailReady => report.jobs_email_ready += 1,
            _ if outcome.rejected => report.jobs_rejected += 1,
            _ => {}
        }
        if let Some(failure) = outcome.failure {
            report.jobs_failed += 1;
            report.errors.push(failure);
        }
    }
    Ok(())
}

struct JobOutcome {
    status: JobStatus,
    steps_completed: usize,
    rejected: bool,
    failure: Option<String>,
}

/// Runs the job's remaining enabled steps. Step errors are recorded on the
/// row and reported in the outcome; only ledger errors are returned.
async fn advance_job(
    state: &AppState,
    mut job: JobRow,
    steps: &StepToggles,
    criteria: &FilterCriteria,
    base_resume: Option<&ResumeDocument>,
) -> Result<JobOutcome, AppError> {
    let mut outcome = JobOutcome {
        status: job.status,
        steps_completed: 0,
        rejected: job.is_rejected(),
        failure: None,
    };

    while let Some(step) = Step::for_status(job.status) {
        if !steps.enabled(step) || outcome.rejected {
            break;
        }
        let result = run_step(state, &job, step, criteria, base_resume).await;
        if let Err(e) = result {
            let message = e.to_string();
            let attempts = ledger::record_failure(&state.db, job.id, &message).await?;
            warn!(job_id = job.id, attempts, "Step {} failed: {message}", step.as_str());
            outcome.failure = Some(format!("job {} {}: {message}", job.id, step.as_str()));
            break;
        }
        outcome.steps_completed += 1;
        job = ledger::get_job(&state.db, job.id).await?;
        outcome.status = job.status;
        outcome.rejected = job.verdict == Some(Verdict::Reject);
    }
    Ok(outcome)
}

async fn run_step(
    state: &AppState,
    job: &JobRow,
    step: Step,
    criteria: &FilterCriteria,
    base_resume: Option<&ResumeDocument>,
) -> Result<(), AppError> {
    match step {
        Step::Filter => {
            filter::filter_job(&state.db, &state.llm, job, criteria).await?;
        }
        Step::Customize => {
            let base = base_resume.ok_or_else(|| AppError::Validation("No base resume loaded".into()))?;
            resume::customize_job(&state.db, &state.llm, job, base).await?;
        }
        Step::Contact => {
            contacts::find_contact_for_job(&state.db, &state.finder, job).await?;
        }
        Step::Email => {
            email::compose_for_job(&state.db, &state.llm, &state.config, job).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{get_job, insert_job, InsertOutcome};
    use crate::llm_client::LlmClient;
    use crate::test_support::{failing_llm, llm_stub, posting, test_state};
    use std::io::Write;

    const BASE: &str = "# Ada Example
ada@example.dev

## Summary
Backend engineer.

## Experience
### Engineer — Initrode
- Built a Rust ingestion service

## Skills
- **Languages:** Rust, Go
";

    fn respond(prompt: &str) -> String {
        if prompt.contains("decide whether the candidate should apply") {
            let verdict = if prompt.contains("Company: Globex") { "reject" } else { "accept" };
            format!(r#"{{"decision": "{verdict}", "confidence_score": 0.9, "reasoning": "checked"}}"#)
        } else if prompt.contains("plan a resume customization") {
            r#"{"key_skills_to_emphasize": ["Rust"], "strategy": "Lead with Rust.", "confidence": 0.8}"#.to_string()
        } else if prompt.contains("Rewrite parts of this resume") {
            r#"{"summary": "Rust backend engineer.", "experience": []}"#.to_string()
        } else {
            r#"{"personalized_introduction": "Hello from the model."}"#.to_string()
        }
    }

    async fn state_with(llm: LlmClient, resume: &std::path::Path) -> AppState {
        let resume_path = resume.display().to_string();
        test_state(llm, &[("BASE_RESUME_PATH", resume_path.as_str())]).await
    }

    fn base_resume_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
        file.write_all(BASE.as_bytes()).unwrap();
        file
    }

    async fn add(state: &AppState, url: &str, company: &str) -> i64 {
        match insert_job(&state.db, &posting(url, "Rust Engineer", company)).await.unwrap() {
            InsertOutcome::Inserted(id) => id,
            InsertOutcome::Duplicate => panic!("duplicate"),
        }
    }

    #[tokio::test]
    async fn test_batch_takes_jobs_to_email_ready() {
        let resume = base_resume_file();
        let state = state_with(llm_stub(respond).await, resume.path()).await;
        let acme = add(&state, "https://example.com/1", "Acme").await;
        let globex = add(&state, "https://example.com/2", "Globex").await;

        let report = run_batch(&state, BatchRequest::default()).await.unwrap();
        assert_eq!(report.status, "completed");
        assert_eq!(report.jobs_processed, 2);
        assert_eq!(report.jobs_advanced, 2);
        assert_eq!(report.jobs_email_ready, 1);
        assert_eq!(report.jobs_rejected, 1);
        assert_eq!(report.jobs_failed, 0);

        let acme = get_job(&state.db, acme).await.unwrap();
        assert_eq!(acme.status, JobStatus::EmailReady);
        assert!(acme.resume_id.is_some() && acme.contact_id.is_some() && acme.email_id.is_some());
        let globex = get_job(&state.db, globex).await.unwrap();
        assert_eq!(globex.status, JobStatus::Filtered);
        assert_eq!(globex.verdict, Some(Verdict::Reject));

        let batch = &batches::list_batches(&state.db, 5).await.unwrap()[0];
        assert_eq!(batch.status, "completed");
        assert_eq!(batch.jobs_advanced, 2);
        assert!(batch.completed_at.is_some());
        assert!(!batches::batch_in_progress(&state.db).await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_step_is_recorded_and_retried_later() {
        let resume = base_resume_file();
        let state = state_with(failing_llm().await, resume.path()).await;
        let id = add(&state, "https://example.com/1", "Acme").await;

        let report = run_batch(&state, BatchRequest::default()).await.unwrap();
        assert_eq!(report.status, "failed");
        assert_eq!(report.jobs_failed, 1);
        assert!(report.errors[0].starts_with(&format!("job {id} filter:")));

        let job = get_job(&state.db, id).await.unwrap();
        assert_eq!(job.status, JobStatus::New);
        assert_eq!(job.attempts, 1);
        assert!(job.last_error.is_some());
    }

    #[tokio::test]
    async fn test_exhausted_jobs_are_skipped() {
        let resume = base_resume_file();
        let state = state_with(failing_llm().await, resume.path()).await;
        let id = add(&state, "https://example.com/1", "Acme").await;
        for _ in 0..state.config.pipeline.max_attempts {
            ledger::record_failure(&state.db, id, "boom").await.unwrap();
        }

        let report = run_batch(&state, BatchRequest::default()).await.unwrap();
        assert_eq!(report.jobs_processed, 0);
        assert_eq!(report.status, "completed");
    }

    #[tokio::test]
    async fn test_disabled_steps_stop_early() {
        let resume = base_resume_file();
        let state = state_with(llm_stub(respond).await, resume.path()).await;
        let id = add(&state, "https://example.com/1", "Acme").await;

        let request = BatchRequest {
            steps: StepToggles {
                contact: false,
                ..Default::default()
            },
            ..Default::default()
        };
        run_batch(&state, request).await.unwrap();
        assert_eq!(get_job(&state.db, id).await.unwrap().status, JobStatus::ResumeReady);
    }

    #[tokio::test]
    async fn test_missing_base_resume_skips_customization() {
        let state = state_with(llm_stub(respond).await, std::path::Path::new("/nonexistent/base.md")).await;
        let id = add(&state, "https://example.com/1", "Acme").await;

        let report = run_batch(&state, BatchRequest::default()).await.unwrap();
        assert_eq!(report.jobs_failed, 0);
        assert!(report.errors.iter().any(|e| e.starts_with("base resume:")));
        let job = get_job(&state.db, id).await.unwrap();
        assert_eq!(job.status, JobStatus::Filtered);
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test]
    async fn test_aborted_batch_is_finished_as_failed() {
        let resume = base_resume_file();
        let state = state_with(llm_stub(respond).await, resume.path()).await;
        let (id, run_key) = start(&state).await.unwrap();
        sqlx::query("DROP TABLE emails").execute(&state.db).await.unwrap();
        sqlx::query("DROP TABLE contacts").execute(&state.db).await.unwrap();
        sqlx::query("DROP TABLE resumes").execute(&state.db).await.unwrap();
        sqlx::query("DROP TABLE jobs").execute(&state.db).await.unwrap();

        spawn(state.clone(), id, run_key, BatchRequest::default()).await.unwrap();

        let batch = &batches::list_batches(&state.db, 1).await.unwrap()[0];
        assert_eq!(batch.status, "failed");
        assert!(batch.error_log.0.iter().any(|e| e.starts_with("batch aborted:")));
        assert!(start(&state).await.is_ok());
    }

    #[tokio::test]
    async fn test_panicking_batch_task_releases_the_lock() {
        let resume = base_resume_file();
        let state = state_with(llm_stub(respond).await, resume.path()).await;
        let (id, _) = start(&state).await.unwrap();

        let explode = true;
        supervise(state.db.clone(), id, async move {
            if explode {
                panic!("step exploded");
            }
            Ok(BatchReport::default())
        })
        .await
        .unwrap();

        let batch = &batches::list_batches(&state.db, 1).await.unwrap()[0];
        assert_eq!(batch.status, "failed");
        assert_eq!(batch.error_log.0, vec!["batch task panicked".to_string()]);
        assert!(start(&state).await.is_ok());
    }

    #[tokio::test]
    async fn test_second_batch_refused_while_running() {
        let resume = base_resume_file();
        let state = state_with(llm_stub(respond).await, resume.path()).await;
        start(&state).await.unwrap();
        assert!(matches!(
            run_batch(&state, BatchRequest::default()).await,
            Err(AppError::Conflict(_))
        ));
    }
}
