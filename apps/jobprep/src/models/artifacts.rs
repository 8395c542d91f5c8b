use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// A resume customized for one job.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: i64,
    pub job_id: i64,
    pub markdown: String,
    pub skills_emphasized: Json<Vec<String>>,
    pub notes: Option<String>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ContactRow {
    pub id: i64,
    pub job_id: i64,
    pub company: String,
    pub domain: String,
    pub name: Option<String>,
    pub email: String,
    pub title: Option<String>,
    pub source: String,
    pub confidence: f64,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailRow {
    pub id: i64,
    pub job_id: i64,
    pub contact_email: String,
    pub contact_name: Option<String>,
    pub subject: String,
    pub body: String,
    pub template: String,
    pub polished: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BatchRunRow {
    pub id: i64,
    pub run_key: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: String,
    pub jobs_scraped: i64,
    pub jobs_new: i64,
    pub jobs_advanced: i64,
    pub jobs_failed: i64,
    pub error_log: Json<Vec<String>>,
}
