use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Preparation status of a ledger row. Only ever moves to `next()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobStatus {
    New,
    Filtered,
    ResumeReady,
    ContactFound,
    EmailReady,
    Exported,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::New,
        JobStatus::Filtered,
        JobStatus::ResumeReady,
        JobStatus::ContactFound,
        JobStatus::EmailReady,
        JobStatus::Exported,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Filtered => "filtered",
            JobStatus::ResumeReady => "resume_ready",
            JobStatus::ContactFound => "contact_found",
            JobStatus::EmailReady => "email_ready",
            JobStatus::Exported => "exported",
        }
    }

    /// The only status this one may advance to.
    pub fn next(&self) -> Option<JobStatus> {
        match self {
            JobStatus::New => Some(JobStatus::Filtered),
            JobStatus::Filtered => Some(JobStatus::ResumeReady),
            JobStatus::ResumeReady => Some(JobStatus::ContactFound),
            JobStatus::ContactFound => Some(JobStatus::EmailReady),
            JobStatus::EmailReady => Some(JobStatus::Exported),
            JobStatus::Exported => None,
        }
    }

    /// Statuses the batch pipeline still has work for.
    pub fn is_pipeline_pending(&self) -> bool {
        *self < JobStatus::EmailReady
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim().to_ascii_lowercase().replace('-', "_"))
            .ok_or_else(|| format!("unknown job status '{s}'"))
    }
}

/// Relevance filter decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Verdict {
    Accept,
    Reject,
    Maybe,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accept => "accept",
            Verdict::Reject => "reject",
            Verdict::Maybe => "maybe",
        }
    }

    /// Lenient mapping for model output; anything unrecognised is `Maybe`.
    pub fn from_label(label: &str) -> Verdict {
        match label.trim().to_ascii_lowercase().as_str() {
            "accept" | "accepted" | "yes" | "apply" => Verdict::Accept,
            "reject" | "rejected" | "no" | "skip" => Verdict::Reject,
            _ => Verdict::Maybe,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: i64,
    pub url: String,
    pub external_id: Option<String>,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub description: String,
    pub salary_range: Option<String>,
    pub employment_type: Option<String>,
    pub experience_level: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub source_feed: Option<String>,
    pub status: JobStatus,
    pub verdict: Option<Verdict>,
    pub verdict_confidence: Option<f64>,
    pub verdict_reasoning: Option<String>,
    pub resume_id: Option<i64>,
    pub contact_id: Option<i64>,
    pub email_id: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub exported_at: Option<DateTime<Utc>>,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRow {
    pub fn is_approved(&self) -> bool {
        self.approved_at.is_some()
    }

    pub fn is_rejected(&self) -> bool {
        self.verdict == Some(Verdict::Reject)
    }
}

/// A posting as parsed from a feed, before it has a ledger id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub url: String,
    pub external_id: Option<String>,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub description: String,
    pub salary_range: Option<String>,
    pub employment_type: Option<String>,
    pub experience_level: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub source_feed: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_chain_is_linear() {
        let mut status = JobStatus::New;
        let mut seen = vec![status];
        while let Some(next) = status.next() {
            assert!(next > status);
            seen.push(next);
            status = next;
        }
        assert_eq!(seen, JobStatus::ALL.to_vec());
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("resume-ready".parse::<JobStatus>(), Ok(JobStatus::ResumeReady));
        assert_eq!("EMAIL_READY".parse::<JobStatus>(), Ok(JobStatus::EmailReady));
        assert!("archived".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_pipeline_pending() {
        assert!(JobStatus::ContactFound.is_pipeline_pending());
        assert!(!JobStatus::EmailReady.is_pipeline_pending());
        assert!(!JobStatus::Exported.is_pipeline_pending());
    }

    #[test]
    fn test_verdict_from_label() {
        assert_eq!(Verdict::from_label(" Accept "), Verdict::Accept);
        assert_eq!(Verdict::from_label("rejected"), Verdict::Reject);
        assert_eq!(Verdict::from_label("unsure"), Verdict::Maybe);
    }
}
