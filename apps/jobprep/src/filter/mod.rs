//! Relevance filter: decides accept / reject / maybe for each new posting.
//!
//! Hard exclusions (company, keyword, location) are applied locally and never
//! reach the model. Everything else is judged by the LLM against the stored
//! `FilterCriteria`.

pub mod prompts;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::ledger::{self, settings};
use crate::llm_client::prompts::truncate_chars;
use crate::llm_client::{LlmClient, LlmError};
use crate::models::{JobRow, Verdict};

pub const CRITERIA_KEY: &str = "filter_criteria";
const DESCRIPTION_LIMIT: usize = 2000;

/// What the candidate is looking for. Stored as JSON in `settings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub required_skills: Vec<String>,
    pub preferred_skills: Vec<String>,
    pub excluded_skills: Vec<String>,
    pub min_salary: Option<u32>,
    pub max_salary: Option<u32>,
    pub preferred_locations: Vec<String>,
    pub excluded_locations: Vec<String>,
    pub experience_levels: Vec<String>,
    pub employment_types: Vec<String>,
    pub company_preferences: Vec<String>,
    pub excluded_companies: Vec<String>,
    pub keywords_include: Vec<String>,
    pub keywords_exclude: Vec<String>,
    /// "required", "preferred", "no_preference" or "not_preferred".
    pub remote_preference: Option<String>,
}

impl FilterCriteria {
    pub fn validate(&self) -> Result<(), AppError> {
        if let (Some(min), Some(max)) = (self.min_salary, self.max_salary) {
            if min > max {
                return Err(AppError::Validation(format!(
                    "min_salary ({min}) is greater than max_salary ({max})"
                )));
            }
        }
        if let Some(pref) = &self.remote_preference {
            if !["required", "preferred", "no_preference", "not_preferred"].contains(&pref.as_str()) {
                return Err(AppError::Validation(format!("Unknown remote_preference '{pref}'")));
            }
        }
        Ok(())
    }
}

/// Filter decision with the evidence behind it.
#[derive(Debug, Clone, Serialize)]
pub struct FilterOutcome {
    pub verdict: Verdict,
    pub confidence: f64,
    pub reasoning: String,
    pub matched_criteria: Vec<String>,
    pub concerns: Vec<String>,
    pub salary_match: Option<bool>,
    pub location_match: Option<bool>,
    pub skills_match_score: Option<f64>,
    pub overall_score: Option<f64>,
    /// "rules" for local exclusions, "llm" otherwise.
    pub decided_by: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct LlmAssessment {
    decision: String,
    confidence_score: f64,
    reasoning: String,
    matched_criteria: Vec<String>,
    concerns: Vec<String>,
    salary_match: Option<bool>,
    location_match: Option<bool>,
    skills_match_score: Option<f64>,
    overall_score: Option<f64>,
}

impl Default for LlmAssessment {
    fn default() -> Self {
        Self {
            decision: "maybe".into(),
            confidence_score: 0.5,
            reasoning: String::new(),
            matched_criteria: Vec::new(),
            concerns: Vec::new(),
            salary_match: None,
            location_match: None,
            skills_match_score: None,
            overall_score: None,
        }
    }
}

pub async fn load_criteria(pool: &SqlitePool) -> Result<FilterCriteria, AppError> {
    Ok(settings::get_setting(pool, CRITERIA_KEY)
        .await?
        .unwrap_or_default())
}

pub async fn save_criteria(pool: &SqlitePool, criteria: &FilterCriteria) -> Result<(), AppError> {
    criteria.validate()?;
    settings::put_setting(pool, CRITERIA_KEY, criteria).await
}

/// Local hard exclusions. Returns a reject outcome when one applies.
pub fn precheck(job: &JobRow, criteria: &FilterCriteria) -> Option<FilterOutcome> {
    let company = job.company.to_lowercase();
    let text = format!("{} {}", job.title, job.description).to_lowercase();
    let location = job.location.as_deref().unwrap_or_default().to_lowercase();

    let reason = criteria
        .excluded_companies
        .iter()
        .find(|c| !c.trim().is_empty() && company.contains(&c.trim().to_lowercase()))
        .map(|c| format!("Company '{}' is excluded", c.trim()))
        .or_else(|| {
            criteria
                .keywords_exclude
                .iter()
                .find(|k| !k.trim().is_empty() && text.contains(&k.trim().to_lowercase()))
                .map(|k| format!("Posting mentions excluded keyword '{}'", k.trim()))
        })
        .or_else(|| {
            criteria
                .excluded_locations
                .iter()
                .find(|l| !l.trim().is_empty() && location.contains(&l.trim().to_lowercase()))
                .map(|l| format!("Location '{}' is excluded", l.trim()))
        })?;

    Some(FilterOutcome {
        verdict: Verdict::Reject,
        confidence: 1.0,
        reasoning: reason.clone(),
        matched_criteria: Vec::new(),
        concerns: vec![reason],
        salary_match: None,
        location_match: None,
        skills_match_score: None,
        overall_score: None,
        decided_by: "rules",
    })
}

/// Judges one posting. Errors only when the model call itself fails.
pub async fn evaluate(
    job: &JobRow,
    criteria: &FilterCriteria,
    llm: &LlmClient,
) -> Result<FilterOutcome, LlmError> {
    if let Some(outcome) = precheck(job, criteria) {
        return Ok(outcome);
    }

    let prompt = build_prompt(job, criteria);
    let assessment: LlmAssessment = llm.call_json(&prompt, prompts::FILTER_SYSTEM).await?;

    Ok(FilterOutcome {
        verdict: Verdict::from_label(&assessment.decision),
        confidence: clamp_unit(assessment.confidence_score),
        reasoning: if assessment.reasoning.trim().is_empty() {
            "No reasoning provided".to_string()
        } else {
            assessment.reasoning
        },
        matched_criteria: assessment.matched_criteria,
        concerns: assessment.concerns,
        salary_match: assessment.salary_match,
        location_match: assessment.location_match,
        skills_match_score: assessment.skills_match_score.map(clamp_unit),
        overall_score: assessment.overall_score.map(clamp_unit),
        decided_by: "llm",
    })
}

/// Runs the filter step for a `new` job and records the verdict.
#[instrument(skip_all, fields(job_id = job.id))]
pub async fn filter_job(
    pool: &SqlitePool,
    llm: &LlmClient,
    job: &JobRow,
    criteria: &FilterCriteria,
) -> Result<FilterOutcome, AppError> {
    let outcome = evaluate(job, criteria, llm).await?;
    ledger::record_verdict(pool, job.id, outcome.verdict, outcome.confidence, &summary(&outcome))
        .await?;
    info!(
        "Filtered '{}' at {}: {} ({:.2}, {})",
        job.title, job.company, outcome.verdict, outcome.confidence, outcome.decided_by
    );
    Ok(outcome)
}

fn build_prompt(job: &JobRow, criteria: &FilterCriteria) -> String {
    let or_na = |v: &Option<String>| v.clone().unwrap_or_else(|| "N/A".to_string());
    let salary_bounds = format!(
        "{} - {}",
        criteria
            .min_salary
            .map_or("No min".to_string(), |v| format!("${v}")),
        criteria
            .max_salary
            .map_or("No max".to_string(), |v| format!("${v}")),
    );

    prompts::FILTER_PROMPT
        .replace("{title}", &job.title)
        .replace("{company}", &job.company)
        .replace("{location}", &or_na(&job.location))
        .replace("{employment_type}", &or_na(&job.employment_type))
        .replace("{experience_level}", &or_na(&job.experience_level))
        .replace("{salary_range}", &or_na(&job.salary_range))
        .replace("{required_skills}", &list_or(&criteria.required_skills, "None"))
        .replace("{preferred_skills}", &list_or(&criteria.preferred_skills, "None"))
        .replace("{excluded_skills}", &list_or(&criteria.excluded_skills, "None"))
        .replace("{salary_bounds}", &salary_bounds)
        .replace("{preferred_locations}", &list_or(&criteria.preferred_locations, "Any"))
        .replace("{excluded_locations}", &list_or(&criteria.excluded_locations, "None"))
        .replace("{experience_levels}", &list_or(&criteria.experience_levels, "Any"))
        .replace("{employment_types}", &list_or(&criteria.employment_types, "Any"))
        .replace("{company_preferences}", &list_or(&criteria.company_preferences, "Any"))
        .replace("{keywords_include}", &list_or(&criteria.keywords_include, "None"))
        .replace(
            "{remote_preference}",
            criteria.remote_preference.as_deref().unwrap_or("No preference"),
        )
        // last, so placeholders inside the posting text are left alone
        .replace("{description}", &truncate_chars(&job.description, DESCRIPTION_LIMIT))
}

fn list_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// One-line reasoning stored on the ledger row.
fn summary(outcome: &FilterOutcome) -> String {
    if outcome.concerns.is_empty() || outcome.decided_by == "rules" {
        outcome.reasoning.clone()
    } else {
        format!("{} Concerns: {}", outcome.reasoning, outcome.concerns.join("; "))
    }
}
