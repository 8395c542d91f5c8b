//! Resume customizer: tailors the base resume to one job.
//!
//! Two model calls: an analysis that picks what to emphasize, then a rewrite
//! of the summary and experience bullets. Skill reordering is done locally so
//! the model can never add a skill the base resume does not list.

pub mod document;
pub mod prompts;

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::ledger::artifacts::{self, NewResume};
use crate::llm_client::prompts::{truncate_chars, TRUTHFULNESS_INSTRUCTION};
use crate::llm_client::{LlmClient, LlmError};
use crate::models::JobRow;

pub use document::ResumeDocument;

const DESCRIPTION_LIMIT: usize = 3000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeAnalysis {
    pub key_skills_to_emphasize: Vec<String>,
    pub experience_to_highlight: Vec<usize>,
    pub summary_focus: String,
    pub strategy: String,
    pub gaps: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RewritePlan {
    summary: String,
    experience: Vec<BulletRewrite>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BulletRewrite {
    index: usize,
    bullets: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomizedResume {
    pub document: ResumeDocument,
    pub markdown: String,
    pub skills_emphasized: Vec<String>,
    pub notes: String,
    pub confidence: f64,
}

/// Loads the base resume from markdown, or from a PDF via text extraction.
pub async fn load_base_resume(path: &Path) -> Result<ResumeDocument, AppError> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    let document = if is_pdf {
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
            .await
            .context("PDF extraction task panicked")?
            .with_context(|| format!("Failed to extract text from {}", path.display()))?;
        ResumeDocument::from_plain_text(&text)
    } else {
        let markdown = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read base resume {}", path.display()))?;
        ResumeDocument::parse(&markdown)
    };

    if document.name.is_empty() && document.experience.is_empty() {
        return Err(AppError::Validation(format!(
            "Base resume {} has no recognizable content",
            path.display()
        )));
    }
    Ok(document)
}

/// Produces a customized copy of `base` for `job`.
pub async fn customize(
    job: &JobRow,
    base: &ResumeDocument,
    llm: &LlmClient,
) -> Result<CustomizedResume, LlmError> {
    let outline = base.outline();
    let description = truncate_chars(&job.description, DESCRIPTION_LIMIT);

    let analysis_prompt = prompts::ANALYSIS_PROMPT
        .replace("{title}", &job.title)
        .replace("{company}", &job.company)
        .replace(
            "{experience_level}",
            job.experience_level.as_deref().unwrap_or("Not specified"),
        )
        .replace("{resume}", &outline)
        .replace("{description}", &description);
    let analysis: ResumeAnalysis = llm.call_json(&analysis_prompt, prompts::RESUME_SYSTEM).await?;

    // only skills the candidate actually lists
    let skills_emphasized: Vec<String> = analysis
        .key_skills_to_emphasize
        .iter()
        .filter_map(|wanted| {
            base.all_skills()
                .find(|have| have.eq_ignore_ascii_case(wanted.trim()))
                .map(str::to_string)
        })
        .fold(Vec::new(), |mut acc, skill| {
            if !acc.contains(&skill) {
                acc.push(skill);
            }
            acc
        });

    let rewrite_prompt = prompts::REWRITE_PROMPT
        .replace("{title}", &job.title)
        .replace("{company}", &job.company)
        .replace("{skills}", &skills_emphasized.join(", "))
        .replace(
            "{highlights}",
            &analysis
                .experience_to_highlight
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        )
        .replace("{summary_focus}", &analysis.summary_focus)
        .replace("{strategy}", &analysis.strategy)
        .replace("{truthfulness}", TRUTHFULNESS_INSTRUCTION)
        .replace("{resume}", &outline)
        .replace("{description}", &description);
    let plan: RewritePlan = llm.call_json(&rewrite_prompt, prompts::RESUME_SYSTEM).await?;

    let mut document = base.clone();
    apply_plan(&mut document, plan);
    document.reorder_skills(&skills_emphasized);

    let mut notes = analysis.strategy.trim().to_string();
    if !analysis.gaps.is_empty() {
        if !notes.is_empty() {
            notes.push(' ');
        }
        notes.push_str(&format!("Gaps: {}", analysis.gaps.join("; ")));
    }

    Ok(CustomizedResume {
        markdown: document.to_markdown(),
        document,
        skills_emphasized,
        notes,
        confidence: if analysis.confidence.is_finite() {
            analysis.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        },
    })
}

/// Applies model rewrites. Out-of-range entries, empty text and bullet lists
/// that grow or shrink by more than one are ignored.
fn apply_plan(document: &mut ResumeDocument, plan: RewritePlan) {
    if !plan.summary.trim().is_empty() {
        document.summary = plan.summary.trim().to_string();
    }
    for rewrite in plan.experience {
        let Some(entry) = document.experience.get_mut(rewrite.index) else {
            warn!("Ignoring rewrite for unknown experience entry {}", rewrite.index);
            continue;
        };
        let bullets: Vec<String> = rewrite
            .bullets
            .into_iter()
            .map(|b| b.trim().trim_start_matches("- ").to_string())
            .filter(|b| !b.is_empty())
            .collect();
        if bullets.is_empty() || bullets.len().abs_diff(entry.bullets.len()) > 1 {
            warn!(
                "Ignoring rewrite for entry {}: {} bullets vs {} original",
                rewrite.index,
                bullets.len(),
                entry.bullets.len()
            );
            continue;
        }
        entry.bullets = bullets;
    }
}

/// Runs the customize step for a `filtered` job and stores the result.
#[instrument(skip_all, fields(job_id = job.id))]
pub async fn customize_job(
    pool: &SqlitePool,
    llm: &LlmClient,
    job: &JobRow,
    base: &ResumeDocument,
) -> Result<CustomizedResume, AppError> {
    if job.is_rejected() {
        return Err(AppError::Conflict(format!("Job {} was rejected by the filter", job.id)));
    }
    let customized = customize(job, base, llm).await?;
    artifacts::attach_resume(
        pool,
        job.id,
        NewResume {
            markdown: &customized.markdown,
            skills_emphasized: &customized.skills_emphasized,
            notes: Some(&customized.notes).filter(|n| !n.is_empty()).map(String::as_str),
            confidence: customized.confidence,
        },
    )
    .await?;
    info!(
        "Customized resume for '{}' at {} (emphasis: {})",
        job.title,
        job.company,
        customized.skills_emphasized.join(", ")
    );
    Ok(customized)
}
