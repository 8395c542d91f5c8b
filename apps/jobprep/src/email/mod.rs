//! Email composer: drafts the outreach email for a job.
//!
//! A template is filled from the job, the stored contact, the candidate
//! profile and the customized resume. With polishing enabled the
//! personalized paragraphs come from the model instead; any model failure
//! falls back to the resume-derived text.

pub mod prompts;
pub mod templates;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

use crate::config::{CandidateProfile, Config};
use crate::errors::AppError;
use crate::ledger::artifacts::{self, NewEmail};
use crate::llm_client::prompts::{truncate_chars, TRUTHFULNESS_INSTRUCTION};
use crate::llm_client::{LlmClient, LlmError};
use crate::models::{ContactRow, JobRow, ResumeRow};
use crate::resume::ResumeDocument;

pub use templates::EmailTemplate;

const FALLBACK_CONTACT_NAME: &str = "Hiring Manager";

/// Personalized paragraphs dropped into the template slots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Personalization {
    pub personalized_introduction: String,
    pub experience_highlight: String,
    pub skills_alignment: String,
    pub key_technologies: String,
    pub problem_solving_example: String,
}

impl Personalization {
    /// Built from the customized resume without any model call.
    pub fn from_resume(job: &JobRow, resume: &ResumeRow) -> Self {
        let document = ResumeDocument::parse(&resume.markdown);
        let skills: Vec<&str> = if resume.skills_emphasized.is_empty() {
            document.all_skills().take(3).collect()
        } else {
            resume.skills_emphasized.iter().take(3).map(String::as_str).collect()
        };
        let recent = document.experience.first();

        let experience_highlight = recent
            .map(|exp| {
                let role = match &exp.company {
                    Some(company) => format!("{} at {company}", exp.title),
                    None => exp.title.clone(),
                };
                match exp.bullets.first() {
                    Some(bullet) => format!("Most recently, as {role}, I {}.", sentence_tail(bullet)),
                    None => format!("Most recently, I worked as {role}."),
                }
            })
            .unwrap_or_default();
        let problem_solving_example = recent
            .and_then(|exp| exp.bullets.get(1))
            .map(|bullet| format!("For example, I {}.", sentence_tail(bullet)))
            .unwrap_or_default();
        let skills_alignment = if skills.is_empty() {
            String::new()
        } else {
            format!(
                "My experience with {} lines up well with what {} is looking for.",
                natural_list(&skills),
                job.company
            )
        };

        Self {
            personalized_introduction: document.summary.clone(),
            experience_highlight,
            skills_alignment,
            key_technologies: if skills.is_empty() {
                "software development".to_string()
            } else {
                natural_list(&skills)
            },
            problem_solving_example,
        }
    }

    /// Fills empty fields from `fallback`.
    fn or(mut self, fallback: Personalization) -> Self {
        let pairs = [
            (&mut self.personalized_introduction, fallback.personalized_introduction),
            (&mut self.experience_highlight, fallback.experience_highlight),
            (&mut self.skills_alignment, fallback.skills_alignment),
            (&mut self.key_technologies, fallback.key_technologies),
            (&mut self.problem_solving_example, fallback.problem_solving_example),
        ];
        for (field, value) in pairs {
            if field.trim().is_empty() {
                *field = value;
            }
        }
        self
    }
}

/// "Built a thing." -> "built a thing"
fn sentence_tail(bullet: &str) -> String {
    let trimmed = bullet.trim().trim_end_matches('.');
    let mut chars = trimmed.chars();
    match chars.next() {
        // keep acronyms like "AWS" or "API" intact
        Some(first) if !chars.next().is_some_and(|c| c.is_uppercase()) => {
            first.to_lowercase().chain(trimmed.chars().skip(1)).collect()
        }
        _ => trimmed.to_string(),
    }
}

fn natural_list(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [one] => one.to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComposedEmail {
    pub to: String,
    pub contact_name: Option<String>,
    pub subject: String,
    pub body: String,
    pub template: &'static str,
    pub polished: bool,
}

pub struct ComposeInput<'a> {
    pub job: &'a JobRow,
    pub contact: &'a ContactRow,
    pub resume: &'a ResumeRow,
    pub candidate: &'a CandidateProfile,
    pub template: EmailTemplate,
}

/// Drafts the email. Never fails: a polishing error only costs the polish.
pub async fn compose(input: ComposeInput<'_>, polish: Option<&LlmClient>) -> ComposedEmail {
    let fallback = Personalization::from_resume(input.job, input.resume);
    let (content, polished) = match polish {
        Some(llm) => match polish_content(&input, llm).await {
            Ok(content) => (content.or(fallback), true),
            Err(e) => {
                warn!(job_id = input.job.id, "Email polish failed, using template text: {e}");
                (fallback, false)
            }
        },
        None => (fallback, false),
    };

    let contact_name = input
        .contact
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(FALLBACK_CONTACT_NAME);
    let sender_contact = input.candidate.contact_line();
    let slots: [(&str, &str); 12] = [
        ("contact_name", contact_name),
        ("job_title", input.job.title.as_str()),
        ("company_name", input.job.company.as_str()),
        ("sender_name", input.candidate.name.as_str()),
        ("sender_contact", sender_contact.as_str()),
        ("personalized_introduction", content.personalized_introduction.as_str()),
        ("experience_highlight", content.experience_highlight.as_str()),
        ("skills_alignment", content.skills_alignment.as_str()),
        ("key_technologies", content.key_technologies.as_str()),
        ("technical_experience_highlight", content.experience_highlight.as_str()),
        ("problem_solving_example", content.problem_solving_example.as_str()),
        ("technical_skills_alignment", content.skills_alignment.as_str()),
    ];

    ComposedEmail {
        to: input.contact.email.clone(),
        contact_name: input.contact.name.clone(),
        subject: input.template.render_subject(&slots),
        body: input.template.render_body(&slots),
        template: input.template.name,
        polished,
    }
}

async fn polish_content(input: &ComposeInput<'_>, llm: &LlmClient) -> Result<Personalization, LlmError> {
    let document = ResumeDocument::parse(&input.resume.markdown);
    let recent_role = document
        .experience
        .first()
        .map(|exp| match &exp.company {
            Some(company) => format!("{} at {company}", exp.title),
            None => exp.title.clone(),
        })
        .unwrap_or_else(|| "Not specified".to_string());
    let contact_title = input
        .contact
        .title
        .as_deref()
        .map(|t| format!(" ({t})"))
        .unwrap_or_default();

    let prompt = prompts::POLISH_PROMPT
        .replace("{title}", &input.job.title)
        .replace("{company}", &input.job.company)
        .replace(
            "{contact_name}",
            input.contact.name.as_deref().unwrap_or(FALLBACK_CONTACT_NAME),
        )
        .replace("{contact_title}", &contact_title)
        .replace("{candidate_name}", &input.candidate.name)
        .replace("{summary}", &document.summary)
        .replace("{recent_role}", &recent_role)
        .replace("{skills}", &input.resume.skills_emphasized.join(", "))
        .replace("{notes}", input.resume.notes.as_deref().unwrap_or("None"))
        .replace("{template}", input.template.name)
        .replace("{truthfulness}", TRUTHFULNESS_INSTRUCTION)
        .replace("{description}", &truncate_chars(&input.job.description, 1000));

    llm.call_json(&prompt, prompts::POLISH_SYSTEM).await
}

/// Runs the email step for a `contact_found` job and stores the draft.
#[instrument(skip_all, fields(job_id = job.id))]
pub async fn compose_for_job(
    pool: &SqlitePool,
    llm: &LlmClient,
    config: &Config,
    job: &JobRow,
) -> Result<ComposedEmail, AppError> {
    let template = EmailTemplate::by_name(&config.pipeline.email_template).ok_or_else(|| {
        AppError::Validation(format!(
            "Unknown email template '{}'",
            config.pipeline.email_template
        ))
    })?;
    let resume = match job.resume_id {
        Some(id) => artifacts::get_resume(pool, id).await?,
        None => None,
    }
    .ok_or_else(|| AppError::Conflict(format!("Job {} has no customized resume", job.id)))?;
    let contact = match job.contact_id {
        Some(id) => artifacts::get_contact(pool, id).await?,
        None => None,
    }
    .ok_or_else(|| AppError::Conflict(format!("Job {} has no contact", job.id)))?;

    let email = compose(
        ComposeInput {
            job,
            contact: &contact,
            resume: &resume,
            candidate: &config.candidate,
            template,
        },
        config.pipeline.polish_emails.then_some(llm),
    )
    .await;

    artifacts::attach_email(
        pool,
        job.id,
        NewEmail {
            contact_email: &email.to,
            contact_name: email.contact_name.as_deref(),
            subject: &email.subject,
            body: &email.body,
            template: email.template,
            polished: email.polished,
        },
    )
    .await?;
    info!(
        "Drafted {} email to {} for '{}' (polished: {})",
        email.template, email.to, job.title, email.polished
    );
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::artifacts::{NewContact, NewResume};
    use crate::ledger::{get_job, insert_job, record_verdict, InsertOutcome};
    use crate::models::{JobStatus, Verdict};
    use crate::test_support::{failing_llm, llm_stub, memory_pool, posting, test_config};

    const RESUME: &str = "# Ada Example

## Summary
Backend engineer who ships reliable Rust services.

## Experience
### Senior Engineer — Initrode
- Built a Postgres-backed ingestion service.
- Cut p99 latency by 40%

## Skills
- **Languages:** Rust, Go
";

    /// Job at `contact_found` with a stored resume and contact.
    async fn prepared_job(pool: &SqlitePool, contact_name: Option<&str>) -> JobRow {
        let InsertOutcome::Inserted(id) =
            insert_job(pool, &posting("https://example.com/e", "Rust Engineer", "Acme"))
                .await
                .unwrap()
        else {
            panic!("duplicate");
        };
        record_verdict(pool, id, Verdict::Accept, 0.9, "fit").await.unwrap();
        let skills = vec!["Rust".to_string(), "Postgres".to_string()];
        artifacts::attach_resume(
            pool,
            id,
            NewResume {
                markdown: RESUME,
                skills_emphasized: &skills,
                notes: Some("Lead with Rust."),
                confidence: 0.8,
            },
        )
        .await
        .unwrap();
        artifacts::attach_contact(
            pool,
            id,
            NewContact {
                company: "Acme",
                domain: "acme.com",
                name: contact_name,
                email: "jane@acme.com",
                title: Some("Engineering Manager"),
                source: "hunter.io",
                confidence: 0.9,
                verified: true,
            },
        )
        .await
        .unwrap();
        get_job(pool, id).await.unwrap()
    }

    #[test]
    fn test_sentence_tail_and_list() {
        assert_eq!(sentence_tail("Built a service."), "built a service");
        assert_eq!(sentence_tail("AWS migration lead"), "AWS migration lead");
        assert_eq!(natural_list(&["Rust"]), "Rust");
        assert_eq!(natural_list(&["Rust", "Go", "SQL"]), "Rust, Go and SQL");
    }

    #[tokio::test]
    async fn test_compose_without_polish_uses_resume() {
        let pool = memory_pool().await;
        let config = test_config(&[("POLISH_EMAILS", "false")]);
        let job = prepared_job(&pool, None).await;
        let llm = failing_llm().await;

        let email = compose_for_job(&pool, &llm, &config, &job).await.unwrap();
        assert!(!email.polished);
        assert_eq!(email.to, "jane@acme.com");
        assert_eq!(email.subject, "Application for Rust Engineer at Acme");
        assert!(email.body.starts_with("Dear Hiring Manager,"));
        assert!(email.body.contains("Backend engineer who ships reliable Rust services."));
        assert!(email
            .body
            .contains("Most recently, as Senior Engineer at Initrode, I built a Postgres-backed ingestion service."));
        assert!(email.body.contains("My experience with Rust and Postgres lines up well with what Acme is looking for."));
        assert!(email.body.ends_with("Ada Example\nada@example.dev"));

        let stored = get_job(&pool, job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::EmailReady);
        let row = artifacts::get_email(&pool, stored.email_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(row.template, "professional");
        assert!(!row.polished);
    }

    #[tokio::test]
    async fn test_polished_email_merges_model_paragraphs() {
        let pool = memory_pool().await;
        let config = test_config(&[("EMAIL_TEMPLATE", "technical")]);
        let job = prepared_job(&pool, Some("Jane Doe")).await;
        let llm = llm_stub(|prompt: &str| {
            assert!(prompt.contains("RECIPIENT: Jane Doe (Engineering Manager)"));
            r#"{"personalized_introduction": "Acme's robotics work caught my eye.",
                "experience_highlight": "I run Rust services in production.",
                "key_technologies": "Rust, Postgres"}"#
                .to_string()
        })
        .await;

        let email = compose_for_job(&pool, &llm, &config, &job).await.unwrap();
        assert!(email.polished);
        assert_eq!(email.template, "technical");
        assert_eq!(email.subject, "Rust Engineer application - Ada Example");
        assert!(email.body.starts_with("Dear Jane Doe,"));
        assert!(email.body.contains("As an engineer working with Rust, Postgres,"));
        assert!(email.body.contains("I run Rust services in production."));
        // missing from the model reply, filled from the resume
        assert!(email.body.contains("For example, I cut p99 latency by 40%."));
    }

    #[tokio::test]
    async fn test_polish_failure_falls_back() {
        let pool = memory_pool().await;
        let config = test_config(&[]);
        let job = prepared_job(&pool, Some("Jane Doe")).await;

        let email = compose_for_job(&pool, &failing_llm().await, &config, &job).await.unwrap();
        assert!(!email.polished);
        assert!(email.body.contains("Backend engineer who ships reliable Rust services."));
        assert_eq!(get_job(&pool, job.id).await.unwrap().status, JobStatus::EmailReady);
    }

    #[tokio::test]
    async fn test_job_without_contact_is_refused() {
        let pool = memory_pool().await;
        let InsertOutcome::Inserted(id) =
            insert_job(&pool, &posting("https://example.com/x", "Rust Engineer", "Acme"))
                .await
                .unwrap()
        else {
            panic!("duplicate");
        };
        let job = get_job(&pool, id).await.unwrap();
        let err = compose_for_job(&pool, &failing_llm().await, &test_config(&[]), &job)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
