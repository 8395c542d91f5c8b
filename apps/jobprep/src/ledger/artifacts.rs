use chrono::Utc;
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::errors::AppError;
use crate::ledger::complete_step;
use crate::models::{ContactRow, EmailRow, JobStatus, ResumeRow};

pub struct NewResume<'a> {
    pub markdown: &'a str,
    pub skills_emphasized: &'a [String],
    pub notes: Option<&'a str>,
    pub confidence: f64,
}

pub struct NewContact<'a> {
    pub company: &'a str,
    pub domain: &'a str,
    pub name: Option<&'a str>,
    pub email: &'a str,
    pub title: Option<&'a str>,
    pub source: &'a str,
    pub confidence: f64,
    pub verified: bool,
}

pub struct NewEmail<'a> {
    pub contact_email: &'a str,
    pub contact_name: Option<&'a str>,
    pub subject: &'a str,
    pub body: &'a str,
    pub template: &'a str,
    pub polished: bool,
}

/// Stores a customized resume and advances `filtered -> resume_ready`.
/// Nothing is written if the job is not at `filtered` or was rejected.
pub async fn attach_resume(pool: &SqlitePool, job_id: i64, resume: NewResume<'_>) -> Result<i64, AppError> {
    let mut tx = pool.begin().await?;
    let id = sqlx::query(
        "INSERT INTO resumes (job_id, markdown, skills_emphasized, notes, confidence, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(job_id)
    .bind(resume.markdown)
    .bind(Json(resume.skills_emphasized))
    .bind(resume.notes)
    .bind(resume.confidence)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    complete_step(&mut tx, job_id, JobStatus::Filtered, Some(("resume_id", id))).await?;
    tx.commit().await?;
    Ok(id)
}

/// Stores the chosen contact and advances `resume_ready -> contact_found`.
pub async fn attach_contact(pool: &SqlitePool, job_id: i64, contact: NewContact<'_>) -> Result<i64, AppError> {
    let mut tx = pool.begin().await?;
    let id = sqlx::query(
        r#"
        INSERT INTO contacts (job_id, company, domain, name, email, title, source, confidence, verified, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job_id)
    .bind(contact.company)
    .bind(contact.domain)
    .bind(contact.name)
    .bind(contact.email)
    .bind(contact.title)
    .bind(contact.source)
    .bind(contact.confidence)
    .bind(contact.verified)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    complete_step(&mut tx, job_id, JobStatus::ResumeReady, Some(("contact_id", id))).await?;
    tx.commit().await?;
    Ok(id)
}

/// Stores the drafted email and advances `contact_found -> email_ready`.
pub async fn attach_email(pool: &SqlitePool, job_id: i64, email: NewEmail<'_>) -> Result<i64, AppError> {
    let mut tx = pool.begin().await?;
    let id = sqlx::query(
        r#"
        INSERT INTO emails (job_id, contact_email, contact_name, subject, body, template, polished, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job_id)
    .bind(email.contact_email)
    .bind(email.contact_name)
    .bind(email.subject)
    .bind(email.body)
    .bind(email.template)
    .bind(email.polished)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    complete_step(&mut tx, job_id, JobStatus::ContactFound, Some(("email_id", id))).await?;
    tx.commit().await?;
    Ok(id)
}

pub async fn get_resume(pool: &SqlitePool, id: i64) -> Result<Option<ResumeRow>, AppError> {
    Ok(sqlx::query_as::<_, ResumeRow>("SELECT * FROM resumes WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

pub async fn get_contact(pool: &SqlitePool, id: i64) -> Result<Option<ContactRow>, AppError> {
    Ok(sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

pub async fn get_email(pool: &SqlitePool, id: i64) -> Result<Option<EmailRow>, AppError> {
    Ok(sqlx::query_as::<_, EmailRow>("SELECT * FROM emails WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?)
}
