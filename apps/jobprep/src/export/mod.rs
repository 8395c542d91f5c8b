//! Document exporter: writes approved applications to disk.
//!
//! ```text
//! <export_dir>/<run>/
//!     emails.csv
//!     contacts.csv
//!     <id>-<company>-<title>/
//!         resume.md  resume.html  email.txt  summary.md
//! ```

use std::path::{Path, PathBuf};

use chrono::Utc;
use pulldown_cmark::{html, Options, Parser};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::ledger::{self, artifacts};
use crate::models::{ContactRow, EmailRow, JobRow, ResumeRow};

const SLUG_MAX: usize = 40;

#[derive(Debug, Clone, Serialize)]
pub struct ExportedJob {
    pub job_id: i64,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    /// `None` when there was nothing to export.
    pub run_dir: Option<PathBuf>,
    pub exported: Vec<ExportedJob>,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
struct EmailCsvRow<'a> {
    job_id: i64,
    company: &'a str,
    job_title: &'a str,
    to: &'a str,
    contact_name: &'a str,
    subject: &'a str,
    body: &'a str,
    template: &'a str,
    job_url: &'a str,
}

#[derive(Debug, Serialize)]
struct ContactCsvRow<'a> {
    job_id: i64,
    company: &'a str,
    name: &'a str,
    email: &'a str,
    title: &'a str,
    source: &'a str,
    confidence: f64,
    verified: bool,
}

/// Everything written for one job.
struct Bundle {
    job: JobRow,
    resume: ResumeRow,
    contact: ContactRow,
    email: EmailRow,
}

/// Exports every approved `email_ready` job and marks it `exported`.
/// A job that fails to export is reported and left where it was. Jobs are
/// only marked once their files and the bulk CSVs are on disk.
#[instrument(skip(pool))]
pub async fn export_approved(pool: &SqlitePool, export_dir: &Path) -> Result<ExportReport, AppError> {
    let jobs = ledger::exportable_jobs(pool).await?;
    if jobs.is_empty() {
        info!("Nothing approved to export");
        return Ok(ExportReport::default());
    }

    let run_dir = export_dir.join(run_name());
    tokio::fs::create_dir_all(&run_dir).await?;

    let mut report = ExportReport {
        run_dir: Some(run_dir.clone()),
        ..Default::default()
    };
    let mut written = Vec::new();

    for job in jobs {
        let job_id = job.id;
        let result = async {
            let bundle = load_bundle(pool, job).await?;
            let dir = write_bundle(&run_dir, &bundle).await?;
            Ok::<_, AppError>((bundle, dir))
        }
        .await;

        match result {
            Ok(done) => written.push(done),
            Err(e) => {
                error!(job_id, "Export failed: {e}");
                report.errors.push(format!("job {job_id}: {e}"));
            }
        }
    }

    let bundles: Vec<&Bundle> = written.iter().map(|(bundle, _)| bundle).collect();
    tokio::fs::write(run_dir.join("emails.csv"), emails_csv(&bundles)?).await?;
    tokio::fs::write(run_dir.join("contacts.csv"), contacts_csv(&bundles)?).await?;

    for (bundle, dir) in written {
        let job_id = bundle.job.id;
        match ledger::mark_exported(pool, job_id).await {
            Ok(()) => report.exported.push(ExportedJob { job_id, dir }),
            Err(e) => {
                error!(job_id, "Could not mark job exported: {e}");
                report.errors.push(format!("job {job_id}: {e}"));
            }
        }
    }

    info!(
        "Exported {} jobs to {} ({} failed)",
        report.exported.len(),
        run_dir.display(),
        report.errors.len()
    );
    Ok(report)
}

/// Timestamp plus a random suffix, so runs in the same second never share a directory.
fn run_name() -> String {
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%d-%H%M%S"),
        &Uuid::new_v4().simple().to_string()[..8]
    )
}

async fn load_bundle(pool: &SqlitePool, job: JobRow) -> Result<Bundle, AppError> {
    let missing = |what: &str| AppError::Export(format!("job {} has no {what}", job.id));
    let resume = match job.resume_id {
        Some(id) => artifacts::get_resume(pool, id).await?,
        None => None,
    }
    .ok_or_else(|| missing("resume"))?;
    let contact = match job.contact_id {
        Some(id) => artifacts::get_contact(pool, id).await?,
        None => None,
    }
    .ok_or_else(|| missing("contact"))?;
    let email = match job.email_id {
        Some(id) => artifacts::get_email(pool, id).await?,
        None => None,
    }
    .ok_or_else(|| missing("email"))?;
    Ok(Bundle {
        job,
        resume,
        contact,
        email,
    })
}

async fn write_bundle(run_dir: &Path, bundle: &Bundle) -> Result<PathBuf, AppError> {
    let job = &bundle.job;
    let dir = run_dir.join(format!("{}-{}-{}", job.id, slug(&job.company), slug(&job.title)));
    tokio::fs::create_dir_all(&dir).await?;

    tokio::fs::write(dir.join("resume.md"), &bundle.resume.markdown).await?;
    tokio::fs::write(
        dir.join("resume.html"),
        markdown_to_html(&bundle.resume.markdown, &format!("{} - {}", job.title, job.company)),
    )
    .await?;
    tokio::fs::write(dir.join("email.txt"), email_text(&bundle.email)).await?;
    tokio::fs::write(dir.join("summary.md"), summary(bundle)).await?;
    Ok(dir)
}

/// Lowercase ASCII words joined by '-', at most `SLUG_MAX` chars.
pub fn slug(text: &str) -> String {
    let mut out = String::new();
    for word in text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_ascii_lowercase();
        let extra = if out.is_empty() { word.len() } else { word.len() + 1 };
        if out.len() + extra > SLUG_MAX {
            break;
        }
        if !out.is_empty() {
            out.push('-');
        }
        out.push_str(&word);
    }
    if out.is_empty() {
        out.push_str("untitled");
    }
    out
}

pub fn markdown_to_html(markdown: &str, title: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let mut body = String::new();
    html::push_html(&mut body, Parser::new_ext(markdown, options));

    let title = title
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <style>body{{font-family:Georgia,serif;max-width:760px;margin:2rem auto;line-height:1.45;color:#222}}\
         h1{{margin-bottom:.2rem}}h2{{border-bottom:1px solid #ccc;margin-top:1.6rem}}h3{{margin-bottom:.2rem}}</style>\n\
         </head>\n<body>\n{body}</body>\n</html>\n"
    )
}

fn email_text(email: &EmailRow) -> String {
    let to = match &email.contact_name {
        Some(name) => format!("{name} <{}>", email.contact_email),
        None => email.contact_email.clone(),
    };
    format!("To: {to}\nSubject: {}\n\n{}\n", email.subject, email.body)
}

fn summary(bundle: &Bundle) -> String {
    let Bundle {
        job,
        resume,
        contact,
        email,
    } = bundle;
    let mut lines = vec![
        format!("# {} at {}", job.title, job.company),
        String::new(),
        format!("- **URL:** {}", job.url),
    ];
    if let Some(location) = &job.location {
        lines.push(format!("- **Location:** {location}"));
    }
    if let Some(salary) = &job.salary_range {
        lines.push(format!("- **Salary:** {salary}"));
    }
    if let Some(verdict) = job.verdict {
        lines.push(format!(
            "- **Verdict:** {} ({:.0}%)",
            verdict.as_str(),
            job.verdict_confidence.unwrap_or(0.0) * 100.0
        ));
    }
    if let Some(approved_at) = job.approved_at {
        lines.push(format!("- **Approved:** {}", approved_at.format("%Y-%m-%d %H:%M UTC")));
    }
    if let Some(reasoning) = job.verdict_reasoning.as_deref().filter(|r| !r.is_empty()) {
        lines.extend([String::new(), "## Filter reasoning".into(), reasoning.to_string()]);
    }

    lines.extend([String::new(), "## Contact".into()]);
    lines.push(format!(
        "{}{} <{}>, via {} (confidence {:.2}{})",
        contact.name.as_deref().unwrap_or("Unknown"),
        contact.title.as_deref().map(|t| format!(", {t}")).unwrap_or_default(),
        contact.email,
        contact.source,
        contact.confidence,
        if contact.verified { ", verified" } else { "" }
    ));

    lines.extend([String::new(), "## Resume".into()]);
    if !resume.skills_emphasized.is_empty() {
        lines.push(format!("Skills emphasized: {}", resume.skills_emphasized.join(", ")));
    }
    if let Some(notes) = resume.notes.as_deref().filter(|n| !n.is_empty()) {
        lines.push(format!("Notes: {notes}"));
    }
    lines.push(format!("Confidence: {:.2}", resume.confidence));

    lines.extend([
        String::new(),
        "## Email".into(),
        format!(
            "Subject: {} (template: {}{})",
            email.subject,
            email.template,
            if email.polished { ", polished" } else { "" }
        ),
    ]);
    lines.push(String::new());
    lines.join("\n")
}

fn emails_csv(bundles: &[&Bundle]) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for b in bundles {
        writer.serialize(EmailCsvRow {
            job_id: b.job.id,
            company: &b.job.company,
            job_title: &b.job.title,
            to: &b.email.contact_email,
            contact_name: b.email.contact_name.as_deref().unwrap_or_default(),
            subject: &b.email.subject,
            body: &b.email.body,
            template: &b.email.template,
            job_url: &b.job.url,
        })?;
    }
    finish_csv(writer, &["job_id", "company", "job_title", "to", "contact_name", "subject", "body", "template", "job_url"])
}

fn contacts_csv(bundles: &[&Bundle]) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for b in bundles {
        writer.serialize(ContactCsvRow {
            job_id: b.job.id,
            company: &b.contact.company,
            name: b.contact.name.as_deref().unwrap_or_default(),
            email: &b.contact.email,
            title: b.contact.title.as_deref().unwrap_or_default(),
            source: &b.contact.source,
            confidence: b.contact.confidence,
            verified: b.contact.verified,
        })?;
    }
    finish_csv(writer, &["job_id", "company", "name", "email", "title", "source", "confidence", "verified"])
}

/// Serialized rows carry their own header; an empty file still gets one.
fn finish_csv(mut writer: csv::Writer<Vec<u8>>, headers: &[&str]) -> Result<Vec<u8>, AppError> {
    writer.flush()?;
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Export(e.to_string()))?;
    if !bytes.is_empty() {
        return Ok(bytes);
    }
    let mut header_only = csv::Writer::from_writer(Vec::new());
    header_only.write_record(headers)?;
    header_only
        .into_inner()
        .map_err(|e| AppError::Export(e.to_string()))
}
