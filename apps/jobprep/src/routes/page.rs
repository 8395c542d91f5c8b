//! Server-rendered review page. Approval buttons call the JSON API.

use axum::{extract::State, response::Html};

use crate::errors::AppError;
use crate::ledger::{self, JobFilter};
use crate::models::{JobRow, JobStatus};
use crate::state::AppState;

const PAGE_LIMIT: i64 = 200;

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;color:#222}\
table{border-collapse:collapse;width:100%}th,td{padding:.35rem .6rem;border-bottom:1px solid #ddd;text-align:left;font-size:.9rem}\
.stats span{display:inline-block;margin-right:1.2rem}.status{font-family:monospace}\
.reject{color:#999}.err{color:#b00;font-size:.8rem}button{cursor:pointer}";

const SCRIPT: &str = "async function act(id, action) {\
const r = await fetch(`/api/v1/jobs/${id}/${action}`, {method: 'POST'});\
if (!r.ok) { const b = await r.json(); alert(b.error.message); }\
location.reload(); }\
async function runExport() {\
const r = await fetch('/api/v1/export', {method: 'POST'});\
const b = await r.json();\
alert(r.ok ? `Exported ${b.exported.length} jobs` : b.error.message); location.reload(); }";

/// GET /
pub async fn handle_index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let stats = ledger::stats(&state.db).await?;
    let jobs = ledger::list_jobs(
        &state.db,
        &JobFilter {
            limit: Some(PAGE_LIMIT),
            ..Default::default()
        },
    )
    .await?;

    let counts: String = JobStatus::ALL
        .iter()
        .map(|s| {
            format!(
                "<span>{}: <b>{}</b></span>",
                s.as_str(),
                stats.by_status.get(s.as_str()).copied().unwrap_or(0)
            )
        })
        .collect();
    let rows: String = jobs.iter().map(job_row).collect();

    Ok(Html(format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>jobprep</title>\
         <style>{STYLE}</style></head><body>\
         <h1>Applications</h1>\
         <p class=\"stats\"><span>total: <b>{total}</b></span>{counts}\
         <span>awaiting approval: <b>{awaiting}</b></span><span>rejected: <b>{rejected}</b></span></p>\
         <p><button onclick=\"runExport()\">Export approved</button></p>\
         <table><thead><tr><th>#</th><th>Title</th><th>Company</th><th>Status</th><th>Verdict</th>\
         <th>Approved</th><th></th></tr></thead><tbody>{rows}</tbody></table>\
         <script>{SCRIPT}</script></body></html>",
        total = stats.total,
        awaiting = stats.awaiting_approval,
        rejected = stats.rejected,
    )))
}

fn job_row(job: &JobRow) -> String {
    let verdict = job
        .verdict
        .map(|v| format!("{} {:.0}%", v.as_str(), job.verdict_confidence.unwrap_or(0.0) * 100.0))
        .unwrap_or_default();
    let action = match (job.status, job.is_approved()) {
        (JobStatus::EmailReady, false) => format!("<button onclick=\"act({}, 'approve')\">Approve</button>", job.id),
        (JobStatus::EmailReady, true) => format!("<button onclick=\"act({}, 'unapprove')\">Unapprove</button>", job.id),
        _ if job.last_error.is_some() => format!("<button onclick=\"act({}, 'retry')\">Retry</button>", job.id),
        _ => String::new(),
    };
    let error = job
        .last_error
        .as_deref()
        .map(|e| format!("<div class=\"err\">{} (attempts: {})</div>", escape(e), job.attempts))
        .unwrap_or_default();

    format!(
        "<tr class=\"{class}\"><td>{id}</td><td><a href=\"{url}\">{title}</a>{error}</td><td>{company}</td>\
         <td class=\"status\">{status}</td><td>{verdict}</td><td>{approved}</td><td>{action}</td></tr>",
        class = if job.is_rejected() { "reject" } else { "" },
        id = job.id,
        url = escape(&job.url),
        title = escape(&job.title),
        company = escape(&job.company),
        status = job.status,
        approved = if job.is_approved() { "yes" } else { "" },
    )
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
