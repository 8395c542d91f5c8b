mod config;
mod contacts;
mod db;
mod email;
mod errors;
mod export;
mod feed;
mod filter;
mod ledger;
mod llm_client;
mod models;
mod pipeline;
mod resume;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use std::fs::OpenOptions;
use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::feed::SearchQuery;
use crate::ledger::JobFilter;
use crate::models::JobStatus;
use crate::pipeline::{BatchRequest, StepToggles};
use crate::routes::build_router;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "jobprep")]
#[command(version, about = "Prepare job applications: scrape, filter, tailor, find contacts, draft emails")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the review dashboard and JSON API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Pull listings into the ledger without processing them
    Scrape {
        /// "keywords|location", repeatable; defaults to JOB_SEARCHES
        #[arg(long = "search")]
        searches: Vec<String>,
        #[arg(long)]
        max_jobs: Option<usize>,
    },
    /// Run a batch over pending jobs
    Run {
        /// Scrape the configured searches first
        #[arg(long)]
        scrape: bool,
        #[arg(long)]
        max_jobs: Option<usize>,
        /// Steps to leave out of this run
        #[arg(long, value_enum)]
        skip: Vec<StepArg>,
    },
    /// Export approved applications
    Export,
    /// Show ledger counts and recent jobs
    Status {
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Validate configuration and reach the LLM backend
    Check,
}

#[derive(Clone, Copy, ValueEnum)]
enum StepArg {
    Filter,
    Customize,
    Contact,
    Email,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(&config)?;

    match cli.command {
        Command::Serve { port } => serve(config, port).await,
        Command::Scrape { searches, max_jobs } => {
            let state = build_state(config).await?;
            let searches = if searches.is_empty() {
                state.config.scrape.searches.clone()
            } else {
                SearchQuery::parse_list(&searches.join(";"))
            };
            let max_jobs = max_jobs.unwrap_or(state.config.scrape.max_jobs_per_batch);
            let report = feed::scrape_into_ledger(&state.db, &state.reader, &searches, max_jobs).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Run {
            scrape,
            max_jobs,
            skip,
        } => {
            let state = build_state(config).await?;
            let mut steps = StepToggles::default();
            for step in skip {
                match step {
                    StepArg::Filter => steps.filter = false,
                    StepArg::Customize => steps.customize = false,
                    StepArg::Contact => steps.contact = false,
                    StepArg::Email => steps.email = false,
                }
            }
            let report = pipeline::run_batch(
                &state,
                BatchRequest {
                    scrape,
                    max_jobs,
                    steps,
                },
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Export => {
            let db = create_pool(&config.database_url).await?;
            let report = export::export_approved(&db, &config.paths.export_dir).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Status { status, limit } => {
            let db = create_pool(&config.database_url).await?;
            print_status(&db, status, limit).await
        }
        Command::Check => check(config).await,
    }
}

/// Stdout plus an optional JSON file layer when `LOG_FILE` is set.
fn init_tracing(config: &Config) -> Result<()> {
    let file_layer = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .json()
                    .with_writer(file)
                    .with_current_span(false)
                    .with_span_list(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http=info",
                env!("CARGO_PKG_NAME"),
                &config.rust_log
            ))
        }))
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

async fn build_state(config: Config) -> Result<AppState> {
    let report = config.validate();
    for warning in &report.warnings {
        warn!("Config: {warning}");
    }
    if !report.is_valid() {
        bail!("Invalid configuration: {}", report.errors.join("; "));
    }
    let db = create_pool(&config.database_url).await?;
    AppState::new(config, db)
}

async fn serve(config: Config, port: Option<u16>) -> Result<()> {
    info!("Starting jobprep v{}", env!("CARGO_PKG_VERSION"));
    let port = port.unwrap_or(config.port);
    let state = build_state(config).await?;

    let stale = ledger::batches::fail_stale_batches(&state.db).await?;
    if stale > 0 {
        warn!("Marked {stale} interrupted batches as failed");
    }
    let purged = contacts::cache::purge_expired(&state.db, state.config.contacts.cache_days).await?;
    if purged > 0 {
        info!("Purged {purged} expired contact cache entries");
    }

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn print_status(db: &sqlx::SqlitePool, status: Option<String>, limit: i64) -> Result<()> {
    let status = status
        .map(|s| s.parse::<JobStatus>())
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let stats = ledger::stats(db).await?;

    println!("Jobs: {}", stats.total);
    for s in JobStatus::ALL {
        println!("  {:<14} {}", s.as_str(), stats.by_status.get(s.as_str()).copied().unwrap_or(0));
    }
    println!(
        "  rejected {} | awaiting approval {} | approved {} | with errors {}",
        stats.rejected, stats.awaiting_approval, stats.approved, stats.with_errors
    );

    let jobs = ledger::list_jobs(
        db,
        &JobFilter {
            status,
            limit: Some(limit),
            ..Default::default()
        },
    )
    .await?;
    if !jobs.is_empty() {
        println!();
    }
    for job in jobs {
        println!(
            "{:>5}  {:<14} {:<8} {} @ {}{}",
            job.id,
            job.status.as_str(),
            job.verdict.map(|v| v.as_str()).unwrap_or("-"),
            job.title,
            job.company,
            job.last_error
                .as_deref()
                .map(|e| format!("  [attempts {}: {e}]", job.attempts))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn check(config: Config) -> Result<()> {
    let report = config.validate();
    println!("{}", serde_json::to_string_pretty(&config.masked())?);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for error in &report.errors {
        println!("error: {error}");
    }
    if !report.is_valid() {
        bail!("Configuration has {} errors", report.errors.len());
    }

    let llm = llm_client::LlmClient::from_config(&config.llm)?;
    let reply = llm
        .ping()
        .await
        .with_context(|| format!("LLM backend {} is not reachable", llm.backend_name()))?;
    println!("LLM {} ({}) answered: {}", llm.backend_name(), llm.model(), reply.trim());

    let db = create_pool(&config.database_url).await?;
    let stats = ledger::stats(&db).await?;
    println!("Ledger at {} holds {} jobs", config.database_url, stats.total);
    Ok(())
}
