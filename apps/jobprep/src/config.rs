use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};

use crate::feed::SearchQuery;

const DEFAULT_USER_NAME: &str = "Your Name";
const DEFAULT_USER_EMAIL: &str = "your.email@example.com";

/// Application configuration loaded from environment variables.
/// Every value has a default, so a bare checkout starts; `validate` reports
/// what would keep the pipeline from doing useful work.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    /// Optional JSON log file, written alongside stdout.
    pub log_file: Option<PathBuf>,
    pub llm: LlmConfig,
    pub contacts: ContactConfig,
    pub candidate: CandidateProfile,
    pub scrape: ScrapeConfig,
    pub pipeline: PipelineConfig,
    pub paths: PathConfig,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub use_local: bool,
    pub openrouter_api_key: Option<String>,
    pub openrouter_base_url: String,
    pub ollama_base_url: String,
    pub model: String,
    pub local_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    /// Model name for whichever backend is active.
    pub fn active_model(&self) -> &str {
        if self.use_local {
            &self.local_model
        } else {
            &self.model
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContactConfig {
    pub hunter_api_key: Option<String>,
    pub apollo_api_key: Option<String>,
    pub hunter_base_url: String,
    pub apollo_base_url: String,
    pub cache_days: i64,
}

/// The person applying. Used in email signatures and resume headers.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateProfile {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
}

impl CandidateProfile {
    /// Single line of contact details for signatures: email | phone | linkedin.
    pub fn contact_line(&self) -> String {
        let mut parts = vec![self.email.clone()];
        parts.extend(self.phone.iter().cloned());
        parts.extend(self.linkedin_url.iter().cloned());
        parts.join(" | ")
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub searches: Vec<SearchQuery>,
    pub max_jobs_per_batch: usize,
    pub delay_seconds: f64,
    pub requests_per_minute: u32,
    pub user_agent: String,
    pub linkedin_base_url: String,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_attempts: i64,
    pub email_template: String,
    pub polish_emails: bool,
}

#[derive(Debug, Clone)]
pub struct PathConfig {
    pub data_dir: PathBuf,
    pub base_resume: PathBuf,
    pub export_dir: PathBuf,
}

/// Result of `Config::validate`.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ConfigReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let data_dir = PathBuf::from(or("DATA_DIR", "data"));

        let searches = match get("JOB_SEARCHES") {
            Some(raw) => SearchQuery::parse_list(&raw),
            None => vec![SearchQuery::new("software engineer", "Remote")],
        };

        Ok(Config {
            database_url: or("DATABASE_URL", "sqlite://data/jobprep.db"),
            port: parse_or(&get, "PORT", 8080)?,
            rust_log: or("RUST_LOG", "info"),
            log_file: get("LOG_FILE").map(PathBuf::from),
            llm: LlmConfig {
                use_local: parse_bool(get("USE_LOCAL_LLM")),
                openrouter_api_key: get("OPENROUTER_API_KEY"),
                openrouter_base_url: or("OPENROUTER_BASE_URL", "https://openrouter.ai/api/v1"),
                ollama_base_url: or("OLLAMA_BASE_URL", "http://localhost:11434"),
                model: or("DEFAULT_LLM_MODEL", "anthropic/claude-3.5-sonnet"),
                local_model: or("LOCAL_LLM_MODEL", "qwen2.5:32b"),
                temperature: parse_or(&get, "LLM_TEMPERATURE", 0.7)?,
                max_tokens: parse_or(&get, "LLM_MAX_TOKENS", 4000)?,
            },
            contacts: ContactConfig {
                hunter_api_key: get("HUNTER_IO_API_KEY"),
                apollo_api_key: get("APOLLO_IO_API_KEY"),
                hunter_base_url: or("HUNTER_BASE_URL", "https://api.hunter.io/v2"),
                apollo_base_url: or("APOLLO_BASE_URL", "https://api.apollo.io/v1"),
                cache_days: parse_or(&get, "CONTACT_CACHE_DAYS", 30)?,
            },
            candidate: CandidateProfile {
                name: or("USER_NAME", DEFAULT_USER_NAME),
                email: or("USER_EMAIL", DEFAULT_USER_EMAIL),
                phone: get("USER_PHONE"),
                location: get("USER_LOCATION"),
                linkedin_url: get("USER_LINKEDIN_URL"),
                github_url: get("USER_GITHUB_URL"),
            },
            scrape: ScrapeConfig {
                searches,
                max_jobs_per_batch: parse_or(&get, "MAX_JOBS_PER_BATCH", 50)?,
                delay_seconds: parse_or(&get, "SCRAPING_DELAY_SECONDS", 2.0)?,
                requests_per_minute: parse_or(&get, "RATE_LIMIT_REQUESTS_PER_MINUTE", 30)?,
                user_agent: or(
                    "SCRAPER_USER_AGENT",
                    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
                ),
                linkedin_base_url: or(
                    "LINKEDIN_SEARCH_URL",
                    "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search",
                ),
            },
            pipeline: PipelineConfig {
                max_attempts: parse_or(&get, "MAX_ATTEMPTS", 3)?,
                email_template: or("EMAIL_TEMPLATE", "professional"),
                polish_emails: get("POLISH_EMAILS").map_or(true, |v| parse_bool(Some(v))),
            },
            paths: PathConfig {
                base_resume: get("BASE_RESUME_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir.join("templates").join("base_resume.md")),
                export_dir: get("EXPORT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir.join("exports")),
                data_dir,
            },
        })
    }

    /// Checks the loaded values. Errors block the pipeline; warnings degrade it.
    pub fn validate(&self) -> ConfigReport {
        let mut report = ConfigReport::default();

        if !self.llm.use_local && self.llm.openrouter_api_key.is_none() {
            report.errors.push(
                "No LLM backend configured: set OPENROUTER_API_KEY or USE_LOCAL_LLM=true".into(),
            );
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            report
                .errors
                .push(format!("LLM temperature {} is outside 0.0..=2.0", self.llm.temperature));
        }
        if self.scrape.requests_per_minute == 0 {
            report
                .errors
                .push("RATE_LIMIT_REQUESTS_PER_MINUTE must be greater than 0".into());
        }
        let delay = self.scrape.delay_seconds;
        if !delay.is_finite() || delay < 0.0 {
            report.errors.push(format!(
                "SCRAPING_DELAY_SECONDS must be a finite, non-negative number (got {delay})"
            ));
        }
        if self.scrape.max_jobs_per_batch == 0 {
            report.errors.push("MAX_JOBS_PER_BATCH must be greater than 0".into());
        }
        if self.pipeline.max_attempts < 1 {
            report.errors.push("MAX_ATTEMPTS must be at least 1".into());
        }
        if crate::email::EmailTemplate::by_name(&self.pipeline.email_template).is_none() {
            report.errors.push(format!(
                "Unknown EMAIL_TEMPLATE '{}'",
                self.pipeline.email_template
            ));
        }

        if self.candidate.name == DEFAULT_USER_NAME {
            report.warnings.push("USER_NAME is still the default".into());
        }
        if self.candidate.email == DEFAULT_USER_EMAIL {
            report.warnings.push("USER_EMAIL is still the default".into());
        }
        if self.contacts.hunter_api_key.is_none() && self.contacts.apollo_api_key.is_none() {
            report.warnings.push(
                "No contact API keys configured; only pattern-generated addresses will be used"
                    .into(),
            );
        }
        if self.scrape.searches.is_empty() {
            report.warnings.push("JOB_SEARCHES is empty; scraping will do nothing".into());
        }
        if !self.paths.base_resume.exists() {
            report.warnings.push(format!(
                "Base resume not found at {}",
                self.paths.base_resume.display()
            ));
        }

        report
    }

    /// Config as JSON with secrets masked, for the dashboard and `check`.
    pub fn masked(&self) -> Value {
        json!({
            "database_url": self.database_url,
            "port": self.port,
            "llm": {
                "backend": if self.llm.use_local { "ollama" } else { "openrouter" },
                "model": self.llm.active_model(),
                "temperature": self.llm.temperature,
                "max_tokens": self.llm.max_tokens,
                "openrouter_api_key": self.llm.openrouter_api_key.as_deref().map(mask_secret),
                "ollama_base_url": self.llm.ollama_base_url,
            },
            "contacts": {
                "hunter_api_key": self.contacts.hunter_api_key.as_deref().map(mask_secret),
                "apollo_api_key": self.contacts.apollo_api_key.as_deref().map(mask_secret),
                "cache_days": self.contacts.cache_days,
            },
            "candidate": self.candidate,
            "scrape": {
                "searches": self.scrape.searches,
                "max_jobs_per_batch": self.scrape.max_jobs_per_batch,
                "delay_seconds": self.scrape.delay_seconds,
                "requests_per_minute": self.scrape.requests_per_minute,
            },
            "pipeline": {
                "max_attempts": self.pipeline.max_attempts,
                "email_template": self.pipeline.email_template,
                "polish_emails": self.pipeline.polish_emails,
            },
            "paths": {
                "data_dir": self.paths.data_dir,
                "base_resume": self.paths.base_resume,
                "export_dir": self.paths.export_dir,
            },
        })
    }
}

/// Keeps the first 8 characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= 8 {
        "***".to_string()
    } else {
        format!("{}...", secret.chars().take(8).collect::<String>())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref(),
        Some("true" | "1" | "yes" | "on")
    )
}
