//! Contact finder: looks up a hiring contact for a company.
//!
//! Sources are tried in a fixed order (Hunter.io, Apollo.io, address
//! patterns). The first source that returns anything wins; a failing source
//! is logged and skipped. Results are cached per company and domain.

pub mod apollo;
pub mod cache;
pub mod hunter;
pub mod patterns;

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::ContactConfig;
use crate::errors::AppError;
use crate::ledger::artifacts::{self, NewContact};
use crate::models::JobRow;

pub(crate) type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub(crate) fn rate_limiter(per_minute: u32) -> Arc<DirectRateLimiter> {
    let quota = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_minute(quota)))
}

#[derive(Debug, Error)]
pub enum ContactError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{source_name} returned status {status}: {message}")]
    Status {
        source_name: &'static str,
        status: u16,
        message: String,
    },

    #[error("No domain could be derived for company '{0}'")]
    NoDomain(String),

    #[error("No contacts found for {0}")]
    NotFound(String),
}

/// A candidate recipient for the application email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub email: String,
    pub title: Option<String>,
    pub company: String,
    pub domain: String,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub source: String,
    pub verified: bool,
}

/// A place contacts can come from.
#[async_trait]
pub trait ContactSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn find(&self, company: &str, domain: &str) -> Result<Vec<Contact>, ContactError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactSearch {
    pub company: String,
    pub domain: String,
    /// Best first.
    pub contacts: Vec<Contact>,
    pub source: Option<String>,
    pub cached: bool,
}

pub struct ContactFinder {
    sources: Vec<Box<dyn ContactSource>>,
    cache_days: i64,
}

impl ContactFinder {
    /// Hunter and Apollo are only included when their keys are configured;
    /// the pattern source is always last.
    pub fn from_config(config: &ContactConfig) -> Result<Self, ContactError> {
        let mut sources: Vec<Box<dyn ContactSource>> = Vec::new();
        if let Some(key) = &config.hunter_api_key {
            sources.push(Box::new(hunter::HunterSource::new(&config.hunter_base_url, key)?));
        }
        if let Some(key) = &config.apollo_api_key {
            sources.push(Box::new(apollo::ApolloSource::new(&config.apollo_base_url, key)?));
        }
        sources.push(Box::new(patterns::PatternSource));
        Ok(Self::with_sources(sources, config.cache_days))
    }

    pub fn with_sources(sources: Vec<Box<dyn ContactSource>>, cache_days: i64) -> Self {
        Self { sources, cache_days }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Finds contacts for `company`, deriving the domain when none is given.
    pub async fn search(
        &self,
        pool: &SqlitePool,
        company: &str,
        domain: Option<&str>,
    ) -> Result<ContactSearch, AppError> {
        let domain = match domain.map(str::trim).filter(|d| !d.is_empty()) {
            Some(d) => d.to_lowercase(),
            None => guess_domain(company).ok_or_else(|| ContactError::NoDomain(company.to_string()))?,
        };

        if let Some(contacts) = cache::lookup(pool, company, &domain, self.cache_days).await? {
            info!("Using {} cached contacts for {company} ({domain})", contacts.len());
            let source = contacts.first().map(|c| c.source.clone());
            return Ok(ContactSearch {
                company: company.to_string(),
                domain,
                contacts,
                source,
                cached: true,
            });
        }

        for source in &self.sources {
            match source.find(company, &domain).await {
                Ok(found) if !found.is_empty() => {
                    let contacts = rank_contacts(found);
                    info!("{} found {} contacts for {domain}", source.name(), contacts.len());
                    cache::store(pool, company, &domain, &contacts).await?;
                    return Ok(ContactSearch {
                        company: company.to_string(),
                        domain,
                        contacts,
                        source: Some(source.name().to_string()),
                        cached: false,
                    });
                }
                Ok(_) => info!("{} had no contacts for {domain}", source.name()),
                Err(e) => warn!("{} lookup for {domain} failed: {e}", source.name()),
            }
        }

        Ok(ContactSearch {
            company: company.to_string(),
            domain,
            contacts: Vec::new(),
            source: None,
            cached: false,
        })
    }
}

static LEGAL_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(inc|llc|corp|corporation|company|co|ltd|limited|gmbh|plc)\b\.?")
        .expect("valid regex")
});

/// `"Acme Robotics, Inc."` -> `"acmerobotics.com"`.
pub fn guess_domain(company: &str) -> Option<String> {
    let stripped = LEGAL_SUFFIX.replace_all(company, "");
    let label: String = stripped
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if label.is_empty() || label == "unknown" {
        return None;
    }
    Some(format!("{label}.com"))
}

/// Drops contacts without a usable address, deduplicates by lowercase email
/// (first wins) and sorts by confidence, highest first. Ties keep source order.
pub fn rank_contacts(contacts: Vec<Contact>) -> Vec<Contact> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Contact> = contacts
        .into_iter()
        .filter(|c| c.email.contains('@'))
        .filter(|c| seen.insert(c.email.to_lowercase()))
        .collect();
    unique.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    unique
}

/// Runs the contact step for a `resume_ready` job and stores the best contact.
#[instrument(skip_all, fields(job_id = job.id))]
pub async fn find_contact_for_job(
    pool: &SqlitePool,
    finder: &ContactFinder,
    job: &JobRow,
) -> Result<Contact, AppError> {
    let search = finder.search(pool, &job.company, None).await?;
    let best = search
        .contacts
        .into_iter()
        .next()
        .ok_or_else(|| ContactError::NotFound(format!("{} ({})", job.company, search.domain)))?;

    artifacts::attach_contact(
        pool,
        job.id,
        NewContact {
            company: &job.company,
            domain: &best.domain,
            name: best.name.as_deref(),
            email: &best.email,
            title: best.title.as_deref(),
            source: &best.source,
            confidence: best.confidence,
            verified: best.verified,
        },
    )
    .await?;
    info!("Contact for {}: {} via {}", job.company, best.email, best.source);
    Ok(best)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ledger::{get_job, insert_job, record_verdict, InsertOutcome};
    use crate::models::{JobStatus, Verdict};
    use crate::test_support::{memory_pool, posting};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn contact(email: &str, confidence: f64, source: &str) -> Contact {
        Contact {
            name: None,
            email: email.to_string(),
            title: None,
            company: "Acme".to_string(),
            domain: "acme.com".to_string(),
            confidence,
            source: source.to_string(),
            verified: false,
        }
    }

    /// Source with canned results that counts its calls.
    struct FakeSource {
        name: &'static str,
        result: Result<Vec<Contact>, u16>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ContactSource for FakeSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn find(&self, _company: &str, _domain: &str) -> Result<Vec<Contact>, ContactError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Ok(contacts) => Ok(contacts.clone()),
                Err(status) => Err(ContactError::Status {
                    source_name: self.name,
                    status: *status,
                    message: "down".into(),
                }),
            }
        }
    }

    fn fake(name: &'static str, result: Result<Vec<Contact>, u16>) -> (Box<dyn ContactSource>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(FakeSource {
                name,
                result,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[test]
    fn test_guess_domain() {
        assert_eq!(guess_domain("Acme Robotics, Inc.").as_deref(), Some("acmerobotics.com"));
        assert_eq!(guess_domain("Globex Corporation").as_deref(), Some("globex.com"));
        assert_eq!(guess_domain("Initech LLC").as_deref(), Some("initech.com"));
        assert_eq!(guess_domain("Stark Industries Ltd").as_deref(), Some("starkindustries.com"));
        assert_eq!(guess_domain("Unknown"), None);
        assert_eq!(guess_domain(" , Inc."), None);
    }

    #[test]
    fn test_rank_contacts() {
        let ranked = rank_contacts(vec![
            contact("jobs@acme.com", 0.3, "pattern"),
            contact("Jane@Acme.com", 0.9, "hunter.io"),
            contact("jane@acme.com", 0.5, "apollo.io"),
            contact("not-an-email", 1.0, "apollo.io"),
        ]);
        let emails: Vec<&str> = ranked.iter().map(|c| c.email.as_str()).collect();
        assert_eq!(emails, vec!["Jane@Acme.com", "jobs@acme.com"]);
    }

    #[tokio::test]
    async fn test_first_source_with_results_wins() {
        let pool = memory_pool().await;
        let (failing, failing_calls) = fake("hunter.io", Err(503));
        let (empty, empty_calls) = fake("apollo.io", Ok(vec![]));
        let (good, good_calls) = fake("pattern", Ok(vec![contact("careers@acme.com", 0.3, "pattern")]));
        let (never, never_calls) = fake("extra", Ok(vec![contact("x@acme.com", 1.0, "extra")]));
        let finder = ContactFinder::with_sources(vec![failing, empty, good, never], 30);

        let search = finder.search(&pool, "Acme", None).await.unwrap();
        assert_eq!(search.domain, "acme.com");
        assert_eq!(search.source.as_deref(), Some("pattern"));
        assert_eq!(search.contacts[0].email, "careers@acme.com");
        assert!(!search.cached);
        assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(empty_calls.load(Ordering::SeqCst), 1);
        assert_eq!(good_calls.load(Ordering::SeqCst), 1);
        assert_eq!(never_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_search_served_from_cache() {
        let pool = memory_pool().await;
        let (source, calls) = fake("hunter.io", Ok(vec![contact("jane@acme.com", 0.9, "hunter.io")]));
        let finder = ContactFinder::with_sources(vec![source], 30);

        finder.search(&pool, "Acme", Some("acme.com")).await.unwrap();
        let again = finder.search(&pool, "Acme", Some("ACME.com")).await.unwrap();
        assert!(again.cached);
        assert_eq!(again.source.as_deref(), Some("hunter.io"));
        assert_eq!(again.contacts[0].email, "jane@acme.com");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_company_has_no_domain() {
        let pool = memory_pool().await;
        let finder = ContactFinder::with_sources(vec![Box::new(patterns::PatternSource)], 30);
        let err = finder.search(&pool, "Unknown", None).await.unwrap_err();
        assert!(matches!(err, AppError::Contact(ContactError::NoDomain(_))));
    }

    #[tokio::test]
    async fn test_from_config_orders_sources() {
        let config = crate::test_support::test_config(&[("APOLLO_IO_API_KEY", "apollo-key")]);
        let finder = ContactFinder::from_config(&config.contacts).unwrap();
        assert_eq!(finder.source_names(), vec!["apollo.io", "pattern"]);
    }

    #[tokio::test]
    async fn test_find_contact_for_job_advances() {
        let pool = memory_pool().await;
        let InsertOutcome::Inserted(id) =
            insert_job(&pool, &posting("https://example.com/c", "Rust Engineer", "Acme Inc"))
                .await
                .unwrap()
        else {
            panic!("duplicate");
        };
        record_verdict(&pool, id, Verdict::Accept, 0.9, "fit").await.unwrap();
        artifacts::attach_resume(
            &pool,
            id,
            artifacts::NewResume {
                markdown: "# Ada",
                skills_emphasized: &[],
                notes: None,
                confidence: 0.5,
            },
        )
        .await
        .unwrap();

        let finder = ContactFinder::with_sources(vec![Box::new(patterns::PatternSource)], 30);
        let job = get_job(&pool, id).await.unwrap();
        let best = find_contact_for_job(&pool, &finder, &job).await.unwrap();
        assert_eq!(best.email, "careers@acme.com");

        let job = get_job(&pool, id).await.unwrap();
        assert_eq!(job.status, JobStatus::ContactFound);
        let stored = artifacts::get_contact(&pool, job.contact_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.email, "careers@acme.com");
        assert_eq!(stored.source, "pattern");
    }

    #[tokio::test]
    async fn test_no_contacts_is_a_step_failure() {
        let pool = memory_pool().await;
        let InsertOutcome::Inserted(id) =
            insert_job(&pool, &posting("https://example.com/d", "Rust Engineer", "Acme"))
                .await
                .unwrap()
        else {
            panic!("duplicate");
        };
        let (empty, _) = fake("hunter.io", Ok(vec![]));
        let finder = ContactFinder::with_sources(vec![empty], 30);
        let job = get_job(&pool, id).await.unwrap();
        let err = find_contact_for_job(&pool, &finder, &job).await.unwrap_err();
        assert!(matches!(err, AppError::Contact(ContactError::NotFound(_))));
        assert_eq!(get_job(&pool, id).await.unwrap().status, JobStatus::New);
    }
}
