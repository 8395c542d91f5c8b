//! Feed reader: pulls job listings from LinkedIn search feeds into the ledger.

pub mod extract;
pub mod parse;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::config::ScrapeConfig;
use crate::errors::AppError;
use crate::ledger::{self, InsertOutcome};
use crate::models::JobPosting;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed returned status {0}")]
    Status(u16),

    #[error("Could not parse feed: {0}")]
    Parse(String),

    #[error("Invalid feed URL: {0}")]
    Url(#[from] url::ParseError),
}

/// One saved search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keywords: String,
    #[serde(default)]
    pub location: String,
    /// LinkedIn `f_E` experience filter (1 = internship .. 6 = executive).
    #[serde(default)]
    pub experience_level: String,
    /// LinkedIn `f_JT` job type filter (F, P, C, T, I).
    #[serde(default)]
    pub job_type: String,
}

impl SearchQuery {
    pub fn new(keywords: &str, location: &str) -> Self {
        Self {
            keywords: keywords.trim().to_string(),
            location: location.trim().to_string(),
            ..Default::default()
        }
    }

    /// Parses `keywords|location|f_E|f_JT;keywords|location;...`.
    /// Entries without keywords are dropped.
    pub fn parse_list(raw: &str) -> Vec<SearchQuery> {
        raw.split(';')
            .filter_map(|entry| {
                let mut parts = entry.split('|').map(str::trim);
                let keywords = parts.next().filter(|k| !k.is_empty())?;
                let mut query = SearchQuery::new(keywords, parts.next().unwrap_or_default());
                query.experience_level = parts.next().unwrap_or_default().to_string();
                query.job_type = parts.next().unwrap_or_default().to_string();
                Some(query)
            })
            .collect()
    }

    /// Guest job-search URL with empty parameters omitted.
    pub fn build_url(&self, base_url: &str) -> Result<String, FeedError> {
        let mut url = Url::parse(base_url)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in [
                ("keywords", self.keywords.as_str()),
                ("location", self.location.as_str()),
                ("f_E", self.experience_level.as_str()),
                ("f_JT", self.job_type.as_str()),
                ("start", "0"),
                ("count", "25"),
            ] {
                if !value.is_empty() {
                    pairs.append_pair(key, value);
                }
            }
        }
        Ok(url.to_string())
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ScrapeReport {
    pub searches: usize,
    pub scraped: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub errors: Vec<String>,
}

/// Rate-limited HTTP reader for listing feeds.
#[derive(Clone)]
pub struct FeedReader {
    client: Client,
    limiter: Arc<DirectRateLimiter>,
    base_url: String,
}

impl FeedReader {
    pub fn new(config: &ScrapeConfig) -> Result<Self, FeedError> {
        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            client: Client::builder()
                .user_agent(&config.user_agent)
                .timeout(Duration::from_secs(30))
                .build()?,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
            base_url: config.linkedin_base_url.clone(),
        })
    }

    pub fn search_url(&self, search: &SearchQuery) -> Result<String, FeedError> {
        search.build_url(&self.base_url)
    }

    /// Fetches one listing URL and parses every usable entry.
    pub async fn fetch(&self, url: &str) -> Result<Vec<JobPosting>, FeedError> {
        self.limiter.until_ready().await;
        info!("Fetching job feed: {url}");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }
        let body = response.text().await?;

        let postings = parse::parse_listing(&body, url)?;
        info!("Parsed {} postings from {url}", postings.len());
        Ok(postings)
    }
}

/// Runs every search and records new postings. A failing search is logged
/// and reported; the remaining searches still run.
pub async fn scrape_into_ledger(
    pool: &SqlitePool,
    reader: &FeedReader,
    searches: &[SearchQuery],
    max_jobs: usize,
) -> Result<ScrapeReport, AppError> {
    let mut report = ScrapeReport {
        searches: searches.len(),
        ..Default::default()
    };

    for search in searches {
        if report.scraped >= max_jobs {
            break;
        }
        let postings = match reader.search_url(search) {
            Ok(url) => reader.fetch(&url).await,
            Err(e) => Err(e),
        };
        let postings = match postings {
            Ok(p) => p,
            Err(e) => {
                warn!("Search '{}' failed: {e}", search.keywords);
                report.errors.push(format!("{}: {e}", search.keywords));
                continue;
            }
        };

        for posting in postings.into_iter().take(max_jobs - report.scraped) {
            report.scraped += 1;
            match ledger::insert_job(pool, &posting).await? {
                InsertOutcome::Inserted(_) => report.inserted += 1,
                InsertOutcome::Duplicate => report.duplicates += 1,
            }
        }
    }

    info!(
        "Scrape finished: {} scraped, {} new, {} duplicates",
        report.scraped, report.inserted, report.duplicates
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_pool, spawn_stub, test_config};
    use axum::{extract::Query, http::StatusCode, routing::get, Router};
    use std::collections::HashMap;

    fn cards(ids: &[u64]) -> String {
        ids.iter()
            .map(|id| {
                format!(
                    r#"<li><div class="base-card"><a class="base-card__full-link" href="https://www.linkedin.com/jobs/view/{id}/?trk=x"></a>
                    <h3 class="base-search-card__title">Engineer {id}</h3>
                    <h4 class="base-search-card__subtitle">Company {id}</h4></div></li>"#
                )
            })
            .collect()
    }

    #[test]
    fn test_build_url_drops_empty_params() {
        let query = SearchQuery::new("rust engineer", "");
        let url = query
            .build_url("https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search")
            .unwrap();
        assert_eq!(
            url,
            "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search?keywords=rust+engineer&start=0&count=25"
        );
    }

    #[test]
    fn test_build_url_with_filters() {
        let query = SearchQuery {
            keywords: "backend".into(),
            location: "New York, NY".into(),
            experience_level: "4".into(),
            job_type: "F".into(),
        };
        let url = query.build_url("https://example.com/search").unwrap();
        assert!(url.contains("location=New+York%2C+NY"));
        assert!(url.contains("f_E=4"));
        assert!(url.contains("f_JT=F"));
    }

    #[test]
    fn test_parse_list() {
        let searches = SearchQuery::parse_list("rust|Berlin|4|F; |ignored ;go developer");
        assert_eq!(searches.len(), 2);
        assert_eq!(searches[0].experience_level, "4");
        assert_eq!(searches[0].job_type, "F");
        assert_eq!(searches[1].keywords, "go developer");
        assert_eq!(searches[1].location, "");
    }

    #[tokio::test]
    async fn test_scrape_into_ledger_dedupes() {
        let router = Router::new().route(
            "/search",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                match q.get("keywords").map(String::as_str) {
                    Some("rust") => (StatusCode::OK, cards(&[1, 2, 3])),
                    Some("go") => (StatusCode::OK, cards(&[3, 4])),
                    _ => (StatusCode::TOO_MANY_REQUESTS, String::new()),
                }
            }),
        );
        let base = spawn_stub(router).await;
        let search_url = format!("{base}/search");
        let config = test_config(&[("LINKEDIN_SEARCH_URL", search_url.as_str())]);
        let reader = FeedReader::new(&config.scrape).unwrap();
        let pool = memory_pool().await;

        let searches = vec![
            SearchQuery::new("rust", ""),
            SearchQuery::new("blocked", ""),
            SearchQuery::new("go", ""),
        ];
        let report = scrape_into_ledger(&pool, &reader, &searches, 50).await.unwrap();
        assert_eq!(report.scraped, 5);
        assert_eq!(report.inserted, 4);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("429"));

        // running the same searches again adds nothing
        let again = scrape_into_ledger(&pool, &reader, &searches, 50).await.unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.duplicates, 5);
    }

    #[tokio::test]
    async fn test_scrape_respects_max_jobs() {
        let router = Router::new().route("/search", get(|| async { cards(&[10, 11, 12]) }));
        let base = spawn_stub(router).await;
        let search_url = format!("{base}/search");
        let config = test_config(&[("LINKEDIN_SEARCH_URL", search_url.as_str())]);
        let reader = FeedReader::new(&config.scrape).unwrap();
        let pool = memory_pool().await;

        let report = scrape_into_ledger(&pool, &reader, &[SearchQuery::new("any", "")], 2)
            .await
            .unwrap();
        assert_eq!(report.scraped, 2);
        assert_eq!(ledger::stats(&pool).await.unwrap().total, 2);
    }
}
