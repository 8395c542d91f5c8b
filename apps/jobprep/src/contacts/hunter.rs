use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{rate_limiter, Contact, ContactError, ContactSource, DirectRateLimiter};

/// Free tier allows far more; kept low so a batch cannot burn the monthly quota.
const REQUESTS_PER_MINUTE: u32 = 30;
const RESULT_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
struct DomainSearchResponse {
    data: Option<DomainSearchData>,
}

#[derive(Debug, Deserialize)]
struct DomainSearchData {
    organization: Option<String>,
    #[serde(default)]
    emails: Vec<HunterEmail>,
}

#[derive(Debug, Deserialize)]
struct HunterEmail {
    value: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    position: Option<String>,
    /// 0 - 100
    confidence: Option<f64>,
    verification: Option<Verification>,
}

#[derive(Debug, Deserialize)]
struct Verification {
    result: Option<String>,
}

/// Hunter.io domain search.
pub struct HunterSource {
    client: Client,
    base_url: String,
    api_key: String,
    limiter: Arc<DirectRateLimiter>,
}

impl HunterSource {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ContactError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(20)).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            limiter: rate_limiter(REQUESTS_PER_MINUTE),
        })
    }
}

#[async_trait]
impl ContactSource for HunterSource {
    fn name(&self) -> &'static str {
        "hunter.io"
    }

    async fn find(&self, company: &str, domain: &str) -> Result<Vec<Contact>, ContactError> {
        self.limiter.until_ready().await;

        let limit = RESULT_LIMIT.to_string();
        let response = self
            .client
            .get(format!("{}/domain-search", self.base_url))
            .query(&[
                ("domain", domain),
                ("api_key", self.api_key.as_str()),
                ("limit", limit.as_str()),
                ("type", "personal"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ContactError::Status {
                source_name: self.name(),
                status: status.as_u16(),
                message,
            });
        }

        let body: DomainSearchResponse = response.json().await?;
        let Some(data) = body.data else {
            return Ok(Vec::new());
        };
        let organization = data.organization.unwrap_or_else(|| company.to_string());

        Ok(data
            .emails
            .into_iter()
            .filter_map(|e| {
                let email = e.value.filter(|v| !v.trim().is_empty())?;
                let name = [e.first_name, e.last_name]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                Some(Contact {
                    name: Some(name).filter(|n| !n.trim().is_empty()),
                    email,
                    title: e.position,
                    company: organization.clone(),
                    domain: domain.to_string(),
                    confidence: (e.confidence.unwrap_or(0.0) / 100.0).clamp(0.0, 1.0),
                    source: "hunter.io".to_string(),
                    verified: e
                        .verification
                        .and_then(|v| v.result)
                        .is_some_and(|r| r == "deliverable"),
                })
            })
            .collect())
    }
}
