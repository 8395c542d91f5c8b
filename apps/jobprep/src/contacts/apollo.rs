use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::patterns::person_addresses;
use super::{rate_limiter, Contact, ContactError, ContactSource, DirectRateLimiter};

const REQUESTS_PER_MINUTE: u32 = 60;
const PER_PAGE: u32 = 10;
const CONFIDENCE: f64 = 0.8;
const PERSON_TITLES: [&str; 8] = [
    "CEO",
    "CTO",
    "VP",
    "Director",
    "Manager",
    "Lead",
    "Founder",
    "Hiring Manager",
];

#[derive(Debug, Deserialize)]
struct PeopleSearchResponse {
    #[serde(default)]
    people: Vec<Person>,
}

#[derive(Debug, Deserialize)]
struct Person {
    name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    title: Option<String>,
    email: Option<String>,
    organization: Option<Organization>,
}

#[derive(Debug, Deserialize)]
struct Organization {
    name: Option<String>,
}

/// Apollo.io people search.
pub struct ApolloSource {
    client: Client,
    base_url: String,
    api_key: String,
    limiter: Arc<DirectRateLimiter>,
}

impl ApolloSource {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ContactError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(20)).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            limiter: rate_limiter(REQUESTS_PER_MINUTE),
        })
    }
}

/// Apollo masks addresses it has not unlocked with a placeholder.
fn usable_email(email: Option<String>) -> Option<String> {
    email.filter(|e| e.contains('@') && !e.starts_with("email_not_unlocked"))
}

#[async_trait]
impl ContactSource for ApolloSource {
    fn name(&self) -> &'static str {
        "apollo.io"
    }

    async fn find(&self, company: &str, domain: &str) -> Result<Vec<Contact>, ContactError> {
        self.limiter.until_ready().await;

        let response = self
            .client
            .post(format!("{}/mixed_people/search", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .header("Cache-Control", "no-cache")
            .json(&json!({
                "q_organization_domains": domain,
                "page": 1,
                "per_page": PER_PAGE,
                "person_titles": PERSON_TITLES,
            }))
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

        let body: PeopleSearchResponse = response.json().await?;
        let mut contacts = Vec::new();
        for person in body.people {
            let company_name = person
                .organization
                .and_then(|o| o.name)
                .unwrap_or_else(|| company.to_string());
            let name = person.name.clone().or_else(|| {
                let joined = [person.first_name.clone(), person.last_name.clone()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                Some(joined).filter(|n| !n.is_empty())
            });

            let (email, confidence, source) = match usable_email(person.email) {
                Some(email) => (email, CONFIDENCE, "apollo.io"),
                // A named person without an unlocked address still beats a generic inbox.
                None => match (&person.first_name, &person.last_name) {
                    (Some(first), Some(last)) => match person_addresses(first, last, domain).into_iter().next() {
                        Some(guess) => (guess, super::patterns::PERSON_CONFIDENCE, "pattern"),
                        None => continue,
                    },
                    _ => continue,
                },
            };

            contacts.push(Contact {
                name,
                email,
                title: person.title,
                company: company_name,
                domain: domain.to_string(),
                confidence,
                source: source.to_string(),
                verified: false,
            });
        }
        Ok(contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_stub;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::Value;

    #[tokio::test]
    async fn test_people_search_parsed() {
        let router = Router::new().route(
            "/mixed_people/search",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers.get("x-api-key").and_then(|v| v.to_str().ok()), Some("ak"));
                assert_eq!(body["q_organization_domains"], "acme.com");
                assert_eq!(body["per_page"], 10);
                Json(json!({
                    "people": [
                        {
                            "name": "Sam Lee", "title": "CTO",
                            "email": "sam@acme.com",
                            "organization": { "name": "Acme Robotics" }
                        },
                        {
                            "first_name": "Rita", "last_name": "Ortiz", "title": "Hiring Manager",
                            "email": "email_not_unlocked@domain.com"
                        },
                        { "name": "No Details" }
                    ]
                }))
            }),
        );
        let source = ApolloSource::new(&spawn_stub(router).await, "ak").unwrap();

        let found = source.find("Acme", "acme.com").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].email, "sam@acme.com");
        assert_eq!(found[0].company, "Acme Robotics");
        assert_eq!(found[0].confidence, 0.8);
        assert_eq!(found[0].source, "apollo.io");
        assert_eq!(found[1].email, "rita.ortiz@acme.com");
        assert_eq!(found[1].name.as_deref(), Some("Rita Ortiz"));
        assert_eq!(found[1].source, "pattern");
        assert_eq!(found[1].confidence, 0.4);
    }

    #[tokio::test]
    async fn test_error_status_surfaces() {
        let router = Router::new().route(
            "/mixed_people/search",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let source = ApolloSource::new(&spawn_stub(router).await, "ak").unwrap();
        let err = source.find("Acme", "acme.com").await.unwrap_err();
        assert!(matches!(err, ContactError::Status { status: 429, .. }));
    }
}
