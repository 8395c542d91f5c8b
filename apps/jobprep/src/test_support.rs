//! Shared fixtures for in-crate tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::contacts::{patterns::PatternSource, ContactFinder};
use crate::feed::FeedReader;
use crate::llm_client::LlmClient;
use crate::models::JobPosting;
use crate::state::AppState;

/// Single-connection in-memory ledger with migrations applied.
pub async fn memory_pool() -> SqlitePool {
    let options = "sqlite::memory:"
        .parse::<SqliteConnectOptions>()
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    crate::db::migrate(&pool).await.unwrap();
    pool
}

/// Serves `router` on an ephemeral localhost port and returns its base URL.
pub async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Config with a local LLM backend and overrides applied on top of defaults.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut map: HashMap<String, String> = HashMap::from([
        ("USE_LOCAL_LLM".to_string(), "true".to_string()),
        ("USER_NAME".to_string(), "Ada Example".to_string()),
        ("USER_EMAIL".to_string(), "ada@example.dev".to_string()),
        ("SCRAPING_DELAY_SECONDS".to_string(), "0".to_string()),
        ("RATE_LIMIT_REQUESTS_PER_MINUTE".to_string(), "6000".to_string()),
    ]);
    for (k, v) in overrides {
        map.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|k| map.get(k).cloned()).unwrap()
}

pub fn posting(url: &str, title: &str, company: &str) -> JobPosting {
    JobPosting {
        url: url.to_string(),
        external_id: None,
        title: title.to_string(),
        company: company.to_string(),
        location: Some("Remote".to_string()),
        description: format!("{company} is hiring a {title} to build Rust services on Postgres."),
        salary_range: None,
        employment_type: Some("Full-time".to_string()),
        experience_level: None,
        posted_at: None,
        source_feed: None,
    }
}

/// Ollama-shaped LLM whose reply is computed from the user prompt.
pub async fn llm_stub<F>(respond: F) -> LlmClient
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let respond = Arc::new(respond);
    let router = Router::new().route(
        "/api/chat",
        post(move |Json(body): Json<Value>| {
            let respond = respond.clone();
            async move {
                let prompt = body["messages"][1]["content"].as_str().unwrap_or_default();
                Json(json!({
                    "model": "stub",
                    "message": { "role": "assistant", "content": respond(prompt) }
                }))
            }
        }),
    );
    llm_at(spawn_stub(router).await)
}

/// LLM that answers every call with a 500.
pub async fn failing_llm() -> LlmClient {
    let router = Router::new().route(
        "/api/chat",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
    );
    llm_at(spawn_stub(router).await)
}

fn llm_at(base: String) -> LlmClient {
    let config = test_config(&[("OLLAMA_BASE_URL", base.as_str())]);
    LlmClient::from_config(&config.llm)
        .unwrap()
        .with_retry_base(Duration::from_millis(1))
}

/// Full application state on an in-memory ledger. Contacts come from the
/// pattern source only, so nothing leaves the machine.
pub async fn test_state(llm: LlmClient, overrides: &[(&str, &str)]) -> AppState {
    let config = test_config(overrides);
    AppState {
        db: memory_pool().await,
        llm,
        finder: Arc::new(ContactFinder::with_sources(vec![Box::new(PatternSource)], 30)),
        reader: FeedReader::new(&config.scrape).unwrap(),
        config,
    }
}
