use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::contacts::ContactFinder;
use crate::feed::FeedReader;
use crate::llm_client::LlmClient;

/// Shared application state injected into all route handlers via Axum extractors.
/// The CLI commands build the same state and hand it to the pipeline.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub llm: LlmClient,
    pub config: Config,
    /// Contact sources in priority order; only keyed APIs are present.
    pub finder: Arc<ContactFinder>,
    pub reader: FeedReader,
}

impl AppState {
    pub fn new(config: Config, db: SqlitePool) -> Result<Self> {
        let llm = LlmClient::from_config(&config.llm)?;
        info!("LLM client initialized ({}: {})", llm.backend_name(), llm.model());

        let finder = ContactFinder::from_config(&config.contacts)?;
        info!("Contact sources: {}", finder.source_names().join(" -> "));

        let reader = FeedReader::new(&config.scrape)?;

        Ok(Self {
            db,
            llm,
            config,
            finder: Arc::new(finder),
            reader,
        })
    }
}
