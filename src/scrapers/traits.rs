use crate::scrapers::crawler::CrawlOutcome;
use anyhow::Result;
use async_trait::async_trait;

/// Common trait for all listing scrapers
/// Each implementation owns its own browser session for the duration of a call
#[async_trait]
pub trait ScraperTrait: Send + Sync {
    /// Crawl the source; partial results come back as a successful outcome
    async fn scrape(&self) -> Result<CrawlOutcome>;

    /// Get the name of the scraper source
    fn source_name(&self) -> &'static str;
}
