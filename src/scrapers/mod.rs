pub mod browser;
pub mod crawler;
pub mod dedup;
pub mod extractor;
pub mod session;
pub mod traits;
pub mod types;

pub use browser::{HeadlessSession, ZapScraper};
pub use crawler::{CrawlController, CrawlOutcome, CrawlSession, CrawlState};
pub use dedup::{Deduplicator, DegeneratePolicy, DuplicateStats, Fingerprint};
pub use extractor::RecordExtractor;
pub use session::{ControlHandle, PageSession};
pub use traits::ScraperTrait;
pub use types::{ControlLookup, CrawlParams, SiteSelectors};
