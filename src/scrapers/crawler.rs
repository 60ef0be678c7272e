use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::error::{ConfigError, SessionError};
use crate::models::ListingRecord;
use crate::scrapers::dedup::{Deduplicator, DuplicateStats};
use crate::scrapers::extractor::RecordExtractor;
use crate::scrapers::session::{ControlHandle, PageSession};
use crate::scrapers::types::{CrawlParams, SiteSelectors};
use crate::storage;

const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// Per-page lifecycle of a crawl.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlState {
    Loading,
    WaitingForContent,
    Scrolling,
    Extracting,
    LocatingNext,
    Paginating(ControlHandle),
    Done,
    Aborted { reason: String },
}

impl CrawlState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlState::Done | CrawlState::Aborted { .. })
    }
}

/// State owned by one crawl run. Nothing here outlives the run.
#[derive(Debug)]
pub struct CrawlSession {
    pub url: String,
    pub max_pages: u32,
    pub page: u32,
    pub pages_processed: u32,
    pub records: Vec<ListingRecord>,
    navigated: bool,
    recovered_from: Option<u32>,
    dedup: Deduplicator,
}

impl CrawlSession {
    pub fn new(url: impl Into<String>, max_pages: u32, dedup: Deduplicator) -> Self {
        Self {
            url: url.into(),
            max_pages,
            page: 1,
            pages_processed: 0,
            records: Vec::new(),
            navigated: false,
            recovered_from: None,
            dedup,
        }
    }

    /// Register the record and keep it unless it was seen before.
    pub fn insert(&mut self, record: ListingRecord) -> bool {
        if self.dedup.is_duplicate(&record) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn duplicate_stats(&self) -> DuplicateStats {
        self.dedup.stats()
    }
}

/// What a crawl hands back, whether it finished or not.
#[derive(Debug)]
pub struct CrawlOutcome {
    pub url: String,
    pub state: CrawlState,
    pub records: Vec<ListingRecord>,
    pub pages_processed: u32,
    pub duplicates: DuplicateStats,
    pub persisted: Option<PathBuf>,
}

impl CrawlOutcome {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.state, CrawlState::Aborted { .. })
    }

    pub fn status(&self) -> &'static str {
        match self.state {
            CrawlState::Aborted { .. } => "aborted",
            _ => "done",
        }
    }
}

/// Drives one page session through the paginated results of a search.
pub struct CrawlController<'a, S: PageSession> {
    session: &'a mut S,
    selectors: SiteSelectors,
    extractor: RecordExtractor,
    params: CrawlParams,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, S: PageSession> CrawlController<'a, S> {
    pub fn new(
        session: &'a mut S,
        selectors: SiteSelectors,
        params: CrawlParams,
    ) -> Result<Self, ConfigError> {
        let extractor = RecordExtractor::new(&selectors)?;
        Ok(Self {
            session,
            selectors,
            extractor,
            params,
            cancel: None,
        })
    }

    /// Stop at the next page boundary once `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Crawl up to `max_pages` pages starting at `url`.
    ///
    /// Never fails: whatever was collected before an abort is returned and,
    /// when an output directory is configured, written to disk.
    pub fn run(mut self, url: &str, max_pages: u32) -> CrawlOutcome {
        let dedup =
            Deduplicator::with_policy(&self.selectors.boilerplate, self.params.degenerate_policy);
        let mut crawl = CrawlSession::new(url, max_pages.max(1), dedup);
        let mut state = CrawlState::Loading;

        info!(url, max_pages = crawl.max_pages, "Starting crawl");

        while !state.is_terminal() {
            state = match self.step(&mut crawl, state) {
                Ok(next) => next,
                Err(err) => self.recover(&mut crawl, err),
            };
        }

        self.finish(crawl, state)
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn step(
        &mut self,
        crawl: &mut CrawlSession,
        state: CrawlState,
    ) -> Result<CrawlState, SessionError> {
        match state {
            CrawlState::Loading => {
                if self.cancelled() {
                    return Ok(CrawlState::Aborted {
                        reason: "crawl cancelled".to_string(),
                    });
                }
                if !self.session.is_alive() {
                    return Ok(CrawlState::Aborted {
                        reason: "browser session is no longer available".to_string(),
                    });
                }
                info!(page = crawl.page, "Processing page");
                if !crawl.navigated {
                    self.session.navigate(&crawl.url)?;
                    crawl.navigated = true;
                }
                Ok(CrawlState::WaitingForContent)
            }

            CrawlState::WaitingForContent => {
                match self
                    .session
                    .wait_for_selector(&self.selectors.listing_card, self.params.content_timeout)
                {
                    Ok(()) => {}
                    Err(SessionError::Timeout { .. }) => {
                        warn!(
                            page = crawl.page,
                            "No listings appeared in time, page is likely empty"
                        );
                    }
                    Err(err) => return Err(err),
                }
                Ok(CrawlState::Scrolling)
            }

            CrawlState::Scrolling => {
                let visible = self.settle()?;
                info!(page = crawl.page, visible, "Listing count settled");
                Ok(CrawlState::Extracting)
            }

            CrawlState::Extracting => {
                self.extract_page(crawl)?;
                crawl.pages_processed += 1;
                Ok(CrawlState::LocatingNext)
            }

            CrawlState::LocatingNext => {
                if crawl.page >= crawl.max_pages {
                    info!(page = crawl.page, "Page budget exhausted");
                    return Ok(CrawlState::Done);
                }
                match self.next_control(crawl)? {
                    Some(control) => Ok(CrawlState::Paginating(control)),
                    None => Ok(CrawlState::Done),
                }
            }

            CrawlState::Paginating(control) => {
                if self.cancelled() {
                    return Ok(CrawlState::Aborted {
                        reason: "crawl cancelled".to_string(),
                    });
                }
                self.session.click(&control)?;
                self.pause(self.settle_delay());
                crawl.page += 1;
                Ok(CrawlState::Loading)
            }

            terminal @ (CrawlState::Done | CrawlState::Aborted { .. }) => Ok(terminal),
        }
    }

    /// The enabled "next" control of the current page, if there is one.
    fn next_control(
        &mut self,
        crawl: &CrawlSession,
    ) -> Result<Option<ControlHandle>, SessionError> {
        let Some(control) = self.session.find_control(&self.selectors.next_page)? else {
            info!(page = crawl.page, "Next page control not found, finishing");
            return Ok(None);
        };
        let enabled = self.session.is_enabled(&control)?
            && !self.session.has_class(&control, &self.selectors.disabled_class)?;
        if !enabled {
            info!(page = crawl.page, "No more pages to process");
            return Ok(None);
        }
        Ok(Some(control))
    }

    /// Scroll until the listing count stops changing for the stability window.
    fn settle(&mut self) -> Result<usize, SessionError> {
        let selector = self.selectors.listing_card.as_str();
        let deadline = Instant::now() + self.params.scroll_timeout;
        let mut last = self.session.count_elements(selector)?;
        let mut stable = 0;

        while stable < self.params.stability_window {
            if Instant::now() >= deadline {
                warn!(visible = last, "Scroll timeout reached before the count settled");
                break;
            }
            self.session.execute_script(SCROLL_SCRIPT)?;
            self.pause(self.params.scroll_poll);

            let count = self.session.count_elements(selector)?;
            debug!(count, "Listings after scroll");
            if count == last {
                stable += 1;
            } else {
                stable = 0;
                last = count;
            }
        }

        Ok(last)
    }

    fn extract_page(&mut self, crawl: &mut CrawlSession) -> Result<(), SessionError> {
        let selector = self.selectors.listing_card.clone();
        let total = self.session.count_elements(&selector)?;
        let before = crawl.records.len();

        for index in 0..total {
            let markup = match self.session.element_markup(&selector, index) {
                Ok(markup) => markup,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(
                        page = crawl.page,
                        index,
                        error = %err,
                        "Could not read listing, skipping"
                    );
                    continue;
                }
            };
            match self.extractor.extract(&markup) {
                Some(record) => {
                    if !crawl.insert(record) {
                        debug!(page = crawl.page, index, "Duplicate listing ignored");
                    }
                }
                None => debug!(page = crawl.page, index, "Listing not extractable"),
            }
        }

        info!(
            page = crawl.page,
            added = crawl.records.len() - before,
            records = crawl.records.len(),
            duplicates = crawl.dedup.duplicates(),
            "Page extracted"
        );
        Ok(())
    }

    /// Navigation-level failures skip to the next page once; a lost session aborts.
    ///
    /// Before the first page loads there is no control to click, so the start
    /// URL is requested again. Afterwards the failed page is left through its
    /// "next" control.
    fn recover(&mut self, crawl: &mut CrawlSession, err: SessionError) -> CrawlState {
        if err.is_fatal() || !self.session.is_alive() {
            error!(page = crawl.page, error = %err, "Browser session lost, aborting crawl");
            return CrawlState::Aborted {
                reason: err.to_string(),
            };
        }
        if crawl.page >= crawl.max_pages {
            warn!(page = crawl.page, error = %err, "Last page failed, finishing with partial data");
            return CrawlState::Done;
        }
        if crawl.recovered_from == Some(crawl.page) {
            warn!(
                page = crawl.page,
                error = %err,
                "Page failed again, finishing with partial data"
            );
            return CrawlState::Done;
        }
        crawl.recovered_from = Some(crawl.page);

        warn!(page = crawl.page, error = %err, "Page failed, moving on to the next one");
        self.pause(self.params.recovery_pause);

        if !crawl.navigated {
            crawl.page += 1;
            return CrawlState::Loading;
        }
        match self.next_control(crawl) {
            Ok(Some(control)) => CrawlState::Paginating(control),
            Ok(None) => CrawlState::Done,
            Err(err) if err.is_fatal() => {
                error!(page = crawl.page, error = %err, "Browser session lost, aborting crawl");
                CrawlState::Aborted {
                    reason: err.to_string(),
                }
            }
            Err(err) => {
                warn!(
                    page = crawl.page,
                    error = %err,
                    "Could not leave the failed page, finishing"
                );
                CrawlState::Done
            }
        }
    }

    fn settle_delay(&self) -> Duration {
        let (min, max) = self.params.settle_delay;
        if max <= min {
            return min;
        }
        let millis = rand::rng().random_range(min.as_millis() as u64..=max.as_millis() as u64);
        Duration::from_millis(millis)
    }

    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }

    fn finish(self, crawl: CrawlSession, state: CrawlState) -> CrawlOutcome {
        let duplicates = crawl.duplicate_stats();
        match &state {
            CrawlState::Aborted { reason } => warn!(
                records = crawl.records.len(),
                pages = crawl.pages_processed,
                reason = reason.as_str(),
                "Crawl aborted, keeping partial results"
            ),
            _ => info!(
                records = crawl.records.len(),
                pages = crawl.pages_processed,
                "Crawl finished"
            ),
        }
        info!(
            unique = duplicates.unique,
            duplicates = duplicates.duplicates,
            degenerate = duplicates.degenerate,
            rate = %format!("{:.1}%", duplicates.duplicate_rate()),
            "Duplicate summary"
        );

        let persisted = match (&self.params.output_dir, crawl.records.is_empty()) {
            (Some(dir), false) => {
                let prefix = if matches!(state, CrawlState::Aborted { .. }) {
                    "listings_partial"
                } else {
                    "listings"
                };
                match storage::persist_timestamped(dir, prefix, &crawl.records) {
                    Ok(path) => Some(path),
                    Err(err) => {
                        error!(error = %err, "Failed to persist collected listings");
                        None
                    }
                }
            }
            (_, true) => {
                warn!(url = crawl.url.as_str(), "No listings were collected");
                None
            }
            (None, false) => None,
        };

        CrawlOutcome {
            url: crawl.url,
            state,
            records: crawl.records,
            pages_processed: crawl.pages_processed,
            duplicates,
            persisted,
        }
    }
}
