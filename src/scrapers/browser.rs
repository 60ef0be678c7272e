use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use rand::Rng;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::scrapers::crawler::{CrawlController, CrawlOutcome};
use crate::scrapers::session::{ControlHandle, PageSession};
use crate::scrapers::traits::ScraperTrait;
use crate::scrapers::types::{ControlLookup, CrawlParams, SiteSelectors};

/// [`PageSession`] backed by a headless Chrome tab.
pub struct HeadlessSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

/// Quote `value` as a JavaScript string literal.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

impl HeadlessSession {
    /// Launch Chrome and open a blank tab.
    pub fn launch(headless: bool) -> Result<Self> {
        info!(headless, "Launching Chrome...");

        let mut rng = rand::rng();
        let window = (rng.random_range(1050..=1200), rng.random_range(800..=960));

        let options = LaunchOptions::default_builder()
            .headless(headless)
            .window_size(Some(window))
            .idle_browser_timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
        let tab = browser.new_tab().context("Failed to open browser tab")?;

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    fn probe(&self) -> bool {
        self.tab.evaluate("1", false).is_ok()
    }

    /// Classify a driver error: a dead tab is fatal, anything else is local.
    fn classify(
        &self,
        err: anyhow::Error,
        local: impl FnOnce(String) -> SessionError,
    ) -> SessionError {
        if self.probe() {
            local(format!("{err:#}"))
        } else {
            SessionError::Disconnected(format!("{err:#}"))
        }
    }

    fn evaluate(&self, script: &str) -> Result<Option<serde_json::Value>, SessionError> {
        self.tab
            .evaluate(script, false)
            .map(|object| object.value)
            .map_err(|e| self.classify(e, SessionError::Script))
    }

    fn locate(&self, lookup: &ControlLookup) -> Option<Element<'_>> {
        if let Some(css) = lookup.css() {
            return self.tab.find_element(&css).ok();
        }
        lookup
            .xpath()
            .and_then(|xpath| self.tab.find_element_by_xpath(&xpath).ok())
    }

    fn resolve(&self, control: &ControlHandle) -> Result<Element<'_>, SessionError> {
        match self.locate(&control.lookup) {
            Some(element) => Ok(element),
            None if self.probe() => Err(SessionError::Element(format!(
                "control {:?} is no longer on the page",
                control.lookup
            ))),
            None => Err(SessionError::Disconnected("tab stopped responding".to_string())),
        }
    }

    fn attributes(&self, control: &ControlHandle) -> Result<Vec<(String, String)>, SessionError> {
        let element = self.resolve(control)?;
        let flat = element
            .get_attributes()
            .map_err(|e| self.classify(e, SessionError::Element))?
            .unwrap_or_default();
        Ok(flat
            .chunks(2)
            .map(|pair| (pair[0].clone(), pair.get(1).cloned().unwrap_or_default()))
            .collect())
    }
}

impl PageSession for HeadlessSession {
    fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ())
            .map_err(|e| {
                self.classify(e, |reason| SessionError::Navigation {
                    url: url.to_string(),
                    reason,
                })
            })
    }

    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<(), SessionError> {
        match self.tab.wait_for_element_with_custom_timeout(selector, timeout) {
            Ok(_) => Ok(()),
            Err(e) => Err(self.classify(e, |_| SessionError::Timeout {
                selector: selector.to_string(),
                timeout,
            })),
        }
    }

    fn execute_script(&mut self, script: &str) -> Result<(), SessionError> {
        self.evaluate(script).map(|_| ())
    }

    fn count_elements(&mut self, selector: &str) -> Result<usize, SessionError> {
        let script = format!("document.querySelectorAll({}).length", js_string(selector));
        let count = self
            .evaluate(&script)?
            .and_then(|value| value.as_u64())
            .unwrap_or(0);
        Ok(count as usize)
    }

    fn element_markup(&mut self, selector: &str, index: usize) -> Result<String, SessionError> {
        let script = format!(
            "(() => {{ const el = document.querySelectorAll({})[{index}]; return el ? el.outerHTML : null; }})()",
            js_string(selector)
        );
        match self.evaluate(&script)? {
            Some(serde_json::Value::String(html)) => Ok(html),
            _ => Err(SessionError::Element(format!("no element #{index} for `{selector}`"))),
        }
    }

    fn find_control(
        &mut self,
        lookups: &[ControlLookup],
    ) -> Result<Option<ControlHandle>, SessionError> {
        for lookup in lookups {
            if self.locate(lookup).is_some() {
                debug!(?lookup, "Found control");
                return Ok(Some(ControlHandle {
                    lookup: lookup.clone(),
                }));
            }
        }
        if self.probe() {
            Ok(None)
        } else {
            Err(SessionError::Disconnected("tab stopped responding".to_string()))
        }
    }

    fn is_enabled(&mut self, control: &ControlHandle) -> Result<bool, SessionError> {
        let attributes = self.attributes(control)?;
        let disabled = attributes.iter().any(|(name, value)| {
            name == "disabled" || (name == "aria-disabled" && value == "true")
        });
        Ok(!disabled)
    }

    fn has_class(&mut self, control: &ControlHandle, class: &str) -> Result<bool, SessionError> {
        let attributes = self.attributes(control)?;
        Ok(attributes
            .iter()
            .filter(|(name, _)| name == "class")
            .any(|(_, value)| value.split_whitespace().any(|c| c == class)))
    }

    fn click(&mut self, control: &ControlHandle) -> Result<(), SessionError> {
        let element = self.resolve(control)?;
        element
            .scroll_into_view()
            .map_err(|e| self.classify(e, SessionError::Element))?;
        thread::sleep(Duration::from_millis(rand::rng().random_range(1000..=2000)));
        element
            .click()
            .map(|_| ())
            .map_err(|e| self.classify(e, SessionError::Element))
    }

    fn is_alive(&mut self) -> bool {
        self.probe()
    }
}

/// Zap Imóveis crawler running in its own Chrome instance.
#[derive(Debug, Clone)]
pub struct ZapScraper {
    url: String,
    max_pages: u32,
    selectors: SiteSelectors,
    params: CrawlParams,
    headless: bool,
    cancel: Arc<AtomicBool>,
}

impl ZapScraper {
    pub fn new(url: impl Into<String>, max_pages: u32) -> Self {
        Self {
            url: url.into(),
            max_pages,
            selectors: SiteSelectors::default(),
            params: CrawlParams::default(),
            headless: true,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_selectors(mut self, selectors: SiteSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_params(mut self, params: CrawlParams) -> Self {
        self.params = params;
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Launch a browser and crawl on the current thread.
    pub fn crawl_blocking(&self) -> Result<CrawlOutcome> {
        let mut session = HeadlessSession::launch(self.headless)?;
        let controller =
            CrawlController::new(&mut session, self.selectors.clone(), self.params.clone())?
                .with_cancel(Arc::clone(&self.cancel));
        Ok(controller.run(&self.url, self.max_pages))
    }
}

#[async_trait]
impl ScraperTrait for ZapScraper {
    async fn scrape(&self) -> Result<CrawlOutcome> {
        let scraper = self.clone();
        tokio::task::spawn_blocking(move || scraper.crawl_blocking())
            .await
            .context("Crawl worker stopped unexpectedly")?
    }

    fn source_name(&self) -> &'static str {
        "Zap Imóveis"
    }
}
