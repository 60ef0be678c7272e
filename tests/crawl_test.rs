use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use zap_scout::error::SessionError;
use zap_scout::scrapers::{
    ControlHandle, ControlLookup, CrawlController, CrawlOutcome, CrawlParams, CrawlState,
    DegeneratePolicy, PageSession, SiteSelectors,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Failure {
    /// Rendering error while waiting for content
    Wait,
    /// The browser goes away while counting listings
    Disconnect,
    /// One listing cannot be read
    Markup(usize),
    /// The "next" control does not respond
    Click,
}

#[derive(Debug, Clone)]
struct Next {
    disabled: bool,
    class: String,
    /// The only lookup that resolves this control
    found_by: ControlLookup,
}

impl Next {
    fn enabled() -> Self {
        Self {
            disabled: false,
            class: "pagination-button".to_string(),
            found_by: SiteSelectors::default().next_page[0].clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Page {
    cards: Vec<String>,
    initially_visible: Option<usize>,
    reveal_per_scroll: usize,
    next: Option<Next>,
    failures: Vec<Failure>,
}

impl Page {
    fn with_cards(cards: Vec<String>) -> Self {
        Self {
            cards,
            ..Self::default()
        }
    }

    fn with_next(mut self) -> Self {
        self.next = Some(Next::enabled());
        self
    }

    fn failing(mut self, failure: Failure) -> Self {
        self.failures.push(failure);
        self
    }
}

/// Scripted stand-in for a browser tab.
struct FakeSession {
    pages: Vec<Page>,
    current: usize,
    visible: usize,
    alive: bool,
    fail_navigation: usize,
    navigations: usize,
    clicks: usize,
    lookups_tried: Vec<ControlLookup>,
}

impl FakeSession {
    fn new(pages: Vec<Page>) -> Self {
        Self {
            pages,
            current: 0,
            visible: 0,
            alive: true,
            fail_navigation: 0,
            navigations: 0,
            clicks: 0,
            lookups_tried: Vec::new(),
        }
    }

    fn page(&self) -> &Page {
        &self.pages[self.current]
    }

    fn show_current(&mut self) {
        let page = self.page();
        let visible = page.initially_visible.unwrap_or(page.cards.len());
        self.visible = visible;
    }

    /// Each scripted failure fires once, then the page behaves.
    fn take_failure(&mut self, matches: impl Fn(Failure) -> bool) -> Option<Failure> {
        let failures = &mut self.pages[self.current].failures;
        let position = failures.iter().position(|f| matches(*f))?;
        Some(failures.remove(position))
    }

    fn control(&self, handle: &ControlHandle) -> Option<&Next> {
        self.page().next.as_ref().filter(|n| n.found_by == handle.lookup)
    }

    fn ensure_alive(&self) -> Result<(), SessionError> {
        if self.alive {
            Ok(())
        } else {
            Err(SessionError::Disconnected("window closed".into()))
        }
    }
}

impl PageSession for FakeSession {
    fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.ensure_alive()?;
        self.navigations += 1;
        if self.fail_navigation > 0 {
            self.fail_navigation -= 1;
            return Err(SessionError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_RESET".into(),
            });
        }
        self.current = 0;
        self.show_current();
        Ok(())
    }

    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<(), SessionError> {
        self.ensure_alive()?;
        if self.take_failure(|f| f == Failure::Wait).is_some() {
            return Err(SessionError::Script("renderer crashed".into()));
        }
        if self.page().cards.is_empty() {
            return Err(SessionError::Timeout {
                selector: selector.to_string(),
                timeout,
            });
        }
        Ok(())
    }

    fn execute_script(&mut self, _script: &str) -> Result<(), SessionError> {
        self.ensure_alive()?;
        let total = self.page().cards.len();
        self.visible = (self.visible + self.page().reveal_per_scroll).min(total);
        Ok(())
    }

    fn count_elements(&mut self, _selector: &str) -> Result<usize, SessionError> {
        if self.take_failure(|f| f == Failure::Disconnect).is_some() {
            self.alive = false;
        }
        self.ensure_alive()?;
        Ok(self.visible)
    }

    fn element_markup(&mut self, _selector: &str, index: usize) -> Result<String, SessionError> {
        self.ensure_alive()?;
        if self
            .take_failure(|f| f == Failure::Markup(index))
            .is_some()
        {
            return Err(SessionError::Element("stale element".into()));
        }
        Ok(self.page().cards[index].clone())
    }

    fn find_control(
        &mut self,
        lookups: &[ControlLookup],
    ) -> Result<Option<ControlHandle>, SessionError> {
        self.ensure_alive()?;
        for lookup in lookups {
            self.lookups_tried.push(lookup.clone());
            let found = self
                .page()
                .next
                .as_ref()
                .is_some_and(|n| &n.found_by == lookup);
            if found {
                return Ok(Some(ControlHandle {
                    lookup: lookup.clone(),
                }));
            }
        }
        Ok(None)
    }

    fn is_enabled(&mut self, control: &ControlHandle) -> Result<bool, SessionError> {
        self.ensure_alive()?;
        Ok(self.control(control).is_some_and(|n| !n.disabled))
    }

    fn has_class(&mut self, control: &ControlHandle, class: &str) -> Result<bool, SessionError> {
        self.ensure_alive()?;
        Ok(self
            .control(control)
            .is_some_and(|n| n.class.split_whitespace().any(|c| c == class)))
    }

    fn click(&mut self, _control: &ControlHandle) -> Result<(), SessionError> {
        self.ensure_alive()?;
        if self.take_failure(|f| f == Failure::Click).is_some() {
            return Err(SessionError::Element("element is not clickable".into()));
        }
        self.clicks += 1;
        if self.current + 1 < self.pages.len() {
            self.current += 1;
        }
        self.show_current();
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.alive
    }
}

fn card(location: &str, street: &str, area: u32, price: &str) -> String {
    format!(
        r#"<div class="flex flex-col grow min-w-0">
             <h2 data-cy="rp-cardProperty-location-txt">Apartamento para comprar em {location}</h2>
             <p data-cy="rp-cardProperty-street-txt">{street}</p>
             <li data-cy="rp-cardProperty-propertyArea-txt">{area} m²</li>
             <li data-cy="rp-cardProperty-bedroomQuantity-txt">3</li>
             <li data-cy="rp-cardProperty-bathroomQuantity-txt">2</li>
             <li data-cy="rp-cardProperty-parkingSpacesQuantity-txt">1</li>
             <p class="text-2-25 text-neutral-120 font-semibold">R$ {price}</p>
           </div>"#
    )
}

fn numbered_cards(page: usize, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let location = format!("Bairro {page}-{i}");
            card(&location, &format!("Rua {page}"), 50 + i as u32, "250.000")
        })
        .collect()
}

const URL: &str = "https://www.zapimoveis.com.br/venda/apartamentos/sp+sao-paulo/";

fn crawl(session: &mut FakeSession, max_pages: u32) -> CrawlOutcome {
    crawl_with(session, max_pages, CrawlParams::immediate())
}

fn crawl_with(session: &mut FakeSession, max_pages: u32, params: CrawlParams) -> CrawlOutcome {
    CrawlController::new(session, SiteSelectors::default(), params)
        .unwrap()
        .run(URL, max_pages)
}

#[test]
fn test_consecutive_duplicate_pair_is_collected_once() {
    let twin = card("Vila Regente Feijó, São Paulo", "Rua Emília Marengo", 43, "159.600");
    let mut session = FakeSession::new(vec![Page::with_cards(vec![twin.clone(), twin])]);

    let outcome = crawl(&mut session, 10);

    assert_eq!(outcome.state, CrawlState::Done);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.duplicates.duplicates, 1);
    let record = &outcome.records[0];
    assert_eq!(record.address.as_deref(), Some("Rua Emília Marengo"));
    assert!((record.unit_price().unwrap() - 159_600.0 / 43.0).abs() < 1e-9);
}

#[test]
fn test_three_pages_then_done() {
    let mut session = FakeSession::new(vec![
        Page::with_cards(numbered_cards(1, 3)).with_next(),
        Page::with_cards(numbered_cards(2, 3)).with_next(),
        Page::with_cards(numbered_cards(3, 2)),
    ]);

    let outcome = crawl(&mut session, 10);

    assert_eq!(outcome.state, CrawlState::Done);
    assert_eq!(outcome.pages_processed, 3);
    assert_eq!(outcome.records.len(), 8);
    assert_eq!(session.clicks, 2);
    assert_eq!(session.navigations, 1);
}

#[test]
fn test_page_budget_stops_pagination() {
    let mut session = FakeSession::new(vec![
        Page::with_cards(numbered_cards(1, 2)).with_next(),
        Page::with_cards(numbered_cards(2, 2)).with_next(),
        Page::with_cards(numbered_cards(3, 2)).with_next(),
    ]);

    let outcome = crawl(&mut session, 2);

    assert_eq!(outcome.state, CrawlState::Done);
    assert_eq!(outcome.pages_processed, 2);
    assert_eq!(outcome.records.len(), 4);
    assert_eq!(session.clicks, 1);
}

#[test]
fn test_disabled_next_control_ends_crawl() {
    let mut first = Page::with_cards(numbered_cards(1, 2));
    first.next = Some(Next {
        disabled: true,
        ..Next::enabled()
    });
    let mut session = FakeSession::new(vec![first, Page::with_cards(numbered_cards(2, 2))]);

    let outcome = crawl(&mut session, 5);

    assert_eq!(outcome.state, CrawlState::Done);
    assert_eq!(outcome.pages_processed, 1);
    assert_eq!(session.clicks, 0);
}

#[test]
fn test_disabled_class_ends_crawl() {
    let mut first = Page::with_cards(numbered_cards(1, 2));
    first.next = Some(Next {
        class: "pagination-button disabled".to_string(),
        ..Next::enabled()
    });
    let mut session = FakeSession::new(vec![first, Page::with_cards(numbered_cards(2, 2))]);

    let outcome = crawl(&mut session, 5);

    assert_eq!(outcome.pages_processed, 1);
    assert_eq!(session.clicks, 0);
}

#[test]
fn test_lazy_loaded_listings_are_all_extracted() {
    let mut page = Page::with_cards(numbered_cards(1, 10));
    page.initially_visible = Some(2);
    page.reveal_per_scroll = 3;
    let mut session = FakeSession::new(vec![page]);

    let outcome = crawl(&mut session, 1);

    assert_eq!(outcome.records.len(), 10);
}

#[test]
fn test_unreadable_listing_is_skipped() {
    let page = Page::with_cards(numbered_cards(1, 4)).failing(Failure::Markup(1));
    let mut session = FakeSession::new(vec![page]);

    let outcome = crawl(&mut session, 1);

    assert_eq!(outcome.state, CrawlState::Done);
    assert_eq!(outcome.records.len(), 3);
}

#[test]
fn test_listings_without_price_are_dropped() {
    let mut cards = numbered_cards(1, 2);
    cards.push(r#"<div class="flex flex-col grow min-w-0"><p>Sob consulta</p></div>"#.to_string());
    let mut session = FakeSession::new(vec![Page::with_cards(cards)]);

    let outcome = crawl(&mut session, 1);

    assert_eq!(outcome.records.len(), 2);
}

#[test]
fn test_failed_page_is_skipped_and_crawl_continues() {
    let mut session = FakeSession::new(vec![
        Page::with_cards(numbered_cards(1, 2)).with_next(),
        Page::with_cards(numbered_cards(2, 2)).with_next().failing(Failure::Wait),
        Page::with_cards(numbered_cards(3, 2)),
    ]);

    let outcome = crawl(&mut session, 10);

    assert_eq!(outcome.state, CrawlState::Done);
    assert_eq!(outcome.records.len(), 4);
    assert_eq!(outcome.pages_processed, 2);
    assert_eq!(session.clicks, 2);
    assert_eq!(session.navigations, 1);
}

#[test]
fn test_failed_page_without_next_control_finishes() {
    let mut session = FakeSession::new(vec![
        Page::with_cards(numbered_cards(1, 2)).with_next(),
        Page::with_cards(numbered_cards(2, 2)).failing(Failure::Wait),
    ]);

    let outcome = crawl(&mut session, 10);

    assert_eq!(outcome.state, CrawlState::Done);
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.pages_processed, 1);
    assert_eq!(session.clicks, 1);
}

#[test]
fn test_unresponsive_next_control_is_retried_once() {
    let mut session = FakeSession::new(vec![
        Page::with_cards(numbered_cards(1, 2))
            .with_next()
            .failing(Failure::Click),
        Page::with_cards(numbered_cards(2, 2)),
    ]);

    let outcome = crawl(&mut session, 10);

    assert_eq!(outcome.state, CrawlState::Done);
    assert_eq!(outcome.records.len(), 4);
    assert_eq!(session.clicks, 1);
}

#[test]
fn test_page_failing_again_after_recovery_finishes() {
    let mut session = FakeSession::new(vec![
        Page::with_cards(numbered_cards(1, 2))
            .with_next()
            .failing(Failure::Click)
            .failing(Failure::Click),
        Page::with_cards(numbered_cards(2, 2)),
    ]);

    let outcome = crawl(&mut session, 10);

    assert_eq!(outcome.state, CrawlState::Done);
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.pages_processed, 1);
    assert_eq!(session.clicks, 0);
}

#[test]
fn test_failure_on_last_budgeted_page_finishes_gracefully() {
    let mut session = FakeSession::new(vec![
        Page::with_cards(numbered_cards(1, 2)).with_next(),
        Page::with_cards(numbered_cards(2, 2)).with_next().failing(Failure::Wait),
    ]);

    let outcome = crawl(&mut session, 2);

    assert_eq!(outcome.state, CrawlState::Done);
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.pages_processed, 1);
}

#[test]
fn test_navigation_failure_is_retried_on_next_page_slot() {
    let mut session = FakeSession::new(vec![Page::with_cards(numbered_cards(1, 3))]);
    session.fail_navigation = 1;

    let outcome = crawl(&mut session, 2);

    assert_eq!(outcome.state, CrawlState::Done);
    assert_eq!(session.navigations, 2);
    assert_eq!(outcome.records.len(), 3);
}

#[test]
fn test_navigation_failure_without_budget_returns_empty() {
    let mut session = FakeSession::new(vec![Page::with_cards(numbered_cards(1, 3))]);
    session.fail_navigation = 1;

    let outcome = crawl(&mut session, 1);

    assert_eq!(outcome.state, CrawlState::Done);
    assert!(outcome.is_empty());
    assert!(outcome.persisted.is_none());
}

#[test]
fn test_empty_page_times_out_and_finishes() {
    let mut session = FakeSession::new(vec![Page::default()]);

    let outcome = crawl(&mut session, 3);

    assert_eq!(outcome.state, CrawlState::Done);
    assert!(outcome.is_empty());
    assert_eq!(outcome.pages_processed, 1);
}

#[test]
fn test_lost_session_aborts_and_persists_partial_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = FakeSession::new(vec![
        Page::with_cards(numbered_cards(1, 3)).with_next(),
        Page::with_cards(numbered_cards(2, 3))
            .with_next()
            .failing(Failure::Disconnect),
        Page::with_cards(numbered_cards(3, 3)),
    ]);
    let params = CrawlParams {
        output_dir: Some(dir.path().to_path_buf()),
        ..CrawlParams::immediate()
    };

    let outcome = crawl_with(&mut session, 10, params);

    assert!(outcome.is_aborted());
    assert_eq!(outcome.status(), "aborted");
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.pages_processed, 1);

    let path = outcome.persisted.expect("partial results should be persisted");
    assert!(path.starts_with(dir.path()));
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("listings_partial_"));
    let rows = csv::Reader::from_path(&path).unwrap().records().count();
    assert_eq!(rows, 3);
}

#[test]
fn test_completed_crawl_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = FakeSession::new(vec![Page::with_cards(numbered_cards(1, 2))]);
    let params = CrawlParams {
        output_dir: Some(dir.path().to_path_buf()),
        ..CrawlParams::immediate()
    };

    let outcome = crawl_with(&mut session, 1, params);

    let path = outcome.persisted.unwrap();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("listings_"));
    assert!(!name.starts_with("listings_partial_"));
}

#[test]
fn test_cancelled_crawl_aborts_before_loading() {
    let mut session = FakeSession::new(vec![Page::with_cards(numbered_cards(1, 2))]);
    let cancel = Arc::new(AtomicBool::new(true));

    let params = CrawlParams::immediate();
    let outcome = CrawlController::new(&mut session, SiteSelectors::default(), params)
        .unwrap()
        .with_cancel(cancel)
        .run(URL, 5);

    assert!(matches!(outcome.state, CrawlState::Aborted { .. }));
    assert!(outcome.is_empty());
    assert_eq!(session.navigations, 0);
}

#[test]
fn test_duplicates_across_pages_are_collected_once() {
    let shared = card("Itaquera, São Paulo", "Rua Subragi", 69, "200.000");
    let mut session = FakeSession::new(vec![
        Page::with_cards(vec![shared.clone()]).with_next(),
        Page::with_cards(vec![shared, card("Jardim Capelinha", "Rua Guilherme", 55, "185.000")]),
    ]);

    let outcome = crawl(&mut session, 5);

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.duplicates.processed, 3);
    assert_eq!(outcome.duplicates.duplicates, 1);
}

fn price_only_card(price: &str) -> String {
    format!(
        r#"<div class="flex flex-col grow min-w-0">
             <p class="text-2-25 text-neutral-120 font-semibold">R$ {price}</p>
           </div>"#
    )
}

#[test]
fn test_price_only_listings_are_rejected_by_default() {
    let mut cards = numbered_cards(1, 1);
    cards.push(price_only_card("300.000"));
    let mut session = FakeSession::new(vec![Page::with_cards(cards)]);

    let outcome = crawl(&mut session, 1);

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.duplicates.degenerate, 1);
    assert_eq!(outcome.duplicates.duplicates, 0);
}

#[test]
fn test_price_only_listings_can_be_kept() {
    let cards = vec![
        price_only_card("300.000"),
        price_only_card("300.000"),
        price_only_card("410.000"),
    ];
    let mut session = FakeSession::new(vec![Page::with_cards(cards)]);
    let params = CrawlParams {
        degenerate_policy: DegeneratePolicy::KeepUnique,
        ..CrawlParams::immediate()
    };

    let outcome = crawl_with(&mut session, 1, params);

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.duplicates.degenerate, 0);
    assert_eq!(outcome.duplicates.duplicates, 1);
    assert!(outcome.records.iter().all(|r| r.unit_price().is_none()));
}

#[test]
fn test_scroll_timeout_extracts_what_is_visible() {
    let mut page = Page::with_cards(numbered_cards(1, 500));
    page.initially_visible = Some(1);
    page.reveal_per_scroll = 1;
    let mut session = FakeSession::new(vec![page]);
    let params = CrawlParams {
        scroll_poll: Duration::from_millis(5),
        scroll_timeout: Duration::from_millis(60),
        ..CrawlParams::immediate()
    };

    let outcome = crawl_with(&mut session, 1, params);

    assert_eq!(outcome.state, CrawlState::Done);
    assert!(outcome.records.len() > 1);
    assert!(outcome.records.len() < 500);
    assert_eq!(outcome.records.len(), session.visible);
}

#[test]
fn test_next_control_lookups_are_tried_in_order() {
    let lookups = SiteSelectors::default().next_page;
    let by_text = Next {
        found_by: lookups[2].clone(),
        ..Next::enabled()
    };
    let mut first = Page::with_cards(numbered_cards(1, 2));
    first.next = Some(by_text);
    let mut session = FakeSession::new(vec![first, Page::with_cards(numbered_cards(2, 2))]);

    let outcome = crawl(&mut session, 5);

    assert_eq!(outcome.records.len(), 4);
    assert_eq!(session.clicks, 1);
    assert_eq!(session.lookups_tried[..3], lookups[..]);
    assert!(matches!(session.lookups_tried[2], ControlLookup::Text(_)));
}

#[test]
fn test_unmatched_next_control_ends_crawl() {
    let mut first = Page::with_cards(numbered_cards(1, 2));
    first.next = Some(Next {
        found_by: ControlLookup::Css("a.load-more".to_string()),
        ..Next::enabled()
    });
    let mut session = FakeSession::new(vec![first, Page::with_cards(numbered_cards(2, 2))]);

    let outcome = crawl(&mut session, 5);

    assert_eq!(outcome.state, CrawlState::Done);
    assert_eq!(outcome.pages_processed, 1);
    assert_eq!(session.clicks, 0);
    assert_eq!(session.lookups_tried.len(), 3);
}
