use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::scrapers::dedup::DegeneratePolicy;

/// Timing and output parameters for one crawl
#[derive(Debug, Clone)]
pub struct CrawlParams {
    /// How long to wait for the first listing card on a page
    pub content_timeout: Duration,
    /// Pause between a scroll and the following recount
    pub scroll_poll: Duration,
    /// Consecutive unchanged counts needed before the page is considered settled
    pub stability_window: u32,
    /// Upper bound for the whole scroll-to-settle phase
    pub scroll_timeout: Duration,
    /// Randomized pause after clicking "next" (min, max)
    pub settle_delay: (Duration, Duration),
    /// Pause before moving on after a failed page
    pub recovery_pause: Duration,
    /// Where partial results are flushed; `None` disables persistence
    pub output_dir: Option<PathBuf>,
    /// Handling of listings too sparse to fingerprint
    pub degenerate_policy: DegeneratePolicy,
}

impl Default for CrawlParams {
    fn default() -> Self {
        Self {
            content_timeout: Duration::from_secs(20),
            scroll_poll: Duration::from_secs(1),
            stability_window: 3,
            scroll_timeout: Duration::from_secs(15),
            settle_delay: (Duration::from_secs(4), Duration::from_secs(6)),
            recovery_pause: Duration::from_secs(5),
            output_dir: Some(PathBuf::from("output")),
            degenerate_policy: DegeneratePolicy::default(),
        }
    }
}

impl CrawlParams {
    /// Parameters with every pause set to zero, for scripted sessions.
    pub fn immediate() -> Self {
        Self {
            content_timeout: Duration::ZERO,
            scroll_poll: Duration::ZERO,
            stability_window: 3,
            scroll_timeout: Duration::from_secs(5),
            settle_delay: (Duration::ZERO, Duration::ZERO),
            recovery_pause: Duration::ZERO,
            output_dir: None,
            degenerate_policy: DegeneratePolicy::default(),
        }
    }
}

/// One strategy for locating a clickable control on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ControlLookup {
    /// Plain CSS selector
    Css(String),
    /// Button whose `aria-label` contains the given fragment
    AriaLabel(String),
    /// Button whose text contains any of the given labels
    Text(Vec<String>),
}

impl ControlLookup {
    /// CSS selector equivalent, where one exists.
    pub fn css(&self) -> Option<String> {
        match self {
            ControlLookup::Css(selector) => Some(selector.clone()),
            ControlLookup::AriaLabel(fragment) => {
                Some(format!("button[aria-label*=\"{fragment}\"]"))
            }
            ControlLookup::Text(_) => None,
        }
    }

    /// XPath equivalent for text lookups.
    pub fn xpath(&self) -> Option<String> {
        match self {
            ControlLookup::Text(labels) if !labels.is_empty() => {
                let clauses: Vec<String> = labels
                    .iter()
                    .map(|label| format!("contains(text(), '{label}')"))
                    .collect();
                Some(format!("//button[{}]", clauses.join(" or ")))
            }
            _ => None,
        }
    }
}

/// Site-specific selectors and vocabulary.
///
/// The defaults target Zap Imóveis result pages. Everything here can be
/// overridden from a JSON file so the crawler can follow markup changes
/// without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSelectors {
    pub listing_card: String,
    pub location: String,
    pub street: String,
    pub area: String,
    pub area_fallback_tags: Vec<String>,
    pub bedrooms: String,
    pub bathrooms: String,
    pub parking: String,
    pub price: Vec<String>,
    pub price_fallback_tags: Vec<String>,
    pub fees: String,
    pub next_page: Vec<ControlLookup>,
    pub disabled_class: String,
    pub boilerplate: Vec<String>,
    /// Longest text a fallback pattern scan will look at
    pub fallback_max_len: usize,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            listing_card: ".flex.flex-col.grow.min-w-0".to_string(),
            location: "h2[data-cy=\"rp-cardProperty-location-txt\"]".to_string(),
            street: "p[data-cy=\"rp-cardProperty-street-txt\"]".to_string(),
            area: "li[data-cy=\"rp-cardProperty-propertyArea-txt\"]".to_string(),
            area_fallback_tags: vec!["li".into(), "span".into(), "h3".into()],
            bedrooms: "li[data-cy=\"rp-cardProperty-bedroomQuantity-txt\"]".to_string(),
            bathrooms: "li[data-cy=\"rp-cardProperty-bathroomQuantity-txt\"]".to_string(),
            parking: "li[data-cy=\"rp-cardProperty-parkingSpacesQuantity-txt\"]".to_string(),
            price: vec![
                "p.text-2-25.text-feedback-success-110.font-semibold".to_string(),
                "p.text-2-25.text-neutral-120.font-semibold".to_string(),
            ],
            price_fallback_tags: vec!["p".into(), "span".into(), "div".into()],
            fees: "p.text-1-75.text-neutral-110".to_string(),
            next_page: vec![
                ControlLookup::Css("button[data-testid=\"next-page\"]".to_string()),
                ControlLookup::AriaLabel("próxima".to_string()),
                ControlLookup::Text(vec!["Próxima".to_string(), "Next".to_string()]),
            ],
            disabled_class: "disabled".to_string(),
            boilerplate: vec![
                "Apartamento para comprar com".to_string(),
                "Apartamento para comprar em".to_string(),
                "Casa para comprar com".to_string(),
                "Casa para comprar em".to_string(),
                "Casa de condomínio para comprar com".to_string(),
                "Cobertura para comprar com".to_string(),
                "Studio para comprar com".to_string(),
            ],
            fallback_max_len: 50,
        }
    }
}

impl SiteSelectors {
    /// Load selectors from a JSON file; missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))
    }
}
