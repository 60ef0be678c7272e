use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::ConfigError;
use crate::models::ListingRecord;
use crate::scrapers::types::SiteSelectors;

/// Turns the markup of one listing card into a [`ListingRecord`].
///
/// Every field is tried with its narrow selector first and, for area and
/// price, with a textual pattern scan over short text nodes afterwards.
/// Only the price is mandatory.
pub struct RecordExtractor {
    location: Selector,
    street: Selector,
    area: Selector,
    area_fallback: Selector,
    bedrooms: Selector,
    bathrooms: Selector,
    parking: Selector,
    price: Vec<Selector>,
    price_fallback: Selector,
    fees: Selector,
    fallback_max_len: usize,
    area_pattern: Regex,
    price_pattern: Regex,
    count_pattern: Regex,
    condo_pattern: Regex,
    tax_pattern: Regex,
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{e:?}"),
    })
}

fn pattern(re: &str) -> Result<Regex, ConfigError> {
    Regex::new(re).map_err(|e| ConfigError::Invalid(e.to_string()))
}

/// Parse a number written with `.` as thousands separator and `,` as decimal mark.
pub fn parse_locale_number(raw: &str) -> Option<f64> {
    let trimmed = raw
        .trim()
        .trim_end_matches(|c: char| c == '.' || c == ',');
    if trimmed.is_empty() {
        return None;
    }
    let normalized = trimmed.replace('.', "").replace(',', ".");
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn text_of(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    raw.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl RecordExtractor {
    pub fn new(selectors: &SiteSelectors) -> Result<Self, ConfigError> {
        let price = selectors
            .price
            .iter()
            .map(|s| compile(s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            location: compile(&selectors.location)?,
            street: compile(&selectors.street)?,
            area: compile(&selectors.area)?,
            area_fallback: compile(&selectors.area_fallback_tags.join(", "))?,
            bedrooms: compile(&selectors.bedrooms)?,
            bathrooms: compile(&selectors.bathrooms)?,
            parking: compile(&selectors.parking)?,
            price,
            price_fallback: compile(&selectors.price_fallback_tags.join(", "))?,
            fees: compile(&selectors.fees)?,
            fallback_max_len: selectors.fallback_max_len,
            area_pattern: pattern(r"(\d+(?:[.,]\d+)*)\s*m²")?,
            price_pattern: pattern(r"R\$\s*(\d[\d.,]*)")?,
            count_pattern: pattern(r"(\d+)")?,
            condo_pattern: pattern(r"Cond\.\s*R\$\s*(\d[\d.,]*)")?,
            tax_pattern: pattern(r"IPTU\s*R\$\s*(\d[\d.,]*)")?,
        })
    }

    /// Extract one listing, or `None` when the markup carries no usable price.
    pub fn extract(&self, markup: &str) -> Option<ListingRecord> {
        let fragment = Html::parse_fragment(markup);
        let root = fragment.root_element();

        let Some(price) = self.price(root) else {
            debug!("Listing has no price, skipping");
            return None;
        };

        let description = self.first_text(root, &self.location).unwrap_or_default();
        let address = self.first_text(root, &self.street);
        let area_m2 = self.area(root);
        let (condo_fee, property_tax) = self.fees(root);

        Some(ListingRecord {
            description,
            address,
            area_m2,
            bedrooms: self.count(root, &self.bedrooms),
            bathrooms: self.count(root, &self.bathrooms),
            parking: self.count(root, &self.parking),
            price,
            condo_fee,
            property_tax,
        })
    }

    fn first_text(&self, root: ElementRef<'_>, selector: &Selector) -> Option<String> {
        root.select(selector)
            .next()
            .map(text_of)
            .filter(|text| !text.is_empty())
    }

    fn is_short(&self, text: &str) -> bool {
        text.chars().count() < self.fallback_max_len
    }

    fn capture(re: &Regex, text: &str) -> Option<f64> {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_locale_number(m.as_str()))
    }

    fn area(&self, root: ElementRef<'_>) -> Option<f64> {
        let primary = self
            .first_text(root, &self.area)
            .and_then(|text| Self::capture(&self.area_pattern, &text));

        primary
            .or_else(|| {
                root.select(&self.area_fallback)
                    .map(text_of)
                    .filter(|text| text.contains("m²") && self.is_short(text))
                    .find_map(|text| Self::capture(&self.area_pattern, &text))
            })
            .filter(|area| *area > 0.0)
    }

    fn price(&self, root: ElementRef<'_>) -> Option<f64> {
        let primary = self.price.iter().find_map(|selector| {
            root.select(selector)
                .next()
                .and_then(|el| Self::capture(&self.price_pattern, &text_of(el)))
        });

        primary
            .or_else(|| {
                root.select(&self.price_fallback)
                    .map(text_of)
                    .filter(|text| text.contains("R$") && self.is_short(text))
                    .find_map(|text| Self::capture(&self.price_pattern, &text))
            })
            .filter(|price| *price > 0.0)
    }

    fn count(&self, root: ElementRef<'_>, selector: &Selector) -> Option<u32> {
        let text = self.first_text(root, selector)?;
        self.count_pattern
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    fn fees(&self, root: ElementRef<'_>) -> (Option<f64>, Option<f64>) {
        match self.first_text(root, &self.fees) {
            Some(text) => (
                Self::capture(&self.condo_pattern, &text),
                Self::capture(&self.tax_pattern, &text),
            ),
            None => (None, None),
        }
    }
}
