use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use serde::Serialize;
use tracing::debug;

use crate::models::ListingRecord;

/// What to do with a record whose fingerprint carries no identifying text or area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegeneratePolicy {
    /// Reject it as if it had been seen before.
    #[default]
    TreatAsDuplicate,
    /// Fingerprint it like any other record.
    KeepUnique,
}

/// Counters reported at the end of a crawl session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DuplicateStats {
    pub unique: usize,
    pub duplicates: usize,
    pub degenerate: usize,
    pub processed: usize,
}

impl DuplicateStats {
    /// Share of processed records that were rejected, in percent.
    pub fn duplicate_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            (self.duplicates + self.degenerate) as f64 / self.processed as f64 * 100.0
        }
    }
}

/// Canonical identity of a listing, built from its normalized attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    key: String,
    degenerate: bool,
}

impl Fingerprint {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    pub fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.key.hash(&mut hasher);
        hasher.finish()
    }
}

/// Seen-set of fingerprints for a single crawl session.
#[derive(Debug)]
pub struct Deduplicator {
    boilerplate: Vec<String>,
    policy: DegeneratePolicy,
    seen: HashSet<u64>,
    stats: DuplicateStats,
}

impl Deduplicator {
    pub fn new(boilerplate: &[String]) -> Self {
        Self::with_policy(boilerplate, DegeneratePolicy::default())
    }

    pub fn with_policy(boilerplate: &[String], policy: DegeneratePolicy) -> Self {
        let mut boilerplate: Vec<String> = boilerplate
            .iter()
            .map(|phrase| collapse(&phrase.to_lowercase()))
            .filter(|phrase| !phrase.is_empty())
            .collect();
        // Longer phrases first so "... com" never leaves a dangling word behind.
        boilerplate.sort_by_key(|phrase| std::cmp::Reverse(phrase.len()));

        Self {
            boilerplate,
            policy,
            seen: HashSet::new(),
            stats: DuplicateStats::default(),
        }
    }

    /// Description with whitespace collapsed, lower-cased and boilerplate removed.
    pub fn normalize_description(&self, description: &str) -> String {
        let mut text = collapse(&description.to_lowercase());
        for phrase in &self.boilerplate {
            text = text.replace(phrase.as_str(), " ");
        }
        collapse(&text)
    }

    pub fn fingerprint(&self, record: &ListingRecord) -> Fingerprint {
        let description = self.normalize_description(&record.description);
        let address = record
            .address
            .as_deref()
            .map(|a| collapse(a.trim()))
            .unwrap_or_default();
        let area = record
            .area_m2
            .map(|a| format!("{a:.1}"))
            .unwrap_or_default();

        let tag = |prefix: &str, value: Option<u32>| match value {
            Some(v) => format!("{prefix}{v}"),
            None => String::new(),
        };

        let price = format!("{}", record.price.round() as i64);
        let bedrooms = tag("q", record.bedrooms);
        let bathrooms = tag("b", record.bathrooms);
        let parking = tag("v", record.parking);

        let key = [
            description.as_str(),
            address.as_str(),
            area.as_str(),
            price.as_str(),
            bedrooms.as_str(),
            bathrooms.as_str(),
            parking.as_str(),
        ]
        .join("|");

        Fingerprint {
            key,
            degenerate: description.is_empty() && address.is_empty() && area.is_empty(),
        }
    }

    /// Returns `true` when the record was seen before; otherwise registers it.
    pub fn is_duplicate(&mut self, record: &ListingRecord) -> bool {
        self.stats.processed += 1;
        let fingerprint = self.fingerprint(record);

        if fingerprint.is_degenerate() && self.policy == DegeneratePolicy::TreatAsDuplicate {
            debug!(key = fingerprint.key(), "Degenerate fingerprint, rejecting");
            self.stats.degenerate += 1;
            return true;
        }

        if self.seen.insert(fingerprint.digest()) {
            self.stats.unique += 1;
            false
        } else {
            debug!(key = fingerprint.key(), "Duplicate listing");
            self.stats.duplicates += 1;
            true
        }
    }

    pub fn duplicates(&self) -> usize {
        self.stats.duplicates
    }

    pub fn stats(&self) -> DuplicateStats {
        self.stats
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
