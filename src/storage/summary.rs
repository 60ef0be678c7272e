use std::path::Path;

use serde::Serialize;

use crate::analysis::StatisticsSummary;
use crate::error::StorageError;
use crate::scrapers::dedup::DuplicateStats;

/// Everything the reporting side needs to know about one crawl.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub url: String,
    pub status: String,
    pub pages: u32,
    pub duplicates: DuplicateStats,
    pub duplicate_rate: f64,
    pub before_cleaning: StatisticsSummary,
    pub after_cleaning: Option<StatisticsSummary>,
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}
