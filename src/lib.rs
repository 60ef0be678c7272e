//! Crawl Zap Imóveis search results, deduplicate listings and summarize
//! their price per square meter.

pub mod analysis;
pub mod error;
pub mod models;
pub mod scrapers;
pub mod storage;
