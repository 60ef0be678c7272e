//! Command line for the crawler binary.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use zap_scout::analysis::OutlierConfig;
use zap_scout::scrapers::{CrawlParams, DegeneratePolicy, SiteSelectors};

/// Crawl Zap Imóveis search results and summarize price per m².
#[derive(Parser, Debug)]
#[command(name = "zap-scout")]
#[command(about = "Crawl Zap Imóveis search results and summarize price per m²")]
#[command(version)]
pub(crate) struct Cli {
    /// Search-results URLs; each one is crawled in its own browser
    #[arg(required = true, env = "ZAP_SCOUT_URLS", value_delimiter = ',')]
    pub urls: Vec<String>,

    /// Maximum number of result pages per URL
    #[arg(long, default_value_t = 10, env = "ZAP_SCOUT_MAX_PAGES")]
    pub max_pages: u32,

    /// Directory for listing files and summaries
    #[arg(long, default_value = "output", env = "ZAP_SCOUT_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Seconds to wait for the first listing on a page
    #[arg(long, default_value_t = 20)]
    pub wait_timeout_secs: u64,

    /// Seconds allowed for lazy-load scrolling to settle
    #[arg(long, default_value_t = 15)]
    pub scroll_timeout_secs: u64,

    /// IQR multiplier for outlier removal
    #[arg(long, default_value_t = 1.5)]
    pub iqr_factor: f64,

    /// Z-score threshold for outlier removal
    #[arg(long, default_value_t = 3.0)]
    pub z_threshold: f64,

    /// Maximum outlier removal passes
    #[arg(long, default_value_t = 10)]
    pub max_passes: usize,

    /// Keep every collected listing in the final report
    #[arg(long)]
    pub skip_outliers: bool,

    /// Keep listings with no description, address or area instead of rejecting them
    #[arg(long)]
    pub keep_sparse: bool,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// JSON file overriding the site selectors
    #[arg(long, env = "ZAP_SCOUT_SELECTORS")]
    pub selectors: Option<PathBuf>,
}

impl Cli {
    pub fn crawl_params(&self) -> CrawlParams {
        CrawlParams {
            content_timeout: Duration::from_secs(self.wait_timeout_secs),
            scroll_timeout: Duration::from_secs(self.scroll_timeout_secs),
            output_dir: Some(self.output_dir.clone()),
            degenerate_policy: if self.keep_sparse {
                DegeneratePolicy::KeepUnique
            } else {
                DegeneratePolicy::TreatAsDuplicate
            },
            ..CrawlParams::default()
        }
    }

    pub fn outlier_config(&self) -> OutlierConfig {
        OutlierConfig {
            iqr_factor: self.iqr_factor,
            z_threshold: self.z_threshold,
            max_passes: self.max_passes,
        }
    }

    pub fn site_selectors(&self) -> Result<SiteSelectors> {
        match &self.selectors {
            Some(path) => SiteSelectors::from_json_file(path)
                .with_context(|| format!("Failed to load selectors from {}", path.display())),
            None => Ok(SiteSelectors::default()),
        }
    }
}
