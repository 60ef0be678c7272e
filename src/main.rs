mod cli;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use zap_scout::analysis::{compute_statistics, remove_outliers, OutlierConfig, StatisticsSummary};
use zap_scout::models::ListingRecord;
use zap_scout::scrapers::{CrawlOutcome, ScraperTrait, ZapScraper};
use zap_scout::storage::{self, RunReport};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();
    let outliers = cli.outlier_config();
    outliers.validate()?;
    let selectors = cli.site_selectors()?;
    let params = cli.crawl_params();

    info!("🏠 Zap Scout - listing crawler");
    info!("Press Ctrl+C (or close the browser) to stop and keep what was collected");

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping at the next page boundary");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut workers = JoinSet::new();
    for url in &cli.urls {
        let scraper = ZapScraper::new(url.as_str(), cli.max_pages)
            .with_selectors(selectors.clone())
            .with_params(params.clone())
            .headless(!cli.headful)
            .with_cancel(Arc::clone(&cancel));

        info!(url = url.as_str(), source = scraper.source_name(), "Queued crawl");
        workers.spawn(async move {
            let result = scraper.scrape().await;
            (scraper.url().to_string(), result)
        });
    }

    let mut collected = 0;
    while let Some(joined) = workers.join_next().await {
        let (url, result) = joined.context("Crawl task failed")?;
        match result {
            Ok(outcome) => {
                collected += outcome.records.len();
                if let Err(err) = report(&cli, &outliers, &outcome) {
                    error!(
                        url = url.as_str(),
                        error = %format!("{err:#}"),
                        "Failed to write report"
                    );
                }
            }
            Err(err) => error!(
                url = url.as_str(),
                error = %format!("{err:#}"),
                "Crawl could not run"
            ),
        }
    }

    if collected == 0 {
        warn!("No listings were collected from any URL");
    } else {
        info!(collected, "✅ All crawls finished");
    }

    Ok(())
}

/// Outlier-free records and their statistics, unless cleaning is switched off.
fn clean(
    skip: bool,
    outliers: &OutlierConfig,
    records: &[ListingRecord],
) -> Option<(Vec<ListingRecord>, StatisticsSummary)> {
    if skip {
        return None;
    }
    let cleaned = remove_outliers(records, outliers);
    let summary = compute_statistics(&cleaned);
    Some((cleaned, summary))
}

fn report(cli: &cli::Cli, outliers: &OutlierConfig, outcome: &CrawlOutcome) -> Result<()> {
    if outcome.is_empty() {
        warn!(url = outcome.url.as_str(), status = outcome.status(), "Zero listings collected");
        return Ok(());
    }

    let before = compute_statistics(&outcome.records);
    println!("\n{} ({} páginas, {})", outcome.url, outcome.pages_processed, outcome.status());
    println!("\nEstatísticas antes da remoção de outliers:\n{before}");

    let after = match clean(cli.skip_outliers, outliers, &outcome.records) {
        Some((cleaned, after)) => {
            println!("\nEstatísticas após a remoção de outliers:\n{after}");
            let path = storage::persist_timestamped(&cli.output_dir, "listings_clean", &cleaned)?;
            info!(path = %path.display(), records = cleaned.len(), "💾 Saved cleaned listings");
            Some(after)
        }
        None => None,
    };

    let summary = RunReport {
        url: outcome.url.clone(),
        status: outcome.status().to_string(),
        pages: outcome.pages_processed,
        duplicates: outcome.duplicates,
        duplicate_rate: outcome.duplicates.duplicate_rate(),
        before_cleaning: before,
        after_cleaning: after,
    };
    let timestamp = Local::now().format("%Y%m%d-%H%M%S-%3f");
    let summary_path = cli.output_dir.join(format!("summary_{timestamp}.json"));
    storage::write_report(&summary_path, &summary)?;
    info!(path = %summary_path.display(), "💾 Saved summary");

    Ok(())
}
