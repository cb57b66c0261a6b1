//! Statistics from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::storage::{RunRecord, Storage};
use crate::HarvestError;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// URLs fetched successfully across all runs
    pub crawled_urls: u64,

    /// Most recent runs, newest first
    pub recent_runs: Vec<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `run_limit` - How many recent runs to include
pub fn load_statistics(
    storage: &dyn Storage,
    run_limit: u32,
) -> Result<CrawlStatistics, HarvestError> {
    Ok(CrawlStatistics {
        crawled_urls: storage.count_crawled()?,
        recent_runs: storage.latest_runs(run_limit)?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Crawled URLs: {}", stats.crawled_urls);
    println!();

    if stats.recent_runs.is_empty() {
        println!("No runs recorded yet");
        return;
    }

    println!("Recent Runs:");
    for run in &stats.recent_runs {
        println!(
            "  #{} {} [{}] started {}, finished {}",
            run.id,
            run.site,
            run.status.to_db_string(),
            run.started_at,
            run.finished_at.as_deref().unwrap_or("-")
        );
        println!(
            "      discovered {}, submitted {}, succeeded {}, failed {} ({:.1}% success)",
            run.totals.discovered,
            run.totals.submitted,
            run.totals.succeeded,
            run.totals.failed,
            success_rate(run)
        );
    }
}

/// Share of submitted articles that were fetched, as a percentage
pub fn success_rate(run: &RunRecord) -> f64 {
    if run.totals.submitted == 0 {
        return 0.0;
    }
    (run.totals.succeeded as f64 / run.totals.submitted as f64) * 100.0
}
