//! Output module for crawl results
//!
//! This module handles:
//! - Writing fetched articles as JSON files
//! - Displaying statistics recorded in the crawl database

mod json;
pub mod stats;
mod traits;

pub use json::JsonFileSink;
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use traits::{OutputError, OutputResult, OutputSink};
