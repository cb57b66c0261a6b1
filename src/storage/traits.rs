//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{RunRecord, RunStatus, RunTotals};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// All methods take `&self`: implementations serialize writers internally so
/// the store can be shared between concurrent fetch tasks behind an `Arc`.
pub trait Storage: Send + Sync {
    // ===== Crawled URL Set =====

    /// Returns true if the URL was crawled successfully in any earlier run
    fn exists(&self, url: &str) -> StorageResult<bool>;

    /// Records a URL as crawled
    ///
    /// Inserting a URL that is already present is a no-op.
    fn mark_crawled(&self, url: &str) -> StorageResult<()>;

    /// Counts all crawled URLs
    fn count_crawled(&self) -> StorageResult<u64>;

    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `site` - Name of the site being crawled
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn begin_run(&self, site: &str, config_hash: &str) -> StorageResult<i64>;

    /// Records the final totals and status of a run
    fn finish_run(&self, run_id: i64, totals: &RunTotals, status: RunStatus)
        -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent runs, newest first
    fn latest_runs(&self, limit: u32) -> StorageResult<Vec<RunRecord>>;
}
