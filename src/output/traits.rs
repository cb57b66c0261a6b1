//! Output sink trait and error types

use crate::crawler::CrawlOutput;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize articles: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for the articles of a finished crawl
pub trait OutputSink {
    /// Checks that the destination can be written, before anything is crawled
    fn prepare(&self) -> OutputResult<()> {
        Ok(())
    }

    /// Persists `output`, returning the paths written
    fn write(&self, output: &CrawlOutput) -> OutputResult<Vec<PathBuf>>;
}
