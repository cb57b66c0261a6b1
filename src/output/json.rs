//! JSON file output
//!
//! One file per category plus one with every article:
//!
//! ```text
//! <output-dir>/<prefix>_<category>.json
//! <output-dir>/<prefix>_all.json
//! ```
//!
//! Files are rewritten on every run and hold a pretty-printed array of
//! article records.

use crate::crawler::{ArticleRecord, CrawlOutput};
use crate::output::traits::{OutputError, OutputResult, OutputSink};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the file collecting every category
const ALL_ARTICLES: &str = "all";

/// Writes crawl output as JSON files in a directory
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
    prefix: String,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Path of the file holding `category`
    pub fn path_for(&self, category: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", self.prefix, file_stem(category)))
    }

    fn write_records(&self, path: &Path, records: &[&ArticleRecord]) -> OutputResult<()> {
        let json = serde_json::to_string_pretty(records)?;
        fs::write(path, json).map_err(|source| OutputError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Saved {} articles to {}", records.len(), path.display());
        Ok(())
    }
}

impl OutputSink for JsonFileSink {
    fn prepare(&self) -> OutputResult<()> {
        fs::create_dir_all(&self.dir).map_err(|source| OutputError::Write {
            path: self.dir.clone(),
            source,
        })
    }

    fn write(&self, output: &CrawlOutput) -> OutputResult<Vec<PathBuf>> {
        self.prepare()?;

        let mut written = Vec::with_capacity(output.by_category.len() + 1);
        for (category, records) in &output.by_category {
            let path = self.path_for(category);
            let records: Vec<&ArticleRecord> = records.iter().collect();
            self.write_records(&path, &records)?;
            written.push(path);
        }

        let path = self.path_for(ALL_ARTICLES);
        self.write_records(&path, &output.all())?;
        written.push(path);

        Ok(written)
    }
}

/// Keeps a category name usable as part of a file name
fn file_stem(category: &str) -> String {
    category
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
