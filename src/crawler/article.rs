//! Single-article extraction
//!
//! [`extract_article`] loads one article page through a fetcher session and
//! turns it into an [`ArticleRecord`] using the site's article selectors.

use crate::config::ArticleSelectors;
use crate::crawler::fetcher::{FetchError, PageFetcher};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A discovered article link and the category it was found under
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArticleUrl {
    pub url: String,
    pub category: String,
}

impl ArticleUrl {
    pub fn new(url: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            category: category.into(),
        }
    }
}

/// Structured content of one fetched article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub category: String,

    /// Date string as published by the site, empty when the page has none
    pub date: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Paragraph texts joined by single spaces
    pub content: String,

    pub url: String,
}

/// Fetches and extracts one article
///
/// Fails with a retryable error when the page or its headline cannot be
/// found, and with [`FetchError::EmptyContent`] when no paragraph text is
/// present.
pub async fn extract_article<F>(
    fetcher: &F,
    target: &ArticleUrl,
    selectors: &ArticleSelectors,
    wait_timeout: Duration,
) -> Result<ArticleRecord, FetchError>
where
    F: PageFetcher + ?Sized,
{
    fetcher.navigate(&target.url).await?;
    fetcher.wait_for_selector(&selectors.ready, wait_timeout).await?;

    let title = first_text(fetcher, &selectors.title)
        .await?
        .ok_or_else(|| FetchError::MissingElement {
            selector: selectors.title.clone(),
            url: target.url.clone(),
        })?;

    let date = match fetcher.find_all(&selectors.date).await?.first() {
        Some(element) => selectors
            .date_attribute
            .as_deref()
            .and_then(|name| element.attribute(name))
            .unwrap_or_else(|| element.text())
            .trim()
            .to_string(),
        None => String::new(),
    };

    let description = match &selectors.description {
        Some(selector) => first_text(fetcher, selector).await?,
        None => None,
    };

    let paragraphs = fetcher.find_all(&selectors.paragraphs).await?;
    let content = join_paragraphs(paragraphs.iter().map(|p| p.text()));
    if content.is_empty() {
        return Err(FetchError::EmptyContent {
            url: target.url.clone(),
        });
    }

    tracing::info!("Extracted article: {}", title);

    Ok(ArticleRecord {
        title,
        category: target.category.clone(),
        date,
        description,
        content,
        url: target.url.clone(),
    })
}

/// Trimmed text of the first match, `None` when absent or blank
async fn first_text<F>(fetcher: &F, selector: &str) -> Result<Option<String>, FetchError>
where
    F: PageFetcher + ?Sized,
{
    let elements = fetcher.find_all(selector).await?;
    Ok(elements
        .first()
        .map(|element| element.text().trim().to_string())
        .filter(|text| !text.is_empty()))
}

fn join_paragraphs<'a>(texts: impl Iterator<Item = &'a str>) -> String {
    texts
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
