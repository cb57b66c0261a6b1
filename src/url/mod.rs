//! URL handling module for News-Harvest
//!
//! This module provides URL normalization, link resolution, and the prefix
//! filter that decides which discovered links are article candidates.

mod normalize;

pub use normalize::{normalize_url, resolve_link};

use crate::config::SiteConfig;

/// Decides which discovered links belong to a site
///
/// A link is kept only if it is an absolute http(s) URL that starts with the
/// site's canonical prefix and, when configured, with the narrower article
/// prefix. The returned string has its fragment removed.
#[derive(Debug, Clone)]
pub struct LinkFilter {
    canonical_prefix: String,
    article_prefix: Option<String>,
}

impl LinkFilter {
    pub fn new(canonical_prefix: impl Into<String>, article_prefix: Option<String>) -> Self {
        Self {
            canonical_prefix: canonical_prefix.into(),
            article_prefix,
        }
    }

    /// Builds the filter for a configured site
    pub fn for_site(site: &SiteConfig) -> Self {
        Self::new(site.canonical_prefix.clone(), site.article_prefix.clone())
    }

    /// Returns the normalized URL if the link should be kept
    ///
    /// # Examples
    ///
    /// ```
    /// use news_harvest::url::LinkFilter;
    ///
    /// let filter = LinkFilter::new("https://example.com/", None);
    /// assert!(filter.accept("https://example.com/a#top").is_some());
    /// assert!(filter.accept("/relative").is_none());
    /// assert!(filter.accept("https://other.com/a").is_none());
    /// ```
    pub fn accept(&self, raw: &str) -> Option<String> {
        let url = normalize_url(raw).ok()?;
        let url = String::from(url);

        if !url.starts_with(&self.canonical_prefix) {
            return None;
        }

        match &self.article_prefix {
            Some(prefix) if !url.starts_with(prefix.as_str()) => None,
            _ => Some(url),
        }
    }

    pub fn canonical_prefix(&self) -> &str {
        &self.canonical_prefix
    }
}
