//! Article URL discovery
//!
//! Listing pages are walked in two phases: a seed load of each listing URL,
//! then a bounded expansion that keeps collecting links until the listing
//! runs out or the page bound is hit.
//!
//! # Shapes
//!
//! - Flat: numbered pages, `{category}` then `{category}{suffix(2)}`, ...
//!   Stops on a page without links, on a page that keeps failing, or after
//!   `max-pages` pages.
//! - Nested: the category page plus its configured subcategory pages, each
//!   expanded by clicking the "next"/"load more" control until it is absent
//!   or disabled, a click or wait fails, or `max-expansions` clicks are done.
//!
//! Links pass through the site's [`LinkFilter`] and are deduplicated for the
//! whole run by a [`CandidateSet`].

use crate::config::{CategoryEntry, Pagination, SiteConfig};
use crate::crawler::article::ArticleUrl;
use crate::crawler::fetcher::{Element, FetchError, PageFetcher};
use crate::crawler::retry::{execute_with_retry, RetryPolicy};
use crate::url::LinkFilter;
use std::collections::HashSet;
use std::time::Duration;

/// Article candidates of one run, unique by URL, in discovery order
///
/// The first category to discover a URL owns it.
#[derive(Debug, Default, Clone)]
pub struct CandidateSet {
    items: Vec<ArticleUrl>,
    seen: HashSet<String>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a candidate; returns false if its URL was already present
    pub fn insert(&mut self, candidate: ArticleUrl) -> bool {
        if !self.seen.insert(candidate.url.clone()) {
            return false;
        }
        self.items.push(candidate);
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArticleUrl> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<ArticleUrl> {
        self.items
    }
}

impl Extend<ArticleUrl> for CandidateSet {
    fn extend<I: IntoIterator<Item = ArticleUrl>>(&mut self, iter: I) {
        for candidate in iter {
            self.insert(candidate);
        }
    }
}

/// Builds the URL of listing page `page` (1-based)
///
/// # Examples
///
/// ```
/// use news_harvest::crawler::page_url;
///
/// assert_eq!(page_url("https://example.net/kinh-doanh", "-p{page}", 1), "https://example.net/kinh-doanh");
/// assert_eq!(page_url("https://example.net/kinh-doanh", "-p{page}", 3), "https://example.net/kinh-doanh-p3");
/// ```
pub fn page_url(base: &str, suffix: &str, page: u32) -> String {
    if page <= 1 {
        base.to_string()
    } else {
        format!("{}{}", base, suffix.replace("{page}", &page.to_string()))
    }
}

/// Subcategory listing URLs that belong to `category_url`
///
/// Every `prefix + segment` pair is produced for the prefixes starting with
/// the category URL, in map order.
pub fn subcategory_urls(site: &SiteConfig, category_url: &str) -> Vec<String> {
    site.subcategories
        .iter()
        .filter(|(prefix, _)| prefix.starts_with(category_url))
        .flat_map(|(prefix, segments)| {
            segments
                .iter()
                .map(move |segment| format!("{}{}", prefix, segment))
        })
        .collect()
}

/// Discovery settings for one site
pub struct Traversal<'a> {
    site: &'a SiteConfig,
    filter: LinkFilter,
    retry: RetryPolicy,
    wait_timeout: Duration,
    settle_delay: Duration,
}

impl<'a> Traversal<'a> {
    pub fn new(
        site: &'a SiteConfig,
        retry: RetryPolicy,
        wait_timeout: Duration,
        settle_delay: Duration,
    ) -> Self {
        Self {
            site,
            filter: LinkFilter::for_site(site),
            retry,
            wait_timeout,
            settle_delay,
        }
    }

    /// Collects the article links of one category into `candidates`
    ///
    /// Returns the number of links this category added. Failures are
    /// logged and end the affected listing; they never abort discovery.
    pub async fn discover<F>(
        &self,
        fetcher: &F,
        category: &CategoryEntry,
        candidates: &mut CandidateSet,
    ) -> usize
    where
        F: PageFetcher + ?Sized,
    {
        let before = candidates.len();

        match self.site.pagination {
            Pagination::Flat => self.discover_flat(fetcher, category, candidates).await,
            Pagination::Nested => self.discover_nested(fetcher, category, candidates).await,
        }

        let added = candidates.len() - before;
        tracing::info!(
            "Category {} ({}): {} new article links",
            category.name,
            category.url,
            added
        );
        added
    }

    async fn discover_flat<F>(
        &self,
        fetcher: &F,
        category: &CategoryEntry,
        candidates: &mut CandidateSet,
    ) where
        F: PageFetcher + ?Sized,
    {
        for page in 1..=self.site.max_pages {
            let url = page_url(&category.url, &self.site.page_suffix, page);

            let items = match self.load_listing_with_retry(fetcher, &url).await {
                Some(items) => items,
                None => break,
            };

            if items.is_empty() {
                tracing::debug!("No links on {}, end of listing", url);
                break;
            }

            let added = self.collect(&items, &category.name, candidates);
            tracing::debug!(
                "Page {} of {}: {} links, {} new",
                page,
                category.name,
                items.len(),
                added
            );
        }
    }

    async fn discover_nested<F>(
        &self,
        fetcher: &F,
        category: &CategoryEntry,
        candidates: &mut CandidateSet,
    ) where
        F: PageFetcher + ?Sized,
    {
        let mut listings = vec![category.url.clone()];
        listings.extend(subcategory_urls(self.site, &category.url));

        for listing in &listings {
            let seed = match self.load_listing_with_retry(fetcher, listing).await {
                Some(items) => items,
                None => {
                    tracing::warn!("Skipping listing {}", listing);
                    continue;
                }
            };

            let added = self.collect(&seed, &category.name, candidates);
            tracing::debug!("Seed {}: {} links, {} new", listing, seed.len(), added);

            self.expand(fetcher, listing, &category.name, candidates)
                .await;
        }
    }

    /// Follows the "next"/"load more" control of the current listing
    async fn expand<F>(
        &self,
        fetcher: &F,
        listing: &str,
        category: &str,
        candidates: &mut CandidateSet,
    ) where
        F: PageFetcher + ?Sized,
    {
        let next_selector = match &self.site.next_button {
            Some(selector) => selector,
            None => return,
        };

        for expansion in 1..=self.site.max_expansions {
            let control = match fetcher.find_all(next_selector).await {
                Ok(found) => found.into_iter().next(),
                Err(e) => {
                    tracing::debug!("Next control lookup failed on {}: {}", listing, e);
                    None
                }
            };

            let control = match control {
                Some(control) if control.is_enabled() => control,
                _ => {
                    tracing::debug!("{}: no further pages", listing);
                    break;
                }
            };

            if let Err(e) = fetcher.click(&control).await {
                tracing::warn!("Click failed on {}: {}", listing, e);
                break;
            }

            if let Err(e) = self.wait_listing_ready(fetcher).await {
                tracing::warn!("Listing {} did not reload: {}", listing, e);
                break;
            }
            fetcher.settle(self.settle_delay).await;

            let items = match fetcher.find_all(&self.site.listing_link).await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!("Link lookup failed on {}: {}", listing, e);
                    break;
                }
            };

            let added = self.collect(&items, category, candidates);
            tracing::debug!(
                "Expansion {} of {}: {} links, {} new",
                expansion,
                listing,
                items.len(),
                added
            );
        }
    }

    /// Loads a listing page under the retry policy; `None` once it gives up
    async fn load_listing_with_retry<F>(&self, fetcher: &F, url: &str) -> Option<Vec<Element>>
    where
        F: PageFetcher + ?Sized,
    {
        let label = format!("Listing {}", url);
        let result = execute_with_retry(&self.retry, &label, move |_| {
            self.load_listing(fetcher, url)
        })
        .await;

        match result {
            Ok(items) => Some(items),
            Err(e) => {
                tracing::warn!(
                    "Giving up on {} after {} attempt(s): {}",
                    url,
                    e.attempts(),
                    e.last_error()
                );
                None
            }
        }
    }

    async fn load_listing<F>(&self, fetcher: &F, url: &str) -> Result<Vec<Element>, FetchError>
    where
        F: PageFetcher + ?Sized,
    {
        fetcher.navigate(url).await?;
        self.wait_listing_ready(fetcher).await?;
        fetcher.settle(self.settle_delay).await;
        fetcher.find_all(&self.site.listing_link).await
    }

    async fn wait_listing_ready<F>(&self, fetcher: &F) -> Result<(), FetchError>
    where
        F: PageFetcher + ?Sized,
    {
        match &self.site.listing_ready {
            Some(selector) => fetcher.wait_for_selector(selector, self.wait_timeout).await,
            None => Ok(()),
        }
    }

    /// Filters link elements into `candidates`; returns how many were new
    fn collect(&self, items: &[Element], category: &str, candidates: &mut CandidateSet) -> usize {
        items
            .iter()
            .filter_map(|item| item.attribute("href"))
            .filter_map(|href| self.filter.accept(href))
            .filter(|url| candidates.insert(ArticleUrl::new(url.clone(), category)))
            .count()
    }
}
