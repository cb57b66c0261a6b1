//! Category enumeration from a site's navigation menu

use crate::config::{CategoryEntry, CategoryMenuConfig};
use crate::crawler::fetcher::{Element, FetchError, PageFetcher};
use crate::crawler::retry::{execute_with_retry, RetryPolicy};
use crate::url::LinkFilter;
use std::collections::HashSet;
use std::time::Duration;

/// Reads `{name, url}` pairs from the menu on the site's home page
///
/// Entries named in `exclude`, links outside the canonical prefix and
/// repeated URLs are skipped. Returns an empty list if the home page keeps
/// failing to load.
pub async fn discover_categories<F>(
    fetcher: &F,
    menu: &CategoryMenuConfig,
    canonical_prefix: &str,
    retry: &RetryPolicy,
    wait_timeout: Duration,
) -> Vec<CategoryEntry>
where
    F: PageFetcher + ?Sized,
{
    let label = format!("Category menu {}", menu.home);
    let result = execute_with_retry(retry, &label, move |_| {
        load_menu(fetcher, menu, wait_timeout)
    })
    .await;

    let items = match result {
        Ok(items) => items,
        Err(e) => {
            tracing::error!("Could not read categories from {}: {}", menu.home, e);
            return Vec::new();
        }
    };

    let categories = menu_entries(&items, menu, canonical_prefix);
    if categories.is_empty() {
        tracing::warn!("No categories found in menu at {}", menu.home);
    } else {
        tracing::info!("Found {} categories at {}", categories.len(), menu.home);
    }
    categories
}

async fn load_menu<F>(
    fetcher: &F,
    menu: &CategoryMenuConfig,
    wait_timeout: Duration,
) -> Result<Vec<Element>, FetchError>
where
    F: PageFetcher + ?Sized,
{
    fetcher.navigate(&menu.home).await?;
    fetcher.wait_for_selector(&menu.selector, wait_timeout).await?;
    fetcher.find_all(&menu.selector).await
}

fn menu_entries(
    items: &[Element],
    menu: &CategoryMenuConfig,
    canonical_prefix: &str,
) -> Vec<CategoryEntry> {
    let filter = LinkFilter::new(canonical_prefix, None);
    let mut seen = HashSet::new();

    items
        .iter()
        .filter_map(|item| {
            let name = item.text().trim();
            if name.is_empty() || menu.exclude.iter().any(|excluded| excluded == name) {
                return None;
            }
            let url = filter.accept(item.attribute("href")?)?;
            Some(CategoryEntry {
                name: name.to_string(),
                url,
            })
        })
        .filter(|entry| seen.insert(entry.url.clone()))
        .collect()
}
