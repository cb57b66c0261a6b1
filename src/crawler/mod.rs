//! Crawler module for discovering and fetching articles
//!
//! This module contains the core crawling logic, including:
//! - The page fetcher capability and its HTTP implementation
//! - The worker pool of reusable fetcher sessions
//! - Retry with exponential backoff
//! - Listing traversal and article extraction
//! - Overall crawl coordination

mod article;
mod categories;
mod coordinator;
mod discovery;
mod fetcher;
mod http_fetcher;
mod parser;
mod pool;
mod retry;

pub use article::{extract_article, ArticleRecord, ArticleUrl};
pub use categories::discover_categories;
pub use coordinator::{Coordinator, CrawlOutput, CrawlSettings};
pub use discovery::{page_url, subcategory_urls, CandidateSet, Traversal};
pub use fetcher::{Element, FetchError, FetcherFactory, PageFetcher, SessionProfile};
pub use http_fetcher::{build_http_client, probe_proxy, HttpFetcher, HttpFetcherFactory};
pub use parser::{matches_any, parse_selector, select_elements};
pub use pool::{PoolError, PooledFetcher, WorkerPool};
pub use retry::{execute_with_retry, RetryError, RetryPolicy, Retryable, DEFAULT_MAX_ATTEMPTS};

use crate::config::{BrowserConfig, Config, SiteConfig};
use crate::output::{JsonFileSink, OutputSink};
use crate::storage::{SqliteStorage, Storage};
use crate::HarvestError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Timeout of the proxy check made before a harvest
const PROXY_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs one complete harvest
///
/// This is the main entry point for a harvest. It will:
/// 1. Open the crawled-URL store
/// 2. Check the configured proxy, dropping it if it does not answer
/// 3. Crawl every configured site with HTTP fetcher sessions
/// 4. Write the fetched articles as JSON files
///
/// See [`harvest_sites`] for how failures of single sites are handled.
///
/// # Arguments
///
/// * `config` - The harvest configuration
/// * `config_hash` - Hash of the configuration file, recorded with each run
///
/// # Returns
///
/// The articles fetched by this run, all sites merged
pub async fn harvest(config: &Config, config_hash: &str) -> Result<CrawlOutput, HarvestError> {
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new(Path::new(
        &config.output.database_path,
    ))?);

    let proxy = resolve_proxy(&config.browser).await;
    let settings = CrawlSettings::from_config(&config.crawler, &config.browser, proxy);
    let sink = JsonFileSink::new(&config.output.output_dir, config.output.file_prefix.clone());

    harvest_sites(
        &config.sites,
        &settings,
        storage,
        HttpFetcherFactory,
        config_hash,
        &sink,
    )
    .await
}

/// Crawls `sites` one after another and hands every fetched article to `sink`
///
/// The sink is prepared before the first fetch, so an unusable destination
/// fails the harvest before any URL is marked as crawled. A site whose crawl
/// fails does not stop the sites after it: the articles gathered so far are
/// still written, then the first site error is returned.
pub async fn harvest_sites<Fa, S>(
    sites: &[SiteConfig],
    settings: &CrawlSettings,
    storage: Arc<dyn Storage>,
    factory: Fa,
    config_hash: &str,
    sink: &S,
) -> Result<CrawlOutput, HarvestError>
where
    Fa: FetcherFactory + Clone,
    S: OutputSink + ?Sized,
{
    sink.prepare()?;

    let mut output = CrawlOutput::default();
    let mut first_error = None;
    for site in sites {
        let coordinator = Coordinator::new(
            site.clone(),
            settings.clone(),
            Arc::clone(&storage),
            factory.clone(),
        )
        .with_config_hash(config_hash);

        match coordinator.crawl(&site.categories).await {
            Ok(site_output) => output.merge(site_output),
            Err(e) => {
                tracing::error!("Crawl of {} failed: {}", site.name, e);
                first_error.get_or_insert(e);
            }
        }
    }

    tracing::info!("Total articles crawled: {}", output.len());
    sink.write(&output)?;

    match first_error {
        Some(e) => Err(e),
        None => Ok(output),
    }
}

/// Returns the configured proxy if it passes the probe
///
/// A failing proxy is logged and the harvest proceeds without one.
pub async fn resolve_proxy(browser: &BrowserConfig) -> Option<String> {
    let proxy = browser.proxy.as_ref()?;

    if probe_proxy(proxy, &browser.proxy_probe_url, PROXY_PROBE_TIMEOUT).await {
        tracing::info!("Using proxy: {}", proxy);
        Some(proxy.clone())
    } else {
        tracing::warn!("Proxy {} is not working. Proceeding without proxy.", proxy);
        None
    }
}
