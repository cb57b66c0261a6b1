//! Crawler coordinator - main crawl orchestration logic
//!
//! A crawl of one site goes through these steps:
//! - Start the worker pool of fetcher sessions
//! - Discover article URLs category by category on one pooled session
//! - Drop the URLs the store already holds
//! - Fetch the remaining articles concurrently, one pooled session per task
//! - Mark each fetched URL as crawled and group the records by category
//!
//! Individual article failures are logged and dropped; only a pool without
//! any session aborts the crawl.

use crate::config::{BrowserConfig, CategoryEntry, CrawlerConfig, SiteConfig};
use crate::crawler::article::{extract_article, ArticleRecord, ArticleUrl};
use crate::crawler::categories::discover_categories;
use crate::crawler::discovery::{CandidateSet, Traversal};
use crate::crawler::fetcher::{FetcherFactory, PageFetcher, SessionProfile};
use crate::crawler::pool::WorkerPool;
use crate::crawler::retry::{execute_with_retry, RetryPolicy};
use crate::storage::{RunStatus, RunTotals, Storage};
use crate::HarvestError;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// User agent used when none is configured
const FALLBACK_USER_AGENT: &str = concat!("news-harvest/", env!("CARGO_PKG_VERSION"));

/// Runtime settings of a crawl, derived from the configuration
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub max_workers: usize,
    pub retry: RetryPolicy,
    pub page_load_timeout: Duration,
    pub wait_timeout: Duration,
    pub settle_delay: Duration,
    pub politeness_min: Duration,
    pub politeness_max: Duration,
    pub user_agents: Vec<String>,

    /// Proxy every session goes through, already checked by the caller
    pub proxy: Option<String>,
}

impl CrawlSettings {
    /// Builds settings from the configuration
    ///
    /// `proxy` is passed separately because the caller decides whether the
    /// configured proxy is usable.
    pub fn from_config(
        crawler: &CrawlerConfig,
        browser: &BrowserConfig,
        proxy: Option<String>,
    ) -> Self {
        Self {
            max_workers: crawler.max_workers as usize,
            retry: RetryPolicy::new(
                crawler.max_retries,
                Duration::from_millis(crawler.base_delay_ms),
                Duration::from_millis(crawler.jitter_ms),
            ),
            page_load_timeout: crawler.page_load_timeout(),
            wait_timeout: crawler.wait_timeout(),
            settle_delay: crawler.settle_delay(),
            politeness_min: Duration::from_millis(crawler.politeness_min_ms),
            politeness_max: Duration::from_millis(crawler.politeness_max_ms),
            user_agents: browser.user_agents.clone(),
            proxy,
        }
    }

    /// One session profile per worker, each with a randomly chosen user agent
    pub fn profiles(&self, count: usize) -> Vec<SessionProfile> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| SessionProfile {
                user_agent: self
                    .user_agents
                    .choose(&mut rng)
                    .cloned()
                    .unwrap_or_else(|| FALLBACK_USER_AGENT.to_string()),
                proxy: self.proxy.clone(),
                page_load_timeout: self.page_load_timeout,
            })
            .collect()
    }

    /// Random pause between two article dispatches
    fn politeness_delay(&self) -> Duration {
        let min = self.politeness_min.as_millis() as u64;
        let max = self.politeness_max.as_millis() as u64;
        if max <= min {
            return self.politeness_min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Articles fetched by one crawl
#[derive(Debug, Clone, Default)]
pub struct CrawlOutput {
    pub site: String,

    /// Records per category, in discovery order within each category
    pub by_category: BTreeMap<String, Vec<ArticleRecord>>,

    pub totals: RunTotals,
}

impl CrawlOutput {
    /// Every record, category by category
    pub fn all(&self) -> Vec<&ArticleRecord> {
        self.by_category.values().flatten().collect()
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends the records and totals of `other`
    pub fn merge(&mut self, other: CrawlOutput) {
        for (category, mut records) in other.by_category {
            self.by_category
                .entry(category)
                .or_default()
                .append(&mut records);
        }
        self.totals.discovered += other.totals.discovered;
        self.totals.submitted += other.totals.submitted;
        self.totals.succeeded += other.totals.succeeded;
        self.totals.failed += other.totals.failed;
    }
}

/// Shared by every article task
struct TaskContext {
    site: Arc<SiteConfig>,
    storage: Arc<dyn Storage>,
    retry: RetryPolicy,
    wait_timeout: Duration,
}

/// Main crawler coordinator structure
pub struct Coordinator<Fa> {
    site: Arc<SiteConfig>,
    settings: CrawlSettings,
    storage: Arc<dyn Storage>,
    factory: Fa,
    config_hash: String,
}

impl<Fa> Coordinator<Fa>
where
    Fa: FetcherFactory,
{
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `site` - The site to crawl
    /// * `settings` - Pool, retry and pacing settings
    /// * `storage` - Store of URLs crawled in earlier runs
    /// * `factory` - Creates the fetcher sessions
    pub fn new(
        site: SiteConfig,
        settings: CrawlSettings,
        storage: Arc<dyn Storage>,
        factory: Fa,
    ) -> Self {
        Self {
            site: Arc::new(site),
            settings,
            storage,
            factory,
            config_hash: String::new(),
        }
    }

    /// Records `hash` with every run started by this coordinator
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    /// Crawls `categories` and returns the newly fetched articles
    ///
    /// With no categories given, they are read from the site's category menu
    /// when one is configured.
    ///
    /// # Errors
    ///
    /// [`HarvestError::PoolExhausted`] when no fetcher session could be
    /// started. Every other failure is logged and reflected in the totals.
    pub async fn crawl(&self, categories: &[CategoryEntry]) -> Result<CrawlOutput, HarvestError> {
        let run_id = match self.storage.begin_run(&self.site.name, &self.config_hash) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Could not record run start: {}", e);
                None
            }
        };

        let pool = self.start_pool(self.settings.max_workers).await;
        if pool.is_empty() {
            self.finish_run(run_id, &RunTotals::default(), RunStatus::Failed);
            return Err(HarvestError::PoolExhausted {
                requested: self.settings.max_workers,
            });
        }

        tracing::info!("Starting crawl of {}", self.site.name);

        let candidates = match self.discover(&pool, categories).await {
            Ok(candidates) => candidates,
            Err(e) => {
                pool.shutdown().await;
                self.finish_run(run_id, &RunTotals::default(), RunStatus::Failed);
                return Err(e);
            }
        };
        let discovered = candidates.len();
        let pending = self.filter_new(candidates);
        tracing::info!(
            "{}: {} candidates, {} not crawled before",
            self.site.name,
            discovered,
            pending.len()
        );

        let submitted = pending.len();
        let records = self.dispatch(&pool, pending).await;
        pool.shutdown().await;

        let mut output = CrawlOutput {
            site: self.site.name.clone(),
            ..CrawlOutput::default()
        };
        for record in records {
            output
                .by_category
                .entry(record.category.clone())
                .or_default()
                .push(record);
        }

        let succeeded = output.len();
        output.totals = RunTotals {
            discovered: discovered as u64,
            submitted: submitted as u64,
            succeeded: succeeded as u64,
            failed: (submitted - succeeded) as u64,
        };
        self.finish_run(run_id, &output.totals, RunStatus::Completed);

        tracing::info!(
            "Crawl of {} finished: {} fetched, {} failed",
            self.site.name,
            output.totals.succeeded,
            output.totals.failed
        );

        Ok(output)
    }

    /// Runs discovery and the store filter without fetching any article
    pub async fn plan(&self, categories: &[CategoryEntry]) -> Result<Vec<ArticleUrl>, HarvestError> {
        let pool = self.start_pool(1).await;
        if pool.is_empty() {
            return Err(HarvestError::PoolExhausted { requested: 1 });
        }

        let candidates = self.discover(&pool, categories).await;
        pool.shutdown().await;

        Ok(self.filter_new(candidates?))
    }

    async fn start_pool(&self, size: usize) -> WorkerPool<Fa::Fetcher> {
        let profiles = self.settings.profiles(size);
        WorkerPool::start(&self.factory, &profiles).await
    }

    /// Collects candidates for every category on one pooled session
    async fn discover(
        &self,
        pool: &WorkerPool<Fa::Fetcher>,
        categories: &[CategoryEntry],
    ) -> Result<CandidateSet, HarvestError> {
        let session = pool
            .acquire()
            .await
            .map_err(|_| HarvestError::PoolExhausted {
                requested: pool.size(),
            })?;

        let categories = match (&self.site.category_menu, categories.is_empty()) {
            (Some(menu), true) => {
                discover_categories(
                    &*session,
                    menu,
                    &self.site.canonical_prefix,
                    &self.settings.retry,
                    self.settings.wait_timeout,
                )
                .await
            }
            _ => categories.to_vec(),
        };

        let traversal = Traversal::new(
            &self.site,
            self.settings.retry.clone(),
            self.settings.wait_timeout,
            self.settings.settle_delay,
        );

        let mut candidates = CandidateSet::new();
        for category in &categories {
            traversal.discover(&*session, category, &mut candidates).await;
        }

        Ok(candidates)
    }

    /// Keeps the candidates the store has not seen
    ///
    /// A failed lookup keeps the URL; fetching twice beats losing an article.
    fn filter_new(&self, candidates: CandidateSet) -> Vec<ArticleUrl> {
        candidates
            .into_vec()
            .into_iter()
            .filter(|candidate| match self.storage.exists(&candidate.url) {
                Ok(seen) => !seen,
                Err(e) => {
                    tracing::warn!("Dedup lookup failed for {}: {}", candidate.url, e);
                    true
                }
            })
            .collect()
    }

    /// Fetches every pending article, returning the successes in dispatch order
    async fn dispatch(
        &self,
        pool: &WorkerPool<Fa::Fetcher>,
        pending: Vec<ArticleUrl>,
    ) -> Vec<ArticleRecord> {
        let context = Arc::new(TaskContext {
            site: Arc::clone(&self.site),
            storage: Arc::clone(&self.storage),
            retry: self.settings.retry.clone(),
            wait_timeout: self.settings.wait_timeout,
        });

        let mut tasks = JoinSet::new();
        for (index, target) in pending.into_iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.politeness_delay()).await;
            }

            let pool = pool.clone();
            let context = Arc::clone(&context);
            tasks.spawn(async move { (index, fetch_article(pool, context, target).await) });
        }

        let mut fetched = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Some(record))) => fetched.push((index, record)),
                Ok((_, None)) => {}
                Err(e) => tracing::error!("Article task panicked: {}", e),
            }
        }

        fetched.sort_by_key(|(index, _)| *index);
        fetched.into_iter().map(|(_, record)| record).collect()
    }

    fn finish_run(&self, run_id: Option<i64>, totals: &RunTotals, status: RunStatus) {
        if let Some(run_id) = run_id {
            if let Err(e) = self.storage.finish_run(run_id, totals, status) {
                tracing::warn!("Could not record run {} totals: {}", run_id, e);
            }
        }
    }
}

/// Fetches one article on a pooled session and marks it crawled
async fn fetch_article<F>(
    pool: WorkerPool<F>,
    context: Arc<TaskContext>,
    target: ArticleUrl,
) -> Option<ArticleRecord>
where
    F: PageFetcher + 'static,
{
    let session = match pool.acquire().await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("No session for {}: {}", target.url, e);
            return None;
        }
    };

    let fetcher: &F = &session;
    let target_ref = &target;
    let selectors = &context.site.article;
    let wait_timeout = context.wait_timeout;
    let label = format!("Article {}", target.url);

    let result = execute_with_retry(&context.retry, &label, move |_| {
        extract_article(fetcher, target_ref, selectors, wait_timeout)
    })
    .await;
    drop(session);

    match result {
        Ok(record) => {
            if let Err(e) = context.storage.mark_crawled(&record.url) {
                tracing::warn!("Could not mark {} as crawled: {}", record.url, e);
            }
            Some(record)
        }
        Err(e) => {
            tracing::error!(
                "Failed to fetch {} after {} attempt(s): {}",
                target.url,
                e.attempts(),
                e.last_error()
            );
            None
        }
    }
}
