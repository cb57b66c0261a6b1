//! Coordinator behaviour against scripted sites

use crate::mock_site::{MockFactory, MockSite, LISTING_LINK, LISTING_READY, MENU_LINK};
use news_harvest::config::{
    ArticleSelectors, CategoryEntry, CategoryMenuConfig, Pagination, SiteConfig,
};
use news_harvest::crawler::{harvest_sites, Coordinator, CrawlSettings, RetryPolicy};
use news_harvest::output::{JsonFileSink, OutputError};
use news_harvest::storage::{
    RunRecord, RunStatus, RunTotals, SqliteStorage, Storage, StorageError, StorageResult,
};
use news_harvest::{ArticleRecord, HarvestError};
use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const BASE: &str = "https://news.example.com";

fn url(path: &str) -> String {
    format!("{}{}", BASE, path)
}

fn create_test_site() -> SiteConfig {
    SiteConfig {
        name: "example".to_string(),
        canonical_prefix: format!("{}/", BASE),
        article_prefix: Some(url("/news/")),
        pagination: Pagination::Flat,
        max_pages: 5,
        max_expansions: 5,
        page_suffix: "-p{page}".to_string(),
        listing_ready: Some(LISTING_READY.to_string()),
        listing_link: LISTING_LINK.to_string(),
        next_button: None,
        categories: vec![CategoryEntry {
            name: "World".to_string(),
            url: url("/world"),
        }],
        category_menu: None,
        subcategories: BTreeMap::new(),
        article: ArticleSelectors {
            ready: "article".to_string(),
            title: "h1".to_string(),
            date: "time".to_string(),
            date_attribute: Some("datetime".to_string()),
            description: None,
            paragraphs: "article p".to_string(),
        },
    }
}

fn create_test_settings(max_workers: usize) -> CrawlSettings {
    CrawlSettings {
        max_workers,
        retry: RetryPolicy::new(3, Duration::ZERO, Duration::ZERO),
        page_load_timeout: Duration::from_secs(30),
        wait_timeout: Duration::from_secs(10),
        settle_delay: Duration::ZERO,
        politeness_min: Duration::ZERO,
        politeness_max: Duration::ZERO,
        user_agents: vec!["TestAgent/1.0".to_string()],
        proxy: None,
    }
}

/// World listing with A and B on page 1 and nothing on page 2
fn two_article_site() -> MockSite {
    MockSite::new()
        .listing(&url("/world"), &[&url("/news/a"), &url("/news/b")])
        .listing(&url("/world-p2"), &[])
        .article(&url("/news/a"), "Article A", &["Body of A."])
        .article(&url("/news/b"), "Article B", &["Body of B."])
}

fn coordinator(
    site: &Arc<MockSite>,
    storage: &Arc<SqliteStorage>,
    settings: CrawlSettings,
) -> Coordinator<MockFactory> {
    let storage: Arc<dyn Storage> = storage.clone();
    Coordinator::new(
        create_test_site(),
        settings,
        storage,
        MockFactory::new(Arc::clone(site)),
    )
}

#[tokio::test]
async fn test_flat_listing_stops_at_empty_page() {
    let site = Arc::new(two_article_site());
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let coordinator = coordinator(&site, &storage, create_test_settings(2));

    let output = coordinator
        .crawl(&create_test_site().categories)
        .await
        .unwrap();

    let urls: Vec<_> = output.all().iter().map(|r| r.url.clone()).collect();
    assert_eq!(urls, vec![url("/news/a"), url("/news/b")]);
    assert_eq!(site.loads_of(&url("/world")), 1);
    assert_eq!(site.loads_of(&url("/world-p2")), 1);
    assert_eq!(site.loads_of(&url("/world-p3")), 0);

    let record = &output.by_category["World"][0];
    assert_eq!(record.title, "Article A");
    assert_eq!(record.date, "2025-03-01T08:00:00Z");
    assert_eq!(record.content, "Body of A.");
}

#[tokio::test]
async fn test_rerun_submits_zero_fetches() {
    let site = Arc::new(two_article_site());
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());

    let first = coordinator(&site, &storage, create_test_settings(2))
        .crawl(&create_test_site().categories)
        .await
        .unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(storage.count_crawled().unwrap(), 2);

    let second = coordinator(&site, &storage, create_test_settings(2))
        .crawl(&create_test_site().categories)
        .await
        .unwrap();

    assert!(second.is_empty());
    assert_eq!(second.totals.discovered, 2);
    assert_eq!(second.totals.submitted, 0);
    assert_eq!(site.loads_of(&url("/news/a")), 1);
    assert_eq!(site.loads_of(&url("/news/b")), 1);
}

#[tokio::test]
async fn test_only_unseen_urls_submitted() {
    let site = Arc::new(two_article_site());
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    storage.mark_crawled(&url("/news/a")).unwrap();

    let output = coordinator(&site, &storage, create_test_settings(2))
        .crawl(&create_test_site().categories)
        .await
        .unwrap();

    let urls: Vec<_> = output.all().iter().map(|r| r.url.clone()).collect();
    assert_eq!(urls, vec![url("/news/b")]);
    assert_eq!(site.loads_of(&url("/news/a")), 0);
    assert_eq!(output.totals.submitted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_back_off_then_succeed() {
    let site = Arc::new(
        MockSite::new()
            .listing(&url("/world"), &[&url("/news/b")])
            .listing(&url("/world-p2"), &[])
            .article(&url("/news/b"), "Article B", &["Body of B."])
            .fail_times(&url("/news/b"), 2),
    );
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let mut settings = create_test_settings(1);
    settings.retry = RetryPolicy::new(3, Duration::from_secs(2), Duration::ZERO);

    let start = tokio::time::Instant::now();
    let output = coordinator(&site, &storage, settings)
        .crawl(&create_test_site().categories)
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(output.len(), 1);
    assert_eq!(site.loads_of(&url("/news/b")), 3);
    assert!(storage.exists(&url("/news/b")).unwrap());

    // 2s before the second attempt, 4s before the third
    assert!(elapsed >= Duration::from_secs(6));
    assert!(elapsed < Duration::from_millis(6100));
}

#[tokio::test]
async fn test_failed_articles_are_not_marked() {
    let site = Arc::new(
        MockSite::new()
            .listing(
                &url("/world"),
                &[&url("/news/ok"), &url("/news/empty"), &url("/news/down"), &url("/news/gone")],
            )
            .listing(&url("/world-p2"), &[])
            .article(&url("/news/ok"), "Fine", &["Text."])
            .article(&url("/news/empty"), "No body", &["   "])
            .article(&url("/news/down"), "Down", &["Text."])
            .fail_times(&url("/news/down"), 10),
    );
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());

    let output = coordinator(&site, &storage, create_test_settings(2))
        .crawl(&create_test_site().categories)
        .await
        .unwrap();

    assert_eq!(output.len(), 1);
    assert_eq!(output.totals.submitted, 4);
    assert_eq!(output.totals.failed, 3);
    assert!(storage.exists(&url("/news/ok")).unwrap());
    assert!(!storage.exists(&url("/news/empty")).unwrap());
    assert!(!storage.exists(&url("/news/down")).unwrap());

    // empty content and 404 are terminal, timeouts use every attempt
    assert_eq!(site.loads_of(&url("/news/empty")), 1);
    assert_eq!(site.loads_of(&url("/news/gone")), 1);
    assert_eq!(site.loads_of(&url("/news/down")), 3);
}

#[tokio::test]
async fn test_pool_sessions_reused_and_closed_once() {
    let site = Arc::new(
        MockSite::new()
            .listing(
                &url("/world"),
                &[&url("/news/1"), &url("/news/2"), &url("/news/3"), &url("/news/4")],
            )
            .listing(&url("/world-p2"), &[])
            .article(&url("/news/1"), "One", &["1"])
            .article(&url("/news/2"), "Two", &["   "])
            .article(&url("/news/3"), "Three", &["3"])
            .fail_times(&url("/news/4"), 3),
    );
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());

    coordinator(&site, &storage, create_test_settings(2))
        .crawl(&create_test_site().categories)
        .await
        .unwrap();

    assert_eq!(site.created.load(Ordering::SeqCst), 2);
    assert_eq!(site.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_bounded_by_pool() {
    let hrefs: Vec<String> = (0..12).map(|i| url(&format!("/news/{}", i))).collect();
    let href_refs: Vec<&str> = hrefs.iter().map(String::as_str).collect();

    let mut mock = MockSite::new()
        .listing(&url("/world"), &href_refs)
        .listing(&url("/world-p2"), &[])
        .nav_delay(Duration::from_millis(20));
    for href in &hrefs {
        mock = mock.article(href, "Story", &["Text."]);
    }
    let site = Arc::new(mock);
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());

    let output = coordinator(&site, &storage, create_test_settings(3))
        .crawl(&create_test_site().categories)
        .await
        .unwrap();

    assert_eq!(output.len(), 12);
    assert!(site.max_active.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn test_no_sessions_is_fatal() {
    let site = Arc::new(two_article_site());
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let dyn_storage: Arc<dyn Storage> = storage.clone();

    let factory = MockFactory {
        fail_sessions: true,
        ..MockFactory::new(Arc::clone(&site))
    };
    let coordinator = Coordinator::new(
        create_test_site(),
        create_test_settings(3),
        dyn_storage,
        factory,
    );

    let result = coordinator.crawl(&create_test_site().categories).await;
    assert!(matches!(
        result,
        Err(HarvestError::PoolExhausted { requested: 3 })
    ));
    assert!(site.navigations().is_empty());

    let runs = storage.latest_runs(1).unwrap();
    assert_eq!(runs[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn test_run_totals_recorded() {
    let site = Arc::new(two_article_site());
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());

    coordinator(&site, &storage, create_test_settings(2))
        .with_config_hash("abc123")
        .crawl(&create_test_site().categories)
        .await
        .unwrap();

    let runs = storage.latest_runs(1).unwrap();
    assert_eq!(runs[0].site, "example");
    assert_eq!(runs[0].config_hash, "abc123");
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].totals.succeeded, 2);
}

#[tokio::test]
async fn test_first_category_owns_shared_url() {
    let site = Arc::new(
        MockSite::new()
            .listing(&url("/world"), &[&url("/news/shared")])
            .listing(&url("/world-p2"), &[])
            .listing(&url("/business"), &[&url("/news/shared"), &url("/news/biz")])
            .listing(&url("/business-p2"), &[])
            .article(&url("/news/shared"), "Shared", &["Text."])
            .article(&url("/news/biz"), "Biz", &["Text."]),
    );
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let categories = vec![
        CategoryEntry {
            name: "World".to_string(),
            url: url("/world"),
        },
        CategoryEntry {
            name: "Business".to_string(),
            url: url("/business"),
        },
    ];

    let output = coordinator(&site, &storage, create_test_settings(2))
        .crawl(&categories)
        .await
        .unwrap();

    assert_eq!(output.by_category["World"].len(), 1);
    assert_eq!(output.by_category["Business"].len(), 1);
    assert_eq!(output.by_category["Business"][0].url, url("/news/biz"));
    assert_eq!(site.loads_of(&url("/news/shared")), 1);
}

#[tokio::test]
async fn test_categories_from_menu() {
    let site = Arc::new(
        MockSite::new()
            .menu(
                BASE,
                &[
                    ("Home", &url("/")),
                    ("World", &url("/world")),
                    ("Elsewhere", "https://other.org/world"),
                ],
            )
            .listing(&url("/world"), &[&url("/news/a")])
            .listing(&url("/world-p2"), &[])
            .article(&url("/news/a"), "Article A", &["Body."]),
    );
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());

    let mut site_config = create_test_site();
    site_config.categories.clear();
    site_config.category_menu = Some(CategoryMenuConfig {
        home: BASE.to_string(),
        selector: MENU_LINK.to_string(),
        exclude: vec!["Home".to_string()],
    });
    let dyn_storage: Arc<dyn Storage> = storage.clone();
    let coordinator = Coordinator::new(
        site_config,
        create_test_settings(1),
        dyn_storage,
        MockFactory::new(Arc::clone(&site)),
    );

    let output = coordinator.crawl(&[]).await.unwrap();

    assert_eq!(output.len(), 1);
    assert_eq!(output.by_category["World"][0].url, url("/news/a"));
}

#[tokio::test]
async fn test_plan_lists_pending_without_fetching() {
    let site = Arc::new(two_article_site());
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    storage.mark_crawled(&url("/news/b")).unwrap();

    let pending = coordinator(&site, &storage, create_test_settings(2))
        .plan(&create_test_site().categories)
        .await
        .unwrap();

    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].url, url("/news/a"));
    assert_eq!(pending[0].category, "World");
    assert_eq!(site.loads_of(&url("/news/a")), 0);
}

/// Store whose lookups or writes fail on demand
struct FlakyStorage {
    inner: SqliteStorage,
    fail_exists: bool,
    fail_mark: bool,
}

impl FlakyStorage {
    fn new(fail_exists: bool, fail_mark: bool) -> Self {
        Self {
            inner: SqliteStorage::new_in_memory().unwrap(),
            fail_exists,
            fail_mark,
        }
    }
}

impl Storage for FlakyStorage {
    fn exists(&self, url: &str) -> StorageResult<bool> {
        if self.fail_exists {
            return Err(StorageError::LockPoisoned);
        }
        self.inner.exists(url)
    }

    fn mark_crawled(&self, url: &str) -> StorageResult<()> {
        if self.fail_mark {
            return Err(StorageError::LockPoisoned);
        }
        self.inner.mark_crawled(url)
    }

    fn count_crawled(&self) -> StorageResult<u64> {
        self.inner.count_crawled()
    }

    fn begin_run(&self, site: &str, config_hash: &str) -> StorageResult<i64> {
        self.inner.begin_run(site, config_hash)
    }

    fn finish_run(
        &self,
        run_id: i64,
        totals: &RunTotals,
        status: RunStatus,
    ) -> StorageResult<()> {
        self.inner.finish_run(run_id, totals, status)
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.inner.get_run(run_id)
    }

    fn latest_runs(&self, limit: u32) -> StorageResult<Vec<RunRecord>> {
        self.inner.latest_runs(limit)
    }
}

fn flaky_coordinator(
    site: &Arc<MockSite>,
    storage: &Arc<FlakyStorage>,
) -> Coordinator<MockFactory> {
    let storage: Arc<dyn Storage> = storage.clone();
    Coordinator::new(
        create_test_site(),
        create_test_settings(2),
        storage,
        MockFactory::new(Arc::clone(site)),
    )
}

#[tokio::test]
async fn test_failed_lookup_keeps_candidate() {
    let site = Arc::new(two_article_site());
    let storage = Arc::new(FlakyStorage::new(true, false));
    storage.inner.mark_crawled(&url("/news/a")).unwrap();

    let output = flaky_coordinator(&site, &storage)
        .crawl(&create_test_site().categories)
        .await
        .unwrap();

    // A is already crawled, but the store could not say so
    assert_eq!(output.totals.submitted, 2);
    assert_eq!(output.len(), 2);
    assert_eq!(site.loads_of(&url("/news/a")), 1);
    assert!(storage.inner.exists(&url("/news/b")).unwrap());
}

#[tokio::test]
async fn test_failed_mark_still_returns_records() {
    let site = Arc::new(two_article_site());
    let storage = Arc::new(FlakyStorage::new(false, true));

    let first = flaky_coordinator(&site, &storage)
        .crawl(&create_test_site().categories)
        .await
        .unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(first.totals.failed, 0);
    assert_eq!(storage.count_crawled().unwrap(), 0);

    // nothing was recorded, so the next run fetches both again
    let second = flaky_coordinator(&site, &storage)
        .crawl(&create_test_site().categories)
        .await
        .unwrap();

    assert_eq!(second.totals.submitted, 2);
    assert_eq!(second.len(), 2);
    assert_eq!(site.loads_of(&url("/news/a")), 2);
}

fn read_saved(sink: &JsonFileSink) -> Vec<ArticleRecord> {
    let json = fs::read_to_string(sink.path_for("all")).unwrap();
    serde_json::from_str(&json).unwrap()
}

#[tokio::test]
async fn test_unwritable_output_fails_before_marking() {
    let site = Arc::new(two_article_site());
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let temp_dir = tempfile::TempDir::new().unwrap();
    let output_dir = temp_dir.path().join("data");
    fs::write(&output_dir, "a file where the directory should be").unwrap();
    let sink = JsonFileSink::new(&output_dir, "articles");
    let sites = vec![create_test_site()];

    let result = harvest_sites(
        &sites,
        &create_test_settings(2),
        storage.clone(),
        MockFactory::new(Arc::clone(&site)),
        "hash",
        &sink,
    )
    .await;

    assert!(matches!(
        result,
        Err(HarvestError::Output(OutputError::Write { .. }))
    ));
    assert!(site.navigations().is_empty());
    assert_eq!(storage.count_crawled().unwrap(), 0);

    // once the destination is fixed the same articles are fetched and saved
    fs::remove_file(&output_dir).unwrap();
    let output = harvest_sites(
        &sites,
        &create_test_settings(2),
        storage.clone(),
        MockFactory::new(Arc::clone(&site)),
        "hash",
        &sink,
    )
    .await
    .unwrap();

    assert_eq!(output.len(), 2);
    assert_eq!(read_saved(&sink).len(), 2);
    assert_eq!(storage.count_crawled().unwrap(), 2);
}

#[tokio::test]
async fn test_failed_site_keeps_earlier_articles() {
    let site = Arc::new(two_article_site());
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let temp_dir = tempfile::TempDir::new().unwrap();
    let sink = JsonFileSink::new(temp_dir.path(), "articles");

    let mut second = create_test_site();
    second.name = "second".to_string();
    let sites = vec![create_test_site(), second];

    // the first site uses both sessions, the second cannot start any
    let factory = MockFactory::new(Arc::clone(&site)).with_session_limit(2);
    let result = harvest_sites(
        &sites,
        &create_test_settings(2),
        storage.clone(),
        factory,
        "hash",
        &sink,
    )
    .await;

    assert!(matches!(
        result,
        Err(HarvestError::PoolExhausted { requested: 2 })
    ));

    let saved: Vec<_> = read_saved(&sink).into_iter().map(|r| r.url).collect();
    assert_eq!(saved, vec![url("/news/a"), url("/news/b")]);
    assert_eq!(storage.count_crawled().unwrap(), 2);

    let runs = storage.latest_runs(2).unwrap();
    assert_eq!(runs[0].site, "second");
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(runs[1].status, RunStatus::Completed);
}
