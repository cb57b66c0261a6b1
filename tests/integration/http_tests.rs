//! HTTP fetcher and full harvest tests against a wiremock server

use news_harvest::config::parse_config;
use news_harvest::crawler::{
    harvest, probe_proxy, ArticleRecord, FetchError, HttpFetcher, PageFetcher, SessionProfile,
};
use news_harvest::storage::{SqliteStorage, Storage};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_profile() -> SessionProfile {
    SessionProfile {
        user_agent: "TestAgent/1.0".to_string(),
        proxy: None,
        page_load_timeout: Duration::from_secs(5),
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(format!("<html><body>{}</body></html>", body))
}

fn article_html(title: &str) -> ResponseTemplate {
    html(&format!(
        r#"<article>
            <h1>{}</h1>
            <time datetime="2025-03-01T08:00:00Z">1 March</time>
            <p class="lead">Summary line.</p>
            <p class="body">First paragraph.</p>
            <p class="body">  </p>
            <p class="body">Second paragraph.</p>
        </article>"#,
        title
    ))
}

#[tokio::test]
async fn test_fetcher_resolves_links_against_page() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/world"))
        .respond_with(html(
            r#"<main><a class="story" href="/news/1">One</a><a class="story" href="2">Two</a></main>"#,
        ))
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&create_test_profile()).unwrap();
    fetcher
        .navigate(&format!("{}/world", mock_server.uri()))
        .await
        .unwrap();

    fetcher
        .wait_for_selector("main", Duration::from_secs(1))
        .await
        .unwrap();
    let links = fetcher.find_all("a.story").await.unwrap();
    let hrefs: Vec<_> = links.iter().filter_map(|l| l.attribute("href")).collect();
    assert_eq!(
        hrefs,
        vec![
            format!("{}/news/1", mock_server.uri()),
            format!("{}/2", mock_server.uri())
        ]
    );
}

#[tokio::test]
async fn test_fetcher_missing_selector_times_out() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(html("<div></div>"))
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&create_test_profile()).unwrap();
    fetcher
        .navigate(&format!("{}/empty", mock_server.uri()))
        .await
        .unwrap();

    let err = fetcher
        .wait_for_selector("main", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::SelectorTimeout { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_fetcher_status_classification() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&create_test_profile()).unwrap();

    let busy = fetcher
        .navigate(&format!("{}/busy", mock_server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(busy, FetchError::HttpStatus { status: 503, .. }));
    assert!(busy.is_transient());

    let missing = fetcher
        .navigate(&format!("{}/missing", mock_server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(missing, FetchError::HttpStatus { status: 404, .. }));
    assert!(!missing.is_transient());
}

#[tokio::test]
async fn test_fetcher_click_follows_link() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/world"))
        .respond_with(html(r#"<a class="next" href="/world?page=2">More</a>"#))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/world"))
        .and(wiremock::matchers::query_param("page", "2"))
        .respond_with(html(r#"<a class="story" href="/news/9">Nine</a>"#))
        .with_priority(1)
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&create_test_profile()).unwrap();
    fetcher
        .navigate(&format!("{}/world", mock_server.uri()))
        .await
        .unwrap();

    let next = fetcher.find_all("a.next").await.unwrap().remove(0);
    fetcher.click(&next).await.unwrap();

    assert_eq!(
        fetcher.current_url(),
        Some(format!("{}/world?page=2", mock_server.uri()))
    );
    assert_eq!(fetcher.find_all("a.story").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_probe_proxy() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"origin": "127.0.0.1"}"#))
        .mount(&mock_server)
        .await;

    assert!(
        probe_proxy(
            &mock_server.uri(),
            "http://probe.invalid/ip",
            Duration::from_secs(5)
        )
        .await
    );
    assert!(
        !probe_proxy(
            "127.0.0.1:1",
            "http://probe.invalid/ip",
            Duration::from_secs(5)
        )
        .await
    );
}

/// Writes a harvest configuration pointing at the mock server
fn create_test_config(base_url: &str, temp_dir: &TempDir) -> String {
    let db_path = temp_dir.path().join("seen_urls.db");
    let out_dir = temp_dir.path().join("data");

    format!(
        r#"
[crawler]
max-workers = 2
max-retries = 2
base-delay-ms = 0
jitter-ms = 0
settle-delay-ms = 0
politeness-min-ms = 0
politeness-max-ms = 0

[browser]
user-agents = ["TestAgent/1.0"]

[output]
database-path = '{db}'
output-dir = '{out}'
file-prefix = "test_articles"

[[site]]
name = "mock"
canonical-prefix = "{base}/"
article-prefix = "{base}/news/"
pagination = "flat"
max-pages = 3
listing-ready = "main"
listing-link = "a.story"
categories = [{{ name = "World", url = "{base}/world" }}]

[site.article]
ready = "article"
title = "h1"
date = "time"
date-attribute = "datetime"
description = "p.lead"
paragraphs = "article p.body"
"#,
        db = db_path.display(),
        out = out_dir.display(),
        base = base_url
    )
}

#[tokio::test]
async fn test_full_harvest_is_incremental() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/world"))
        .respond_with(html(
            r#"<main>
                <a class="story" href="/news/1">One</a>
                <a class="story" href="/news/2#comments">Two</a>
                <a class="story" href="https://elsewhere.org/news/3">Three</a>
                <a class="story" href="/sport/4">Four</a>
            </main>"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/world-p2"))
        .respond_with(html("<main></main>"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/world-p3"))
        .respond_with(html("<main></main>"))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/1"))
        .respond_with(article_html("Story one"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/2"))
        .respond_with(article_html("Story two"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config = parse_config(&create_test_config(&base_url, &temp_dir)).unwrap();

    let first = harvest(&config, "test-hash").await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first.totals.failed, 0);

    let record = first
        .all()
        .into_iter()
        .find(|r| r.url == format!("{}/news/1", base_url))
        .unwrap();
    assert_eq!(record.title, "Story one");
    assert_eq!(record.date, "2025-03-01T08:00:00Z");
    assert_eq!(record.description.as_deref(), Some("Summary line."));
    assert_eq!(record.content, "First paragraph. Second paragraph.");

    let all_path = temp_dir.path().join("data/test_articles_all.json");
    let saved: Vec<ArticleRecord> =
        serde_json::from_str(&std::fs::read_to_string(&all_path).unwrap()).unwrap();
    assert_eq!(saved.len(), 2);
    assert!(temp_dir
        .path()
        .join("data/test_articles_World.json")
        .exists());

    // Second run finds the same links and fetches nothing
    let second = harvest(&config, "test-hash").await.unwrap();
    assert!(second.is_empty());
    assert_eq!(second.totals.discovered, 2);
    assert_eq!(second.totals.submitted, 0);

    let storage = SqliteStorage::new(&temp_dir.path().join("seen_urls.db")).unwrap();
    assert_eq!(storage.count_crawled().unwrap(), 2);
    assert_eq!(storage.latest_runs(10).unwrap().len(), 2);
}
