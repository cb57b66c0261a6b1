use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for News-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub browser: BrowserConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteConfig>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of page fetcher sessions (and concurrent article fetches)
    #[serde(rename = "max-workers", default = "default_max_workers")]
    pub max_workers: u32,

    /// Maximum attempts per network-bound operation
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base delay (milliseconds)
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound of the random jitter added to each backoff (milliseconds)
    #[serde(rename = "jitter-ms", default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Timeout for a single page load (seconds)
    #[serde(
        rename = "page-load-timeout-secs",
        default = "default_page_load_timeout_secs"
    )]
    pub page_load_timeout_secs: u64,

    /// Timeout when waiting for a selector to appear (seconds)
    #[serde(rename = "wait-timeout-secs", default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,

    /// Pause after a listing page loads or expands (milliseconds)
    #[serde(rename = "settle-delay-ms", default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Lower bound of the pause between two article dispatches (milliseconds)
    #[serde(rename = "politeness-min-ms", default = "default_politeness_min_ms")]
    pub politeness_min_ms: u64,

    /// Upper bound of the pause between two article dispatches (milliseconds)
    #[serde(rename = "politeness-max-ms", default = "default_politeness_max_ms")]
    pub politeness_max_ms: u64,
}

impl CrawlerConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            jitter_ms: default_jitter_ms(),
            page_load_timeout_secs: default_page_load_timeout_secs(),
            wait_timeout_secs: default_wait_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            politeness_min_ms: default_politeness_min_ms(),
            politeness_max_ms: default_politeness_max_ms(),
        }
    }
}

fn default_max_workers() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_jitter_ms() -> u64 {
    3000
}

fn default_page_load_timeout_secs() -> u64 {
    30
}

fn default_wait_timeout_secs() -> u64 {
    10
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_politeness_min_ms() -> u64 {
    1000
}

fn default_politeness_max_ms() -> u64 {
    2000
}

/// Page fetcher session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// User agents; each session picks one at random
    #[serde(rename = "user-agents")]
    pub user_agents: Vec<String>,

    /// Optional proxy address (`host:port` or a full URL)
    #[serde(default)]
    pub proxy: Option<String>,

    /// URL fetched through the proxy to check that it works
    #[serde(rename = "proxy-probe-url", default = "default_proxy_probe_url")]
    pub proxy_probe_url: String,
}

fn default_proxy_probe_url() -> String {
    "http://httpbin.org/ip".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database holding crawled URLs
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory receiving the JSON article files
    #[serde(rename = "output-dir")]
    pub output_dir: String,

    /// File name prefix, e.g. `bbc_articles` gives `bbc_articles_all.json`
    #[serde(rename = "file-prefix", default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_file_prefix() -> String {
    "articles".to_string()
}

/// How a site's listing pages continue past the first page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pagination {
    /// Numbered pages built from a suffix (`/news-p2`, `/news-p3`, ...)
    Flat,
    /// Subcategory pages expanded with a "next"/"load more" control
    Nested,
}

/// A named category and its listing URL
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
    pub url: String,
}

/// Navigation menu used to enumerate categories when none are listed
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryMenuConfig {
    /// Page carrying the menu
    pub home: String,

    /// Selector matching the menu's category links
    pub selector: String,

    /// Menu entries to skip, by link text
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Selectors used to extract a single article
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleSelectors {
    /// Element whose presence marks the article as loaded
    pub ready: String,

    pub title: String,

    pub date: String,

    /// Attribute holding the date; the element text is used when absent
    #[serde(rename = "date-attribute", default)]
    pub date_attribute: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Paragraphs concatenated into the article content
    pub paragraphs: String,
}

/// Per-site crawl configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub name: String,

    /// Every retained URL must start with this prefix
    #[serde(rename = "canonical-prefix")]
    pub canonical_prefix: String,

    /// Narrower prefix article links must also match
    #[serde(rename = "article-prefix", default)]
    pub article_prefix: Option<String>,

    pub pagination: Pagination,

    /// Listing pages per category (flat)
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Clicks on the "next"/"load more" control per listing (nested)
    #[serde(rename = "max-expansions", default = "default_max_expansions")]
    pub max_expansions: u32,

    /// Suffix appended to the category URL for page 2 onward
    #[serde(rename = "page-suffix", default = "default_page_suffix")]
    pub page_suffix: String,

    /// Element whose presence marks a listing page as rendered
    #[serde(rename = "listing-ready", default)]
    pub listing_ready: Option<String>,

    /// Selector matching article links on a listing page
    #[serde(rename = "listing-link")]
    pub listing_link: String,

    /// "Next"/"load more" control (nested pagination)
    #[serde(rename = "next-button", default)]
    pub next_button: Option<String>,

    #[serde(default)]
    pub categories: Vec<CategoryEntry>,

    #[serde(rename = "category-menu", default)]
    pub category_menu: Option<CategoryMenuConfig>,

    /// Category URL prefix -> subcategory path segments
    #[serde(default)]
    pub subcategories: BTreeMap<String, Vec<String>>,

    pub article: ArticleSelectors,
}

fn default_max_pages() -> u32 {
    2
}

fn default_max_expansions() -> u32 {
    50
}

fn default_page_suffix() -> String {
    "-p{page}".to_string()
}
