//! HTTP page fetcher
//!
//! [`HttpFetcher`] implements the page fetcher capability over plain HTTP:
//! - Each session owns a client built from its [`SessionProfile`]
//!   (user agent, optional proxy, page load timeout)
//! - `navigate` GETs the page and keeps the body as the current document
//! - Queries run against the static document with `scraper`
//! - `click` follows the control's `href`
//!
//! Pages that only render their listing through scripts need a rendering
//! fetcher behind the same trait.

use crate::crawler::fetcher::{Element, FetchError, FetcherFactory, PageFetcher, SessionProfile};
use crate::crawler::parser::{matches_any, select_elements};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, Proxy};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use url::Url;

/// A document loaded by the session
struct LoadedPage {
    url: Url,
    html: String,
}

/// Page fetcher session backed by a `reqwest` client
pub struct HttpFetcher {
    client: Client,
    page: Mutex<Option<LoadedPage>>,
}

impl HttpFetcher {
    /// Starts a session bound to `profile`
    pub fn new(profile: &SessionProfile) -> Result<Self, FetchError> {
        let client = build_http_client(profile)
            .map_err(|e| FetchError::SessionInit(e.to_string()))?;
        Ok(Self {
            client,
            page: Mutex::new(None),
        })
    }

    /// URL of the current document, after redirects
    pub fn current_url(&self) -> Option<String> {
        self.page_slot().as_ref().map(|page| page.url.to_string())
    }

    fn page_slot(&self) -> MutexGuard<'_, Option<LoadedPage>> {
        self.page.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builds an HTTP client for a session profile
///
/// # Example
///
/// ```no_run
/// use news_harvest::crawler::{build_http_client, SessionProfile};
/// use std::time::Duration;
///
/// let profile = SessionProfile {
///     user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
///     proxy: Some("47.245.117.43:8080".to_string()),
///     page_load_timeout: Duration::from_secs(30),
/// };
///
/// let client = build_http_client(&profile).unwrap();
/// ```
pub fn build_http_client(profile: &SessionProfile) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(profile.user_agent.as_str())
        .timeout(profile.page_load_timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &profile.proxy {
        builder = builder.proxy(Proxy::all(proxy_url(proxy))?);
    }

    builder.build()
}

/// Accepts `host:port` as well as a full proxy URL
fn proxy_url(proxy: &str) -> String {
    if proxy.contains("://") {
        proxy.to_string()
    } else {
        format!("http://{}", proxy)
    }
}

/// Checks that a proxy can fetch `probe_url`
///
/// Returns false on any error or non-success status.
pub async fn probe_proxy(proxy: &str, probe_url: &str, timeout: Duration) -> bool {
    let proxy = match Proxy::all(proxy_url(proxy)) {
        Ok(proxy) => proxy,
        Err(e) => {
            tracing::warn!("Invalid proxy address {}: {}", proxy, e);
            return false;
        }
    };

    let client = match Client::builder().proxy(proxy).timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("Failed to build proxy probe client: {}", e);
            return false;
        }
    };

    match client.get(probe_url).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            tracing::debug!("Proxy probe failed: {}", e);
            false
        }
    }
}

/// Classifies a transport error
fn classify_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Navigation {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn navigate(&self, url: &str) -> Result<(), FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let html = response.text().await.map_err(|e| classify_error(url, e))?;

        *self.page_slot() = Some(LoadedPage {
            url: final_url,
            html,
        });
        Ok(())
    }

    /// The document is static, so the selector either matches now or never
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), FetchError> {
        let found = match self.page_slot().as_ref() {
            Some(page) => matches_any(&page.html, selector)?,
            None => return Err(FetchError::NoPage),
        };
        if found {
            Ok(())
        } else {
            Err(FetchError::SelectorTimeout {
                selector: selector.to_string(),
                timeout,
            })
        }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Element>, FetchError> {
        match self.page_slot().as_ref() {
            Some(page) => select_elements(&page.html, &page.url, selector),
            None => Err(FetchError::NoPage),
        }
    }

    async fn click(&self, element: &Element) -> Result<(), FetchError> {
        let target = element
            .attribute("href")
            .filter(|href| href.starts_with("http://") || href.starts_with("https://"))
            .map(str::to_string)
            .ok_or_else(|| {
                FetchError::Unsupported(format!(
                    "control '{}' has no link to follow",
                    element.text()
                ))
            })?;

        self.navigate(&target).await
    }

    async fn close(&self) -> Result<(), FetchError> {
        *self.page_slot() = None;
        Ok(())
    }
}

/// Starts [`HttpFetcher`] sessions for the worker pool
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcherFactory;

#[async_trait]
impl FetcherFactory for HttpFetcherFactory {
    type Fetcher = HttpFetcher;

    async fn create(&self, profile: &SessionProfile) -> Result<HttpFetcher, FetchError> {
        HttpFetcher::new(profile)
    }
}
