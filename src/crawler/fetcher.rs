//! Page fetcher capability
//!
//! The crawl core only talks to pages through the [`PageFetcher`] trait: a
//! stateful session that navigates, waits for content, queries elements and
//! follows controls. Sessions are created by a [`FetcherFactory`] from a
//! [`SessionProfile`] and reused across many fetches by the worker pool.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a page fetcher session
#[derive(Debug, Error)]
pub enum FetchError {
    /// The session could not be started
    #[error("Failed to start fetcher session: {0}")]
    SessionInit(String),

    /// Navigation failed (connection refused, DNS, TLS, reset...)
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// The page did not load in time
    #[error("Timed out loading {url}")]
    Timeout { url: String },

    /// The server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// The awaited selector did not show up
    #[error("Selector '{selector}' not found within {timeout:?}")]
    SelectorTimeout { selector: String, timeout: Duration },

    /// A required element was missing from a loaded page
    #[error("Element '{selector}' missing on {url}")]
    MissingElement { selector: String, url: String },

    /// The page loaded but had no extractable body
    #[error("No content extracted from {url}")]
    EmptyContent { url: String },

    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),

    /// No page has been loaded in this session yet
    #[error("No page loaded")]
    NoPage,

    /// The session cannot perform this action
    #[error("Unsupported action: {0}")]
    Unsupported(String),
}

impl FetchError {
    /// Returns true if repeating the operation may succeed
    ///
    /// | Error | Retry |
    /// |-------|-------|
    /// | Navigation, Timeout, SelectorTimeout, MissingElement | yes |
    /// | HttpStatus 408, 429, 5xx | yes |
    /// | HttpStatus other | no |
    /// | EmptyContent, InvalidSelector, Unsupported, NoPage, SessionInit | no |
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Navigation { .. }
            | Self::Timeout { .. }
            | Self::SelectorTimeout { .. }
            | Self::MissingElement { .. } => true,
            Self::HttpStatus { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            Self::SessionInit(_)
            | Self::EmptyContent { .. }
            | Self::InvalidSelector(_)
            | Self::NoPage
            | Self::Unsupported(_) => false,
        }
    }
}

/// Owned snapshot of a page element
///
/// Snapshots stay valid after the session navigates elsewhere, so they can
/// be collected first and inspected later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    text: String,
    attributes: HashMap<String, String>,
}

impl Element {
    pub fn new(text: impl Into<String>, attributes: HashMap<String, String>) -> Self {
        Self {
            text: text.into(),
            attributes,
        }
    }

    /// Builder used by fetchers and tests
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Rendered text content
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// A control is enabled unless it carries `disabled` or `aria-disabled="true"`
    pub fn is_enabled(&self) -> bool {
        if self.attributes.contains_key("disabled") {
            return false;
        }
        !matches!(self.attribute("aria-disabled"), Some("true"))
    }
}

/// Configuration a fetcher session is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProfile {
    pub user_agent: String,
    pub proxy: Option<String>,
    pub page_load_timeout: Duration,
}

/// A live page fetcher session
///
/// Methods take `&self` so a checked-out session can be shared by the
/// closures of a retried operation; the worker pool guarantees that only
/// one task uses a session at a time.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Loads `url`, replacing the current page
    async fn navigate(&self, url: &str) -> Result<(), FetchError>;

    /// Waits until `selector` matches on the current page
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), FetchError>;

    /// Returns snapshots of every element matching `selector`
    async fn find_all(&self, selector: &str) -> Result<Vec<Element>, FetchError>;

    /// Activates a control found on the current page
    async fn click(&self, element: &Element) -> Result<(), FetchError>;

    /// Gives the current page time to finish rendering
    async fn settle(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Releases the session's resources
    async fn close(&self) -> Result<(), FetchError>;
}

/// Creates fetcher sessions for the worker pool
#[async_trait]
pub trait FetcherFactory: Send + Sync {
    type Fetcher: PageFetcher + 'static;

    async fn create(&self, profile: &SessionProfile) -> Result<Self::Fetcher, FetchError>;
}
