//! HTML parser for turning a loaded document into element snapshots
//!
//! This module handles parsing HTML content to:
//! - Select elements with CSS selectors
//! - Capture their whitespace-collapsed text
//! - Capture their attributes, with `href`/`src` resolved to absolute URLs

use crate::crawler::fetcher::{Element, FetchError};
use crate::url::resolve_link;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use url::Url;

/// Attributes that hold URLs and are resolved against the page URL
const URL_ATTRIBUTES: &[&str] = &["href", "src"];

/// Parses a CSS selector
pub fn parse_selector(selector: &str) -> Result<Selector, FetchError> {
    Selector::parse(selector).map_err(|_| FetchError::InvalidSelector(selector.to_string()))
}

/// Returns snapshots of every element of `html` matching `selector`
///
/// # Arguments
///
/// * `html` - The HTML content
/// * `base_url` - The page URL, used to resolve relative links
/// * `selector` - CSS selector
///
/// # Example
///
/// ```
/// use news_harvest::crawler::select_elements;
/// use url::Url;
///
/// let html = r#"<html><body><a class="t" href="/a">First</a></body></html>"#;
/// let base = Url::parse("https://example.com/news").unwrap();
/// let found = select_elements(html, &base, "a.t").unwrap();
/// assert_eq!(found[0].attribute("href"), Some("https://example.com/a"));
/// ```
pub fn select_elements(
    html: &str,
    base_url: &Url,
    selector: &str,
) -> Result<Vec<Element>, FetchError> {
    let selector = parse_selector(selector)?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&selector)
        .map(|element| snapshot(element, base_url))
        .collect())
}

/// Returns true if `selector` matches anything in `html`
pub fn matches_any(html: &str, selector: &str) -> Result<bool, FetchError> {
    let selector = parse_selector(selector)?;
    let document = Html::parse_document(html);
    let found = document.select(&selector).next().is_some();
    Ok(found)
}

fn snapshot(element: ElementRef<'_>, base_url: &Url) -> Element {
    let text = collapse_whitespace(&element.text().collect::<String>());

    let attributes: HashMap<String, String> = element
        .value()
        .attrs()
        .map(|(name, value)| {
            let value = if URL_ATTRIBUTES.contains(&name) {
                resolve_link(value, base_url).unwrap_or_else(|| value.to_string())
            } else {
                value.to_string()
            };
            (name.to_string(), value)
        })
        .collect();

    Element::new(text, attributes)
}

/// Collapses runs of whitespace into single spaces and trims the ends
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
