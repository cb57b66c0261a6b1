use crate::config::types::{
    BrowserConfig, CategoryEntry, Config, CrawlerConfig, OutputConfig, Pagination, SiteConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_browser_config(&config.browser)?;
    validate_output_config(&config.output)?;
    for site in &config.sites {
        validate_site(site)?;
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_workers < 1 || config.max_workers > 32 {
        return Err(ConfigError::Validation(format!(
            "max_workers must be between 1 and 32, got {}",
            config.max_workers
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.page_load_timeout_secs == 0 || config.wait_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "page_load_timeout_secs and wait_timeout_secs must be > 0".to_string(),
        ));
    }

    if config.politeness_min_ms > config.politeness_max_ms {
        return Err(ConfigError::Validation(format!(
            "politeness_min_ms ({}) cannot exceed politeness_max_ms ({})",
            config.politeness_min_ms, config.politeness_max_ms
        )));
    }

    Ok(())
}

/// Validates session configuration
fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if config.user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "user_agents must contain at least one entry".to_string(),
        ));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user_agents cannot contain empty strings".to_string(),
        ));
    }

    if let Some(proxy) = &config.proxy {
        if proxy.trim().is_empty() {
            return Err(ConfigError::Validation(
                "proxy cannot be an empty string".to_string(),
            ));
        }
    }

    Url::parse(&config.proxy_probe_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy_probe_url: {}", e)))?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.output_dir.is_empty() {
        return Err(ConfigError::Validation(
            "output_dir cannot be empty".to_string(),
        ));
    }

    if config.file_prefix.is_empty() {
        return Err(ConfigError::Validation(
            "file_prefix cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a site entry
fn validate_site(site: &SiteConfig) -> Result<(), ConfigError> {
    if site.name.is_empty() {
        return Err(ConfigError::Validation(
            "site name cannot be empty".to_string(),
        ));
    }

    validate_http_url(&site.canonical_prefix, "canonical-prefix")?;

    if let Some(prefix) = &site.article_prefix {
        validate_http_url(prefix, "article-prefix")?;
        if !prefix.starts_with(&site.canonical_prefix) {
            return Err(ConfigError::Validation(format!(
                "article-prefix '{}' must start with canonical-prefix '{}'",
                prefix, site.canonical_prefix
            )));
        }
    }

    if site.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages for site '{}' must be >= 1",
            site.name
        )));
    }

    if site.max_expansions < 1 {
        return Err(ConfigError::Validation(format!(
            "max_expansions for site '{}' must be >= 1",
            site.name
        )));
    }

    if site.listing_link.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "listing-link for site '{}' cannot be empty",
            site.name
        )));
    }

    match site.pagination {
        Pagination::Flat => {
            if !site.page_suffix.contains("{page}") {
                return Err(ConfigError::Validation(format!(
                    "page-suffix '{}' must contain the {{page}} placeholder",
                    site.page_suffix
                )));
            }
        }
        Pagination::Nested => {
            if site.next_button.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::Validation(format!(
                    "site '{}' uses nested pagination and needs a next-button selector",
                    site.name
                )));
            }
        }
    }

    if site.categories.is_empty() && site.category_menu.is_none() {
        return Err(ConfigError::Validation(format!(
            "site '{}' needs categories or a category-menu",
            site.name
        )));
    }

    for category in &site.categories {
        validate_category(category, &site.canonical_prefix)?;
    }

    if let Some(menu) = &site.category_menu {
        validate_http_url(&menu.home, "category-menu.home")?;
    }

    for prefix in site.subcategories.keys() {
        validate_http_url(prefix, "subcategories key")?;
    }

    let article = &site.article;
    for (name, selector) in [
        ("article.ready", &article.ready),
        ("article.title", &article.title),
        ("article.date", &article.date),
        ("article.paragraphs", &article.paragraphs),
    ] {
        if selector.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{} for site '{}' cannot be empty",
                name, site.name
            )));
        }
    }

    Ok(())
}

/// Validates a static category entry
fn validate_category(category: &CategoryEntry, canonical_prefix: &str) -> Result<(), ConfigError> {
    if category.name.is_empty() {
        return Err(ConfigError::Validation(
            "category name cannot be empty".to_string(),
        ));
    }

    validate_http_url(&category.url, "category url")?;

    if !category.url.starts_with(canonical_prefix.trim_end_matches('/')) {
        return Err(ConfigError::Validation(format!(
            "category url '{}' is outside canonical-prefix '{}'",
            category.url, canonical_prefix
        )));
    }

    Ok(())
}

/// Checks that a string is an absolute http(s) URL
fn validate_http_url(value: &str, field: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}
