//! Integration tests for News-Harvest
//!
//! `crawl_tests` drive the coordinator against scripted in-memory sites;
//! `http_tests` use wiremock to exercise the HTTP fetcher and a full
//! harvest end-to-end.

mod crawl_tests;
mod http_tests;
