//! Integration tests for the crawler
//!
//! These tests use wiremock to stand up mock storefronts and drive the
//! full discovery, crawl and persistence cycle end-to-end.

mod common;
mod crawl_tests;
mod discovery_tests;
mod strategy_tests;
