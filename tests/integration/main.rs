//! Integration tests for Kage-Recon
//!
//! HTTP collaborators are served by wiremock; stores live in temporary
//! directories so each test sees a fresh database file.

mod crawl_tests;
mod harvest_tests;
