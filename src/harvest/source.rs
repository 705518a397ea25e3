//! Candidate URL sources for parameter harvesting

use crate::KageError;
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Extensions dropped from candidate lists
///
/// Parsed from a comma-separated list such as `"png, .jpg,CSS"`; matching
/// is case-insensitive against the end of the URL path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionFilter {
    extensions: Vec<String>,
}

impl ExclusionFilter {
    pub fn parse(pattern: &str) -> Self {
        let extensions = pattern
            .split(',')
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn is_excluded(&self, url: &str) -> bool {
        if self.extensions.is_empty() {
            return false;
        }

        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_lowercase(),
            Err(_) => url
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_lowercase(),
        };

        self.extensions
            .iter()
            .any(|ext| path.ends_with(&format!(".{}", ext)))
    }

    /// Drops excluded URLs, keeping order
    pub fn apply(&self, urls: Vec<String>) -> Vec<String> {
        if self.is_empty() {
            return urls;
        }
        urls.into_iter().filter(|u| !self.is_excluded(u)).collect()
    }
}

/// Produces the candidate URL corpus for a domain
#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn candidates(&self, domain: &str, exclude: &ExclusionFilter) -> Result<Vec<String>, KageError>;
}

/// One URL per line from a file; blank lines skipped
pub struct FileCandidates {
    path: PathBuf,
}

impl FileCandidates {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CandidateSource for FileCandidates {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn candidates(&self, _domain: &str, exclude: &ExclusionFilter) -> Result<Vec<String>, KageError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let urls = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(exclude.apply(urls))
    }
}

/// Fixed in-memory list
pub struct StaticCandidates {
    urls: Vec<String>,
}

impl StaticCandidates {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

#[async_trait]
impl CandidateSource for StaticCandidates {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn candidates(&self, _domain: &str, exclude: &ExclusionFilter) -> Result<Vec<String>, KageError> {
        Ok(exclude.apply(self.urls.clone()))
    }
}

/// Archived URLs from a CDX endpoint
pub struct WaybackCandidates {
    client: Client,
    endpoint: String,
}

impl WaybackCandidates {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, KageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl CandidateSource for WaybackCandidates {
    fn name(&self) -> &'static str {
        "wayback"
    }

    async fn candidates(&self, domain: &str, exclude: &ExclusionFilter) -> Result<Vec<String>, KageError> {
        let target = format!("{}/*", domain);
        debug!("Querying CDX endpoint {} for {}", self.endpoint, target);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("url", target.as_str()),
                ("output", "txt"),
                ("fl", "original"),
                ("collapse", "urlkey"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(KageError::Candidates(format!(
                "CDX endpoint returned HTTP {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let urls: Vec<String> = body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        debug!("CDX endpoint returned {} URLs for {}", urls.len(), domain);
        Ok(exclude.apply(urls))
    }
}
