//! Bot-mitigation detection
//!
//! One lightweight probe decides whether a target sits behind an active
//! challenge layer. A probe that fails or times out is reported as
//! undetermined, which callers treat as protected.

use crate::config::HttpConfig;
use crate::crawler::fetcher::build_http_client;
use crate::crawler::identity::IdentityPool;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, SERVER, SET_COOKIE, USER_AGENT};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Body fragments found on challenge interstitials
const CHALLENGE_MARKERS: &[&str] = &[
    "Just a moment...",
    "cf-browser-verification",
    "challenge-platform",
    "cf_chl_opt",
    "Attention Required! | Cloudflare",
    "_Incapsula_Resource",
    "captcha-delivery.com",
];

/// Cookies set by mitigation layers while a challenge is pending
const CHALLENGE_COOKIES: &[(&str, &str)] = &[
    ("cf_clearance", "Cloudflare"),
    ("__cf_bm", "Cloudflare"),
    ("__cfduid", "Cloudflare"),
    ("incap_ses", "Imperva Incapsula"),
    ("visid_incap", "Imperva Incapsula"),
    ("datadome", "DataDome"),
];

/// Outcome of a protection probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Protection {
    Protected(String),
    Unprotected,
    /// The probe itself failed
    Undetermined(String),
}

impl Protection {
    /// Undetermined counts as protected: the bypass path is a superset of
    /// the direct one
    pub fn is_protected(&self) -> bool {
        !matches!(self, Self::Unprotected)
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Protected(reason) | Self::Undetermined(reason) => reason.as_str(),
            Self::Unprotected => "no challenge markers",
        }
    }
}

/// Classifies targets as protected or not
#[async_trait]
pub trait ProtectionProbe: Send + Sync {
    async fn detect(&self, url: &str) -> Protection;
}

/// Probe backed by a single HTTP GET
pub struct ProtectionDetector {
    client: Client,
    identities: Arc<IdentityPool>,
}

impl ProtectionDetector {
    pub fn new(config: &HttpConfig, identities: Arc<IdentityPool>) -> Result<Self, reqwest::Error> {
        let probe_config = HttpConfig {
            timeout_secs: config.probe_timeout_secs,
            ..config.clone()
        };
        Ok(Self {
            client: build_http_client(&probe_config, None)?,
            identities,
        })
    }
}

#[async_trait]
impl ProtectionProbe for ProtectionDetector {
    async fn detect(&self, url: &str) -> Protection {
        let response = match self
            .client
            .get(url)
            .header(USER_AGENT, self.identities.choose())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Protection::Undetermined(format!("probe timed out: {}", e));
            }
            Err(e) => return Protection::Undetermined(format!("probe failed: {}", e)),
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Protection::Undetermined(format!("probe body unreadable: {}", e)),
        };

        let verdict = match classify_response(status, &headers, &body) {
            Some(reason) => Protection::Protected(reason),
            None => Protection::Unprotected,
        };
        debug!("Probe of {} (HTTP {}): {:?}", url, status, verdict);
        verdict
    }
}

/// Decides from one response whether a challenge layer intervened
///
/// Protected when the layer announces a challenge outright, when a
/// challenge status carries an interstitial fingerprint, or when challenge
/// cookies arrive without any page content.
pub fn classify_response(status: u16, headers: &HeaderMap, body: &str) -> Option<String> {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_lowercase)
    };

    if header_str("cf-mitigated").as_deref() == Some("challenge") {
        return Some("challenge announced by cf-mitigated header".to_string());
    }

    let vendor = mitigation_vendor(headers);
    let challenge_status = matches!(status, 403 | 429 | 503);

    if let Some(marker) = CHALLENGE_MARKERS.iter().find(|m| body.contains(*m)) {
        if challenge_status || vendor.is_some() {
            return Some(format!(
                "HTTP {} challenge page from {} (marker '{}')",
                status,
                vendor.unwrap_or("unknown vendor"),
                marker
            ));
        }
    }

    if let Some(cookie_vendor) = challenge_cookie(headers) {
        if challenge_status && !has_page_content(body) {
            return Some(format!(
                "HTTP {} without content and {} challenge cookie",
                status, cookie_vendor
            ));
        }
    }

    None
}

/// Identifies a mitigation vendor from server and vendor-specific headers
pub fn mitigation_vendor(headers: &HeaderMap) -> Option<&'static str> {
    if let Some(server) = headers.get(SERVER).and_then(|v| v.to_str().ok()) {
        let server = server.to_lowercase();
        if server.contains("cloudflare") {
            return Some("Cloudflare");
        }
        if server.contains("akamai") {
            return Some("Akamai");
        }
        if server.contains("imperva") {
            return Some("Imperva");
        }
        if server.contains("ddos-guard") {
            return Some("DDoS-Guard");
        }
    }

    if headers.contains_key("cf-ray") {
        return Some("Cloudflare");
    }
    if headers.contains_key("x-iinfo") {
        return Some("Imperva");
    }
    if headers.contains_key("x-datadome") {
        return Some("DataDome");
    }

    challenge_cookie(headers)
}

fn challenge_cookie(headers: &HeaderMap) -> Option<&'static str> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| {
            CHALLENGE_COOKIES
                .iter()
                .find(|(name, _)| cookie.contains(name))
                .map(|(_, vendor)| *vendor)
        })
}

fn has_page_content(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("<body") && lower.trim().len() > 256
}
