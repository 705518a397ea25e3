//! Fetch strategies
//!
//! Three transport paths sit behind the [`Fetcher`] capability:
//! - [`DirectFetch`]: plain request with a random identity header
//! - [`ProxiedFetch`]: the same request routed through the local SOCKS circuit
//! - [`ChallengeSolverFetch`]: retrieval delegated to an external solving service
//!
//! [`FetchStrategy`] is the closed set of these variants.

use crate::config::{HttpConfig, SolverConfig};
use crate::crawler::circuit::TorCircuit;
use crate::crawler::identity::IdentityPool;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{redirect::Policy, Client, Proxy, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure classes for a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Network,
    Timeout,
    ProtocolRejected,
    ChallengeUnresolved,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("request timed out for {url}")]
    Timeout { url: String },

    #[error("{url} rejected the request with HTTP {status}")]
    ProtocolRejected { url: String, status: u16 },

    #[error("challenge unresolved for {url}: {message}")]
    ChallengeUnresolved { url: String, message: String },

    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Network { .. } => FetchErrorKind::Network,
            Self::Timeout { .. } => FetchErrorKind::Timeout,
            Self::ProtocolRejected { .. } => FetchErrorKind::ProtocolRejected,
            Self::ChallengeUnresolved { .. } => FetchErrorKind::ChallengeUnresolved,
            Self::Exhausted { .. } => FetchErrorKind::Exhausted,
        }
    }

    /// Returns true for failures that a new network identity may cure
    pub fn wants_rotation(&self) -> bool {
        matches!(
            self,
            Self::ProtocolRejected { status: 403, .. } | Self::ChallengeUnresolved { .. }
        )
    }

    /// Maps a transport error onto the fetch taxonomy
    pub fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }
}

/// Raw document retrieved by a strategy
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Name of the strategy that produced the document
    pub transport: &'static str,
}

impl FetchedDocument {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Capability shared by every transport path
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError>;
}

/// Builds an HTTP client for reconnaissance
///
/// Certificate validation follows `accept-invalid-certs`; redirects are
/// followed up to `max-redirects`. A proxy URL routes every request through
/// it and disables connection reuse so each request can see a fresh circuit.
pub fn build_http_client(config: &HttpConfig, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let timeout = config.timeout();
    let mut builder = Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(config.max_redirects))
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .gzip(true)
        .brotli(true);

    if let Some(proxy_url) = proxy {
        builder = builder
            .proxy(Proxy::all(proxy_url)?)
            .pool_max_idle_per_host(0);
    }

    builder.build()
}

/// Sends a GET with a random identity and reads the response
async fn get_with_identity(
    client: &Client,
    identities: &IdentityPool,
    url: &str,
    transport: &'static str,
) -> Result<FetchedDocument, FetchError> {
    let response = client
        .get(url)
        .header(USER_AGENT, identities.choose())
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))?;

    read_response(url, response, transport).await
}

async fn read_response(
    url: &str,
    response: Response,
    transport: &'static str,
) -> Result<FetchedDocument, FetchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::ProtocolRejected {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))?;

    Ok(FetchedDocument {
        url: final_url,
        status: status.as_u16(),
        content_type,
        body: body.to_vec(),
        transport,
    })
}

/// Plain request with a random identity header
pub struct DirectFetch {
    client: Client,
    identities: Arc<IdentityPool>,
}

impl DirectFetch {
    pub fn new(config: &HttpConfig, identities: Arc<IdentityPool>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config, None)?,
            identities,
        })
    }
}

#[async_trait]
impl Fetcher for DirectFetch {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        get_with_identity(&self.client, &self.identities, url, self.name()).await
    }
}

/// Request routed through the SOCKS circuit
pub struct ProxiedFetch {
    client: Client,
    identities: Arc<IdentityPool>,
    circuit: Arc<TorCircuit>,
}

impl ProxiedFetch {
    pub fn new(
        config: &HttpConfig,
        identities: Arc<IdentityPool>,
        circuit: Arc<TorCircuit>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config, Some(&circuit.socks_url()))?,
            identities,
            circuit,
        })
    }
}

#[async_trait]
impl Fetcher for ProxiedFetch {
    fn name(&self) -> &'static str {
        "proxied"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        if !self.circuit.is_reachable().await {
            return Err(FetchError::Network {
                url: url.to_string(),
                message: format!("SOCKS endpoint {} is unreachable", self.circuit.socks_url()),
            });
        }
        get_with_identity(&self.client, &self.identities, url, self.name()).await
    }
}

#[derive(Debug, Serialize)]
struct SolverRequest<'a> {
    cmd: &'static str,
    url: &'a str,
    #[serde(rename = "maxTimeout")]
    max_timeout: u64,
    headers: HashMap<&'static str, &'a str>,
}

#[derive(Debug, Deserialize)]
struct SolverResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    solution: Option<SolverSolution>,
}

#[derive(Debug, Deserialize)]
struct SolverSolution {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    response: Option<String>,
}

/// Retrieval delegated to an external challenge-solving service
pub struct ChallengeSolverFetch {
    client: Client,
    config: SolverConfig,
    identities: Arc<IdentityPool>,
}

impl ChallengeSolverFetch {
    pub fn new(config: SolverConfig, identities: Arc<IdentityPool>) -> Result<Self, reqwest::Error> {
        // The service gets its own budget plus headroom for the round trip
        let client = Client::builder()
            .timeout(Duration::from_millis(config.max_timeout_ms) + Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            config,
            identities,
        })
    }
}

#[async_trait]
impl Fetcher for ChallengeSolverFetch {
    fn name(&self) -> &'static str {
        "challenge_solver"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        let request = SolverRequest {
            cmd: "request.get",
            url,
            max_timeout: self.config.max_timeout_ms,
            headers: HashMap::from([("User-Agent", self.identities.choose())]),
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let unresolved = |message: String| FetchError::ChallengeUnresolved {
            url: url.to_string(),
            message,
        };

        let reply: SolverResponse = response
            .json()
            .await
            .map_err(|e| unresolved(format!("malformed solver response: {}", e)))?;

        if reply.status != "ok" {
            return Err(unresolved(
                reply
                    .message
                    .unwrap_or_else(|| format!("solver status '{}'", reply.status)),
            ));
        }

        let solution = reply
            .solution
            .ok_or_else(|| unresolved("solver returned no solution".to_string()))?;
        let html = solution
            .response
            .ok_or_else(|| unresolved("solver solution carries no document".to_string()))?;

        Ok(FetchedDocument {
            url: solution.url.unwrap_or_else(|| url.to_string()),
            status: solution.status.unwrap_or(200),
            content_type: Some("text/html".to_string()),
            body: html.into_bytes(),
            transport: self.name(),
        })
    }
}

/// Closed set of transport paths
pub enum FetchStrategy {
    Direct(DirectFetch),
    Proxied(ProxiedFetch),
    ChallengeSolver(ChallengeSolverFetch),
}

#[async_trait]
impl Fetcher for FetchStrategy {
    fn name(&self) -> &'static str {
        match self {
            Self::Direct(inner) => inner.name(),
            Self::Proxied(inner) => inner.name(),
            Self::ChallengeSolver(inner) => inner.name(),
        }
    }

    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        match self {
            Self::Direct(inner) => inner.fetch(url).await,
            Self::Proxied(inner) => inner.fetch(url).await,
            Self::ChallengeSolver(inner) => inner.fetch(url).await,
        }
    }
}
