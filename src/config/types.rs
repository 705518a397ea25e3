use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Kage-Recon
///
/// Every section is optional; missing sections take their documented defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub retry: RetryConfig,
    pub proxy: ProxyConfig,
    pub solver: SolverConfig,
    pub crawl: CrawlConfig,
    pub harvest: HarvestConfig,
    pub tasks: TaskConfig,
    pub output: OutputConfig,
}

/// Direct HTTP transport configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Total request timeout for page fetches (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Timeout for the protection probe (seconds)
    #[serde(rename = "probe-timeout-secs")]
    pub probe_timeout_secs: u64,

    /// Maximum redirects followed per request
    #[serde(rename = "max-redirects")]
    pub max_redirects: usize,

    /// Skip certificate validation so misconfigured hosts stay reachable
    #[serde(rename = "accept-invalid-certs")]
    pub accept_invalid_certs: bool,

    /// Path to a user-agent pool file, one identity per line
    #[serde(rename = "identity-pool")]
    pub identity_pool: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            probe_timeout_secs: 10,
            max_redirects: 10,
            accept_invalid_certs: true,
            identity_pool: None,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Retry and identity rotation parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Rotate identity on every Nth attempt once rotation is needed
    #[serde(rename = "rotation-interval")]
    pub rotation_interval: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay_ms: 5000,
            rotation_interval: 3,
        }
    }
}

/// Local anonymizing circuit (SOCKS endpoint plus control port)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub enabled: bool,

    pub host: String,

    #[serde(rename = "socks-port")]
    pub socks_port: u16,

    #[serde(rename = "control-port")]
    pub control_port: u16,

    #[serde(rename = "control-password")]
    pub control_password: Option<String>,

    /// Endpoint reporting the externally observed address
    #[serde(rename = "ip-echo-url")]
    pub ip_echo_url: String,

    /// Wait after signalling a new identity before it is usable (milliseconds)
    #[serde(rename = "settle-delay-ms")]
    pub settle_delay_ms: u64,

    #[serde(rename = "rotation-attempts")]
    pub rotation_attempts: u32,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            socks_port: 9050,
            control_port: 9051,
            control_password: None,
            ip_echo_url: "https://api.ipify.org?format=json".to_string(),
            settle_delay_ms: 5000,
            rotation_attempts: 3,
        }
    }
}

/// External challenge-solving service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub endpoint: String,

    #[serde(rename = "max-timeout-ms")]
    pub max_timeout_ms: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8191/v1".to_string(),
            max_timeout_ms: 60_000,
        }
    }
}

/// Crawl orchestration options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Retrieve external script bodies after classification
    #[serde(rename = "fetch-scripts")]
    pub fetch_scripts: bool,

    /// Principal recorded as the owner of registered targets
    pub owner: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            fetch_scripts: false,
            owner: "cli".to_string(),
        }
    }
}

/// Parameter harvest options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    pub concurrency: u32,

    /// Comma-separated file extensions excluded from candidate corpora
    pub exclude: String,

    #[serde(rename = "wayback-endpoint")]
    pub wayback_endpoint: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            concurrency: 50,
            exclude: String::new(),
            wayback_endpoint: "https://web.archive.org/cdx/search/cdx".to_string(),
        }
    }
}

/// Background task pool
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    #[serde(rename = "max-concurrent-runs")]
    pub max_concurrent_runs: usize,

    #[serde(rename = "await-timeout-secs")]
    pub await_timeout_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 4,
            await_timeout_secs: 300,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Optional path for the markdown crawl summary
    #[serde(rename = "summary-path")]
    pub summary_path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./kage-recon.db".to_string(),
            summary_path: None,
        }
    }
}
