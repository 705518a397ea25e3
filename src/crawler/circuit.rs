//! Local anonymizing circuit: SOCKS endpoint plus control channel
//!
//! The control contract is "authenticate, then signal a new identity".
//! A new identity only counts once the externally observed address differs
//! from the one seen before the signal.

use crate::config::ProxyConfig;
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const ECHO_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors raised while talking to the circuit
#[derive(Debug, Error)]
pub enum CircuitError {
    #[error("endpoint {endpoint} is unreachable")]
    Unreachable { endpoint: String },

    #[error("control channel rejected command: {0}")]
    Control(String),

    #[error("control channel IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("address lookup failed: {0}")]
    Lookup(String),

    #[error("identity unchanged after {attempts} rotation attempts")]
    IdentityUnchanged { attempts: u32 },
}

/// Obtains a new apparent network origin
#[async_trait]
pub trait IdentityRotator: Send + Sync {
    /// Rotates and returns the newly observed address
    async fn rotate(&self) -> Result<String, CircuitError>;
}

#[derive(Debug, Deserialize)]
struct EchoResponse {
    ip: String,
}

/// Handle on a local SOCKS circuit and its control port
#[derive(Debug, Clone)]
pub struct TorCircuit {
    config: ProxyConfig,
}

impl TorCircuit {
    pub fn new(config: ProxyConfig) -> Self {
        Self { config }
    }

    /// Proxy URL with remote DNS resolution
    pub fn socks_url(&self) -> String {
        format!("socks5h://{}:{}", self.config.host, self.config.socks_port)
    }

    /// Returns true if the SOCKS endpoint accepts TCP connections
    pub async fn is_reachable(&self) -> bool {
        let addr = (self.config.host.as_str(), self.config.socks_port);
        matches!(
            tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }

    /// Asks the control port for a new circuit
    pub async fn request_new_identity(&self) -> Result<(), CircuitError> {
        let endpoint = format!("{}:{}", self.config.host, self.config.control_port);
        let stream = match tokio::time::timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((self.config.host.as_str(), self.config.control_port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            _ => return Err(CircuitError::Unreachable { endpoint }),
        };

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let authenticate = match &self.config.control_password {
            Some(password) => format!("AUTHENTICATE \"{}\"\r\n", escape_password(password)),
            None => "AUTHENTICATE\r\n".to_string(),
        };
        send_command(&mut writer, &mut reader, &authenticate).await?;
        send_command(&mut writer, &mut reader, "SIGNAL NEWNYM\r\n").await?;

        // The circuit is already rotating; a failed QUIT changes nothing
        let _ = writer.write_all(b"QUIT\r\n").await;

        debug!("New identity signalled on {}", endpoint);
        Ok(())
    }

    /// Looks up the address the outside world sees through the circuit
    pub async fn current_address(&self) -> Result<String, CircuitError> {
        let proxy = Proxy::all(self.socks_url()).map_err(|e| CircuitError::Lookup(e.to_string()))?;
        let client = Client::builder()
            .proxy(proxy)
            .timeout(ECHO_TIMEOUT)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| CircuitError::Lookup(e.to_string()))?;

        let body = client
            .get(&self.config.ip_echo_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| CircuitError::Lookup(e.to_string()))?
            .text()
            .await
            .map_err(|e| CircuitError::Lookup(e.to_string()))?;

        parse_echo(&body).ok_or_else(|| CircuitError::Lookup("empty address response".to_string()))
    }
}

/// The two circuit operations rotation is built from
#[async_trait]
trait CircuitControl: Send + Sync {
    async fn signal_new_identity(&self) -> Result<(), CircuitError>;

    async fn observed_address(&self) -> Result<String, CircuitError>;
}

#[async_trait]
impl CircuitControl for TorCircuit {
    async fn signal_new_identity(&self) -> Result<(), CircuitError> {
        self.request_new_identity().await
    }

    async fn observed_address(&self) -> Result<String, CircuitError> {
        self.current_address().await
    }
}

#[async_trait]
impl IdentityRotator for TorCircuit {
    async fn rotate(&self) -> Result<String, CircuitError> {
        let settle = Duration::from_millis(self.config.settle_delay_ms);
        rotate_verified(self, self.config.rotation_attempts.max(1), settle).await
    }
}

/// Signals new identities until the observed address moves away from the
/// baseline
///
/// Without a baseline address there is nothing to compare against, so a
/// failed first lookup is an error rather than a rotation.
async fn rotate_verified(
    control: &dyn CircuitControl,
    attempts: u32,
    settle: Duration,
) -> Result<String, CircuitError> {
    let before = control.observed_address().await.map_err(|e| {
        warn!("Cannot read the address before rotating: {}", e);
        e
    })?;

    for attempt in 1..=attempts {
        if let Err(e) = control.signal_new_identity().await {
            warn!("Identity rotation attempt {}/{} failed: {}", attempt, attempts, e);
            continue;
        }

        tokio::time::sleep(settle).await;

        match control.observed_address().await {
            Ok(after) if after != before => {
                info!("Identity rotated: {} -> {}", before, after);
                return Ok(after);
            }
            Ok(after) => {
                warn!(
                    "Identity rotation attempt {}/{}: address still {}",
                    attempt, attempts, after
                );
            }
            Err(e) => {
                warn!(
                    "Identity rotation attempt {}/{}: address lookup failed: {}",
                    attempt, attempts, e
                );
            }
        }
    }

    Err(CircuitError::IdentityUnchanged { attempts })
}

async fn send_command<W, R>(writer: &mut W, reader: &mut R, command: &str) -> Result<(), CircuitError>
where
    W: AsyncWriteExt + Unpin,
    R: AsyncBufReadExt + Unpin,
{
    writer.write_all(command.as_bytes()).await?;
    writer.flush().await?;

    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(CircuitError::Control("connection closed".to_string()));
    }

    if line.starts_with("250") {
        Ok(())
    } else {
        Err(CircuitError::Control(line.trim().to_string()))
    }
}

fn escape_password(password: &str) -> String {
    password.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Accepts `{"ip": "..."}` or a bare address
fn parse_echo(body: &str) -> Option<String> {
    let address = match serde_json::from_str::<EchoResponse>(body) {
        Ok(echo) => echo.ip,
        Err(_) => body.trim().to_string(),
    };
    (!address.is_empty()).then_some(address)
}
