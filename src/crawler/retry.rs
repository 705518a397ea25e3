//! Bounded retry with linear backoff and identity rotation

use crate::config::RetryConfig;
use crate::crawler::circuit::IdentityRotator;
use crate::crawler::fetcher::{FetchError, FetchedDocument, Fetcher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub rotation_interval: u32,
}

impl RetryPolicy {
    /// Growth of the delay per attempt, as a fraction of the base delay
    pub const BACKOFF_STEP: f64 = 0.5;

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            rotation_interval: config.rotation_interval.max(1),
        }
    }

    /// Wait before attempt `attempt` (0-based): `base * (1 + attempt * 0.5)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.retry_delay
            .mul_f64(1.0 + f64::from(attempt) * Self::BACKOFF_STEP)
    }

    /// Returns true if a pending rotation is performed before `attempt`
    pub fn is_rotation_attempt(&self, attempt: u32) -> bool {
        attempt > 0 && attempt % self.rotation_interval == 0
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// A successful fetch and how it was obtained
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub document: FetchedDocument,
    /// Attempts made, including the successful one
    pub attempts: u32,
    pub rotations: u32,
    /// True if the escalation transport produced the document
    pub escalated: bool,
}

/// Wraps fetch strategies with retry, escalation and rotation
///
/// A 403 or an unresolved challenge marks rotation as needed and switches
/// to the escalation transport (when one is given) for the remaining
/// attempts. Every failure is followed by a timed wait; on rotation
/// attempts a new identity is requested before the next try.
pub struct RetryScheduler {
    policy: RetryPolicy,
    rotator: Option<Arc<dyn IdentityRotator>>,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy, rotator: Option<Arc<dyn IdentityRotator>>) -> Self {
        Self { policy, rotator }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn fetch(
        &self,
        primary: &dyn Fetcher,
        escalation: Option<&dyn Fetcher>,
        url: &str,
    ) -> Result<FetchOutcome, FetchError> {
        let mut active = primary;
        let mut escalated = false;
        let mut rotation_needed = false;
        let mut rotations = 0;
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..self.policy.max_attempts {
            if attempt > 0 {
                let delay = self.policy.delay_for(attempt);
                debug!(
                    "Retrying {} in {:?} (attempt {}/{}, via {})",
                    url,
                    delay,
                    attempt + 1,
                    self.policy.max_attempts,
                    active.name()
                );
                tokio::time::sleep(delay).await;

                if rotation_needed && self.policy.is_rotation_attempt(attempt) {
                    if self.rotate_identity().await {
                        rotations += 1;
                    }
                }
            }

            match active.fetch(url).await {
                Ok(document) => {
                    if attempt > 0 {
                        info!(
                            "Fetched {} via {} after {} attempts",
                            url,
                            active.name(),
                            attempt + 1
                        );
                    }
                    return Ok(FetchOutcome {
                        document,
                        attempts: attempt + 1,
                        rotations,
                        escalated,
                    });
                }
                Err(err) => {
                    warn!(
                        "Attempt {}/{} for {} via {} failed: {}",
                        attempt + 1,
                        self.policy.max_attempts,
                        url,
                        active.name(),
                        err
                    );

                    if err.wants_rotation() {
                        rotation_needed = true;
                        if let (false, Some(next)) = (escalated, escalation) {
                            info!("Escalating {} from {} to {}", url, active.name(), next.name());
                            active = next;
                            escalated = true;
                        }
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: self.policy.max_attempts,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }

    /// Rotates when a rotator is configured; failures are logged and the
    /// retry sequence continues on the current identity
    async fn rotate_identity(&self) -> bool {
        let Some(rotator) = &self.rotator else {
            return false;
        };

        match rotator.rotate().await {
            Ok(address) => {
                info!("Now presenting as {}", address);
                true
            }
            Err(e) => {
                warn!("Identity rotation failed, continuing: {}", e);
                false
            }
        }
    }
}
