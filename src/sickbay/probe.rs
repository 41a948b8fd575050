//! Service probes
//!
//! A probe is a single HEAD request against a service URL. Only an exact
//! `200 OK` counts as success; transport errors, timeouts and any other
//! status are failures and are logged, never raised.
//!
//! Two probing policies exist:
//! - `Leveled`: one probe per tick, fed into the graded status
//! - `BoundedRetry`: up to `max_retries` probes per tick with exponential
//!   backoff (1s, 2s, 4s, ...) after each failed attempt

use crate::warden::{BoxFuture, Shutdown};
use chrono_machines::{BackoffStrategy, ExponentialBackoff};
use rand::rng;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use ureq::Agent;

/// Default network timeout for a single probe (seconds)
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Probing policy for a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    /// One probe per tick, graded status moves one level per outcome
    #[default]
    Leveled,
    /// Retry within a tick with exponential backoff; binary outcome
    BoundedRetry,
}

impl std::fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeMode::Leveled => write!(f, "leveled"),
            ProbeMode::BoundedRetry => write!(f, "bounded_retry"),
        }
    }
}

/// Something that can check whether a service is up
pub trait Prober: Send + Sync {
    /// Probe `url` once; `true` means healthy
    fn check<'a>(&'a self, url: &'a str) -> BoxFuture<'a, bool>;
}

/// HEAD-request prober backed by a shared ureq agent
#[derive(Clone)]
pub struct HttpProber {
    agent: Agent,
}

impl HttpProber {
    /// Create a prober with the given per-request timeout
    pub fn new(timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: Agent::new_with_config(config),
        }
    }

    /// Probe `url` on the calling thread
    pub fn check_blocking(&self, url: &str) -> bool {
        match self.agent.head(url).call() {
            Ok(resp) if resp.status() == 200 => true,
            Ok(resp) => {
                warn!(%url, status = resp.status().as_u16(), "probe returned non-success status");
                false
            }
            Err(e) => {
                warn!(%url, error = %e, "probe request failed");
                false
            }
        }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS))
    }
}

impl Prober for HttpProber {
    fn check<'a>(&'a self, url: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let prober = self.clone();
            let target = url.to_string();
            match tokio::task::spawn_blocking(move || prober.check_blocking(&target)).await {
                Ok(ok) => ok,
                Err(e) => {
                    warn!(%url, error = %e, "probe task aborted");
                    false
                }
            }
        })
    }
}

/// Outcome of a bounded-retry tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// A probe succeeded within the budget
    Succeeded { attempts: u32 },
    /// Every attempt failed
    Exhausted { attempts: u32 },
    /// Shutdown interrupted a backoff wait
    Cancelled { attempts: u32 },
}

/// Delay before the first retry (milliseconds); doubles after every failure
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Longest single backoff wait (milliseconds)
const RETRY_MAX_DELAY_MS: u64 = 1000 << 16;

/// Backoff schedule for a tick of `budget` attempts
///
/// A wait follows every failed attempt, including the last one, so the
/// strategy allows one delay more than the attempt budget.
pub fn retry_backoff(budget: u8) -> ExponentialBackoff {
    ExponentialBackoff::new()
        .base_delay_ms(RETRY_BASE_DELAY_MS)
        .max_delay_ms(RETRY_MAX_DELAY_MS)
        .multiplier(2.0)
        .max_attempts(budget.saturating_add(1))
        .jitter_factor(0.0)
}

/// Probe with up to `max_retries` attempts, backing off after each failure
///
/// A budget of zero still makes one attempt. The backoff sleep races
/// against `shutdown`; if shutdown wins the tick is reported as cancelled.
pub async fn probe_with_retry(
    prober: &dyn Prober,
    url: &str,
    max_retries: u32,
    shutdown: &mut Shutdown,
) -> RetryOutcome {
    let budget = max_retries.clamp(1, u32::from(u8::MAX - 1)) as u8;
    let backoff = retry_backoff(budget);

    for attempt in 1..=budget {
        if prober.check(url).await {
            return RetryOutcome::Succeeded {
                attempts: u32::from(attempt),
            };
        }

        // ThreadRng is not Send; keep it out of the await below
        let delay_ms = {
            let mut rng = rng();
            backoff.delay(attempt, &mut rng)
        };
        let Some(delay_ms) = delay_ms else {
            break;
        };
        let delay = Duration::from_millis(delay_ms);
        debug!(%url, attempt, budget, ?delay, "probe failed, backing off");

        if !shutdown.sleep(delay).await {
            return RetryOutcome::Cancelled {
                attempts: u32::from(attempt),
            };
        }
    }

    RetryOutcome::Exhausted {
        attempts: u32::from(budget),
    }
}
