//! Per-service health checker
//!
//! A `Checker` carries a service's probe target and its graded status.
//! Status and last-check time live behind a per-checker `RwLock`, so
//! recording an outcome for one service never contends with another.

use crate::manifest::ServiceDef;
use crate::sickbay::recovery::RemoteCommand;
use crate::sickbay::status::HealthStatus;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime};

/// Mutable part of a checker
#[derive(Debug, Clone, Copy, Default)]
struct CheckState {
    status: HealthStatus,
    last_checked_at: Option<SystemTime>,
}

/// Health checker for a single service
#[derive(Debug)]
pub struct Checker {
    /// Service name (unique registry key)
    name: String,
    /// Probe target
    url: String,
    /// Interval between scheduled ticks
    interval: Duration,
    /// Probe attempts per tick in bounded-retry mode
    max_retries: u32,
    /// Remote command run when the service is down
    remediation: Option<RemoteCommand>,
    /// Graded status and last check time
    state: RwLock<CheckState>,
}

impl Checker {
    /// Build a checker from its configuration entry
    pub fn from_def(def: &ServiceDef) -> Self {
        Self {
            name: def.name.clone(),
            url: def.url.clone(),
            interval: def.effective_interval(),
            max_retries: def.max_retries,
            remediation: def.remediation.clone(),
            state: RwLock::new(CheckState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn remediation(&self) -> Option<&RemoteCommand> {
        self.remediation.as_ref()
    }

    /// Whether this checker has a target and can be scheduled
    pub fn is_schedulable(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Current health status
    pub fn status(&self) -> HealthStatus {
        self.read_state().status
    }

    /// Status and last check time, read together
    pub fn observed(&self) -> (HealthStatus, Option<SystemTime>) {
        let state = self.read_state();
        (state.status, state.last_checked_at)
    }

    /// Record a failed probe: escalate one level, saturating at `Down`
    pub fn record_failure(&self) -> HealthStatus {
        self.write_state(|state| {
            state.status = state.status.escalate();
            state.last_checked_at = Some(SystemTime::now());
            state.status
        })
    }

    /// Record a successful probe: recover one level, saturating at `Healthy`
    pub fn record_success(&self) -> HealthStatus {
        self.write_state(|state| {
            state.status = state.status.recover();
            state.last_checked_at = Some(SystemTime::now());
            state.status
        })
    }

    /// Stamp the check time without moving the status
    pub fn touch(&self) {
        self.write_state(|state| state.last_checked_at = Some(SystemTime::now()));
    }

    fn read_state(&self) -> CheckState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state<T>(&self, f: impl FnOnce(&mut CheckState) -> T) -> T {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

#[cfg(test)]
impl Checker {
    /// Create a checker with default interval and no remediation
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            interval: Duration::from_secs(crate::manifest::DEFAULT_INTERVAL_SECS),
            max_retries: 0,
            remediation: None,
            state: RwLock::new(CheckState::default()),
        }
    }

    /// Set bounded-retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Attach a remediation command
    pub fn with_remediation(mut self, remediation: RemoteCommand) -> Self {
        self.remediation = Some(remediation);
        self
    }

    /// Start from an explicit status instead of `Unknown`
    pub fn with_status(self, status: HealthStatus) -> Self {
        self.write_state(|state| state.status = status);
        self
    }

    /// Time of the last recorded outcome
    pub fn last_checked_at(&self) -> Option<SystemTime> {
        self.read_state().last_checked_at
    }
}
