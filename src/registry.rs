//! Service registry
//!
//! Synchronized map from service name to its `Checker`, shared by the
//! monitor (which fills it at startup) and the status API (which reads
//! snapshots of it).

use crate::error::{Error, Result};
use crate::sickbay::checker::Checker;
use crate::sickbay::status::HealthStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Point-in-time status of one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub status: HealthStatus,
    pub level: u8,
    /// Unix time (seconds) of the last recorded check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<u64>,
}

/// Shared registry of checkers keyed by service name
#[derive(Clone, Default)]
pub struct Registry {
    checkers: Arc<RwLock<HashMap<String, Arc<Checker>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a checker; names must be unique
    pub fn insert(&self, checker: Arc<Checker>) -> Result<()> {
        let mut checkers = self.checkers.write().unwrap_or_else(PoisonError::into_inner);
        if checkers.contains_key(checker.name()) {
            return Err(Error::DuplicateService(checker.name().to_string()));
        }
        checkers.insert(checker.name().to_string(), checker);
        Ok(())
    }

    /// Copy every service's status, sorted by name
    ///
    /// The map lock is held only while copying; each checker's own lock is
    /// taken just long enough to read its status.
    pub fn snapshot(&self) -> Vec<ServiceStatus> {
        let mut entries: Vec<ServiceStatus> = {
            let checkers = self.checkers.read().unwrap_or_else(PoisonError::into_inner);
            checkers
                .values()
                .map(|c| {
                    let (status, last_checked_at) = c.observed();
                    ServiceStatus {
                        name: c.name().to_string(),
                        status,
                        level: status.level(),
                        last_checked_at: last_checked_at.and_then(unix_seconds),
                    }
                })
                .collect()
        };
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

fn unix_seconds(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

#[cfg(test)]
impl Registry {
    /// Look up a checker by name
    pub fn get(&self, name: &str) -> Option<Arc<Checker>> {
        let checkers = self.checkers.read().unwrap_or_else(PoisonError::into_inner);
        checkers.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.checkers.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
