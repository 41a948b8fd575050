//! Graded health status
//!
//! Six severity levels ordered from `Unknown` to `Down`. A recorded probe
//! outcome moves a service exactly one level along this scale, so a single
//! bad probe never reaches `Down` and a single good probe after an outage
//! never claims full recovery.

use serde::{Deserialize, Serialize};

/// Health status of a monitored service, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Not yet checked
    #[default]
    Unknown = 0,
    /// Probes passing
    Healthy = 1,
    /// First failure observed
    Degraded = 2,
    /// Failures persisting
    Unstable = 3,
    /// One step away from down
    Critical = 4,
    /// Sustained failure, alerts and remediation fire
    Down = 5,
}

impl HealthStatus {
    /// Numeric severity level (0-5)
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Next status after a failed probe
    pub fn escalate(self) -> Self {
        match self {
            HealthStatus::Unknown | HealthStatus::Healthy => HealthStatus::Degraded,
            HealthStatus::Degraded => HealthStatus::Unstable,
            HealthStatus::Unstable => HealthStatus::Critical,
            HealthStatus::Critical | HealthStatus::Down => HealthStatus::Down,
        }
    }

    /// Next status after a successful probe
    pub fn recover(self) -> Self {
        match self {
            HealthStatus::Down => HealthStatus::Critical,
            HealthStatus::Critical => HealthStatus::Unstable,
            HealthStatus::Unstable => HealthStatus::Degraded,
            HealthStatus::Degraded | HealthStatus::Unknown | HealthStatus::Healthy => {
                HealthStatus::Healthy
            }
        }
    }

    /// Whether this is the terminal failure level
    pub fn is_down(self) -> bool {
        self == HealthStatus::Down
    }

    /// Label padded to `width` columns, then colored for terminal tables
    ///
    /// Padding happens before the escape codes are added so columns line up.
    pub fn colored(self, width: usize) -> String {
        let label = format!("{:<width$}", self.to_string(), width = width);
        let code = match self {
            HealthStatus::Unknown => return label,
            HealthStatus::Healthy => "32",
            HealthStatus::Degraded | HealthStatus::Unstable => "33",
            HealthStatus::Critical => "31",
            HealthStatus::Down => "1;31",
        };
        format!("\x1b[{}m{}\x1b[0m", code, label)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Unknown => write!(f, "unknown"),
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unstable => write!(f, "unstable"),
            HealthStatus::Critical => write!(f, "critical"),
            HealthStatus::Down => write!(f, "down"),
        }
    }
}

#[cfg(test)]
impl HealthStatus {
    /// All statuses in severity order
    pub const ALL: [HealthStatus; 6] = [
        HealthStatus::Unknown,
        HealthStatus::Healthy,
        HealthStatus::Degraded,
        HealthStatus::Unstable,
        HealthStatus::Critical,
        HealthStatus::Down,
    ];

    /// Status for a severity level, if in range
    pub fn from_level(level: u8) -> Option<Self> {
        Self::ALL.get(level as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        for pair in HealthStatus::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[1].level(), pair[0].level() + 1);
        }
    }

    #[test]
    fn test_escalate_never_skips_a_level() {
        for status in HealthStatus::ALL {
            let next = status.escalate();
            assert!(next.level() <= status.level().max(1) + 1);
            assert!(next >= status);
        }
        assert_eq!(HealthStatus::Unknown.escalate(), HealthStatus::Degraded);
        assert_eq!(HealthStatus::Down.escalate(), HealthStatus::Down);
    }

    #[test]
    fn test_recover_mirrors_escalate() {
        assert_eq!(HealthStatus::Down.recover(), HealthStatus::Critical);
        assert_eq!(HealthStatus::Critical.recover(), HealthStatus::Unstable);
        assert_eq!(HealthStatus::Unstable.recover(), HealthStatus::Degraded);
        assert_eq!(HealthStatus::Degraded.recover(), HealthStatus::Healthy);
        assert_eq!(HealthStatus::Unknown.recover(), HealthStatus::Healthy);
        assert_eq!(HealthStatus::Healthy.recover(), HealthStatus::Healthy);
    }

    #[test]
    fn test_display_and_serde() {
        assert_eq!(HealthStatus::Unstable.to_string(), "unstable");
        assert_eq!(
            serde_json::to_string(&HealthStatus::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(HealthStatus::from_level(5), Some(HealthStatus::Down));
        assert_eq!(HealthStatus::from_level(6), None);
    }

    #[test]
    fn test_colored_pads_inside_escape_codes() {
        assert_eq!(HealthStatus::Down.colored(12), "\x1b[1;31mdown        \x1b[0m");
        assert_eq!(HealthStatus::Unknown.colored(12), "unknown     ");

        let strip = |s: String| s.replace("\x1b[32m", "").replace("\x1b[0m", "");
        assert_eq!(strip(HealthStatus::Healthy.colored(12)).len(), 12);
    }
}
