//! Configuration file parsing for Outpost
//!
//! Parses `outpost.toml` configuration files using serde

use crate::error::{Error, Result};
use crate::sickbay::probe::{ProbeMode, DEFAULT_PROBE_TIMEOUT_SECS};
use crate::sickbay::recovery::RemoteCommand;
use crate::vox::AlertConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Interval used when a service sets none, or a non-positive one (seconds)
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Load configuration from a file
pub fn load(path: &Path) -> Result<OutpostConfig> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: OutpostConfig = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct OutpostConfig {
    /// Global configuration settings
    #[serde(default)]
    pub config: GlobalConfig,

    /// Monitored services, in configuration order
    #[serde(default)]
    pub services: Vec<ServiceDef>,
}

impl OutpostConfig {
    /// Validate the configuration
    ///
    /// Missing URLs and bad intervals are not errors: the former leaves the
    /// service unscheduled, the latter falls back to the default interval.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(Error::ConfigValidation(
                    "Service with an empty name".into(),
                ));
            }
            if !names.insert(&service.name) {
                return Err(Error::ConfigValidation(format!(
                    "Duplicate service name: {}",
                    service.name
                )));
            }
        }

        for service in &self.services {
            if service.url.trim().is_empty() {
                warn!(service = %service.name, "no url configured, service will not be probed");
            }
            if matches!(service.interval, Some(secs) if secs <= 0) {
                warn!(
                    service = %service.name,
                    interval = ?service.interval,
                    default = DEFAULT_INTERVAL_SECS,
                    "non-positive interval, using default"
                );
            }
        }

        if self.config.alert.webhooks.iter().any(|w| w.trim().is_empty()) {
            return Err(Error::ConfigValidation("Empty alert webhook URL".into()));
        }

        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8000".into()
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

/// Global configuration settings
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// Status API listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Probing policy for every service
    #[serde(default)]
    pub probe_mode: ProbeMode,

    /// Network timeout for a single probe in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,

    /// Pause after a success on an already healthy service (seconds, 0 = off)
    #[serde(default)]
    pub healthy_hold: u64,

    /// Pause after a down alert (seconds, 0 = off)
    #[serde(default)]
    pub down_hold: u64,

    /// Alert channel
    #[serde(default)]
    pub alert: AlertConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            probe_mode: ProbeMode::default(),
            probe_timeout: default_probe_timeout(),
            healthy_hold: 0,
            down_hold: 0,
            alert: AlertConfig::default(),
        }
    }
}

impl GlobalConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    pub fn healthy_hold(&self) -> Duration {
        Duration::from_secs(self.healthy_hold)
    }

    pub fn down_hold(&self) -> Duration {
        Duration::from_secs(self.down_hold)
    }
}

/// A monitored service
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDef {
    /// Unique service name
    pub name: String,

    /// Probe target
    #[serde(default)]
    pub url: String,

    /// Seconds between ticks
    pub interval: Option<i64>,

    /// Probe attempts per tick in bounded-retry mode
    #[serde(default)]
    pub max_retries: u32,

    /// Remote command run when the service goes down
    pub remediation: Option<RemoteCommand>,
}

impl ServiceDef {
    /// Interval to schedule at, defaulting unset or non-positive values
    pub fn effective_interval(&self) -> Duration {
        match self.interval {
            Some(secs) if secs > 0 => Duration::from_secs(secs as u64),
            _ => Duration::from_secs(DEFAULT_INTERVAL_SECS),
        }
    }
}

#[cfg(test)]
impl OutpostConfig {
    /// Get a service definition by name
    pub fn get_service(&self, name: &str) -> Option<&ServiceDef> {
        self.services.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
impl ServiceDef {
    /// Create a service definition with defaults
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            interval: None,
            max_retries: 0,
            remediation: None,
        }
    }

    /// Set interval in seconds
    pub fn with_interval(mut self, secs: i64) -> Self {
        self.interval = Some(secs);
        self
    }

    /// Set bounded-retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[[services]]
name = "api"
url = "https://api.example.com/healthz"
"#;

        let config: OutpostConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.config.listen, "0.0.0.0:8000");
        assert_eq!(config.config.probe_mode, ProbeMode::Leveled);
        assert_eq!(config.config.probe_timeout, 10);
        assert!(config.services[0].remediation.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[config]
listen = "127.0.0.1:9000"
probe_mode = "bounded_retry"
probe_timeout = 3
healthy_hold = 10
down_hold = 5

[config.alert]
identity = "prod"
webhooks = ["https://open.larksuite.com/open-apis/bot/v2/hook/abc"]

[[services]]
name = "api"
url = "https://api.example.com/healthz"
interval = 30
max_retries = 3

[services.remediation]
host = "10.0.0.5"
user = "deploy"
port = 2222
private_key_path = "/root/.ssh/id_ed25519"
command = "systemctl restart api"

[[services]]
name = "web"
url = "https://www.example.com/"
"#;

        let config: OutpostConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.config.probe_mode, ProbeMode::BoundedRetry);
        assert_eq!(config.config.down_hold(), Duration::from_secs(5));
        assert_eq!(config.config.alert.identity.as_deref(), Some("prod"));

        let api = config.get_service("api").unwrap();
        assert_eq!(api.effective_interval(), Duration::from_secs(30));
        assert_eq!(api.max_retries, 3);
        let remediation = api.remediation.as_ref().unwrap();
        assert_eq!(remediation.port, 2222);
        assert!(remediation.is_complete());

        let web = config.get_service("web").unwrap();
        assert!(web.remediation.is_none());
    }

    #[test]
    fn test_interval_defaults() {
        assert_eq!(
            ServiceDef::new("a", "http://a").effective_interval(),
            Duration::from_secs(60)
        );
        assert_eq!(
            ServiceDef::new("a", "http://a").with_interval(0).effective_interval(),
            Duration::from_secs(60)
        );
        assert_eq!(
            ServiceDef::new("a", "http://a").with_interval(-5).effective_interval(),
            Duration::from_secs(60)
        );
        assert_eq!(
            ServiceDef::new("a", "http://a").with_interval(1).effective_interval(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_duplicate_name_error() {
        let toml = r#"
[[services]]
name = "api"
url = "http://a"

[[services]]
name = "api"
url = "http://b"
"#;

        let config: OutpostConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_url_is_not_an_error() {
        let toml = r#"
[[services]]
name = "api"
interval = 0
"#;

        let config: OutpostConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.services[0].url.is_empty());
    }

    #[test]
    fn test_empty_name_error() {
        let config = OutpostConfig {
            services: vec![ServiceDef::new(" ", "http://a")],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::ConfigValidation(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[services]]\nname = \"api\"\nurl = \"http://a\"").unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.services[0].name, "api");

        let err = load(Path::new("/nonexistent/outpost.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }
}
