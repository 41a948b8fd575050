//! Unified error types for Outpost

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Stage of a remote remediation run that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationStage {
    ReadKey,
    ParseKey,
    Dial,
    Handshake,
    Authenticate,
    OpenSession,
    Exec,
}

impl std::fmt::Display for RemediationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemediationStage::ReadKey => write!(f, "read private key"),
            RemediationStage::ParseKey => write!(f, "parse private key"),
            RemediationStage::Dial => write!(f, "dial"),
            RemediationStage::Handshake => write!(f, "ssh handshake"),
            RemediationStage::Authenticate => write!(f, "authenticate"),
            RemediationStage::OpenSession => write!(f, "open session"),
            RemediationStage::Exec => write!(f, "exec command"),
        }
    }
}

/// Main error type for Outpost operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    // Registry errors
    #[error("Service '{0}' is already registered")]
    DuplicateService(String),

    // Alert errors
    #[error("Alert delivery failed: {0}")]
    Alert(String),

    // Remediation errors
    #[error("Remediation on '{host}' failed to {stage}: {message}")]
    Remediation {
        host: String,
        stage: RemediationStage,
        message: String,
    },

    // Status API errors
    #[error("Status API error: {0}")]
    Api(String),

    #[error("HTTP request failed: {0}")]
    Http(String),
}

impl Error {
    /// Build a remediation error for the given stage
    pub fn remediation(host: &str, stage: RemediationStage, message: impl ToString) -> Self {
        Error::Remediation {
            host: host.to_string(),
            stage,
            message: message.to_string(),
        }
    }
}

/// Result type alias for Outpost operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
impl Error {
    /// Stage of a remediation failure, if this is one
    pub fn remediation_stage(&self) -> Option<RemediationStage> {
        match self {
            Error::Remediation { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
