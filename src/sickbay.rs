//! Service health: status grades, probing and recovery
//!
//! Provides:
//! - The six-level graded status and its one-step transitions
//! - Per-service checkers holding that status
//! - HTTP probes with an optional bounded retry policy
//! - Remote remediation commands run over SSH

pub mod checker;
pub mod probe;
pub mod recovery;
pub mod status;
