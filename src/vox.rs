//! Alert delivery
//!
//! The monitor hands a plain text message to an `AlertDispatcher`.
//! `WebhookDispatcher` posts it to chat bot webhooks (Lark/Feishu text
//! message format); `LogDispatcher` only logs it and is used when no
//! webhook is configured.

use crate::error::{Error, Result};
use crate::warden::BoxFuture;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use ureq::Agent;

/// Alert channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    /// Deployment identity prefixed to every message (e.g. "prod")
    pub identity: Option<String>,

    /// Webhook URLs receiving every alert
    #[serde(default)]
    pub webhooks: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    10
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            identity: None,
            webhooks: Vec::new(),
            timeout: default_timeout(),
        }
    }
}

/// Something that can deliver an alert message to operators
pub trait AlertDispatcher: Send + Sync {
    /// Deliver `message`; best effort, no retries
    fn send_message<'a>(&'a self, message: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Build the dispatcher described by `config`
pub fn from_config(config: &AlertConfig) -> Arc<dyn AlertDispatcher> {
    if config.webhooks.is_empty() {
        Arc::new(LogDispatcher)
    } else {
        Arc::new(WebhookDispatcher::new(config))
    }
}

/// Reply body of a bot webhook
///
/// Lark answers HTTP 200 even when it drops a message; a non-zero `code`
/// carries the real outcome.
#[derive(Debug, Deserialize)]
struct WebhookReply {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

/// Check a webhook reply body; an empty or non-JSON body counts as delivered
fn check_reply(body: &str) -> std::result::Result<(), String> {
    if body.trim().is_empty() {
        return Ok(());
    }
    match serde_json::from_str::<WebhookReply>(body) {
        Ok(reply) if reply.code != 0 => Err(format!("code {}: {}", reply.code, reply.msg)),
        Ok(_) => Ok(()),
        Err(e) => {
            debug!(error = %e, "webhook reply is not JSON, assuming delivered");
            Ok(())
        }
    }
}

/// Dispatcher that only writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl AlertDispatcher for LogDispatcher {
    fn send_message<'a>(&'a self, message: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            warn!(alert = %message, "alert raised (no webhook configured)");
            Ok(())
        })
    }
}

/// Posts alerts to one or more chat bot webhooks
#[derive(Clone)]
pub struct WebhookDispatcher {
    agent: Agent,
    webhooks: Vec<String>,
    identity: Option<String>,
}

impl WebhookDispatcher {
    pub fn new(config: &AlertConfig) -> Self {
        let agent_config = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout)))
            .build();
        Self {
            agent: Agent::new_with_config(agent_config),
            webhooks: config.webhooks.clone(),
            identity: config.identity.clone().filter(|s| !s.is_empty()),
        }
    }

    /// Message text with the identity prefix applied
    pub fn format_message(&self, message: &str) -> String {
        match &self.identity {
            Some(identity) => format!("[{}] {}", identity, message),
            None => message.to_string(),
        }
    }

    /// JSON body for a text message
    pub fn payload(&self, message: &str) -> serde_json::Value {
        serde_json::json!({
            "msg_type": "text",
            "content": { "text": self.format_message(message) }
        })
    }

    /// Post to every webhook on the calling thread
    ///
    /// Every endpoint is attempted; failures are collected into one error.
    pub fn send_blocking(&self, message: &str) -> Result<()> {
        let body = self.payload(message).to_string();
        let mut failures = Vec::new();

        for url in &self.webhooks {
            let sent = self
                .agent
                .post(url)
                .header("Content-Type", "application/json")
                .send(body.as_str());
            let delivered = sent
                .map_err(|e| e.to_string())
                .and_then(|mut resp| {
                    let reply = resp.body_mut().read_to_string().map_err(|e| e.to_string())?;
                    check_reply(&reply)
                });
            match delivered {
                Ok(()) => debug!(webhook = %url, "alert delivered"),
                Err(e) => failures.push(format!("{}: {}", url, e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Alert(failures.join("; ")))
        }
    }
}

impl AlertDispatcher for WebhookDispatcher {
    fn send_message<'a>(&'a self, message: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let dispatcher = self.clone();
            let text = message.to_string();
            tokio::task::spawn_blocking(move || dispatcher.send_blocking(&text))
                .await
                .map_err(|e| Error::Alert(e.to_string()))?
        })
    }
}
