//! Webhook agent transport.
//!
//! The arena POSTs the current page state to an agent-controlled URL once per
//! turn and reads back the actions to take. Every request is signed so the
//! agent can verify it came from the arena:
//!
//! - `X-AI-Olympics-Signature`: `sha256=<hex HMAC-SHA256 of the raw body>`
//! - `X-AI-Olympics-Timestamp`: unix time in milliseconds, checked by the agent
//!   against a five minute replay window
//! - `X-AI-Olympics-Agent-Id`: the agent being driven
//!
//! Transport problems never surface as errors: a refused connection, a timeout,
//! a non-2xx status, or an unreadable body all end the run with a failed result.

use crate::executor::{AgentExecutor, TurnResponse};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use olympics_core::{AgentConfig, OlympicsError, OlympicsResult, PageState, ToolCall};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-AI-Olympics-Signature";
pub const TIMESTAMP_HEADER: &str = "X-AI-Olympics-Timestamp";
pub const AGENT_ID_HEADER: &str = "X-AI-Olympics-Agent-Id";

/// Maximum accepted distance between a request timestamp and the receiver's clock.
pub const MAX_TIMESTAMP_DRIFT_MS: i64 = 5 * 60 * 1000;

/// Configuration shared by all webhook executors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How many previous actions are echoed back to the agent (default: 20).
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_history() -> usize {
    20
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_history: default_max_history(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Prompts sent with every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookTask {
    pub system_prompt: String,
    pub task_prompt: String,
}

/// Body POSTed to the agent each turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookTurnRequest {
    pub agent_id: String,
    pub task: WebhookTask,
    pub page_state: PageState,
    pub turn_number: u32,
    pub previous_actions: Vec<ToolCall>,
}

/// Body the agent answers with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookTurnReply {
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub actions: Vec<ToolCall>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Sign a request body, producing the value of the signature header.
pub fn sign_payload(secret: &str, body: &[u8]) -> OlympicsResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| OlympicsError::Config(format!("invalid webhook secret: {e}")))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Check a signature header against the body, in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Whether a request timestamp falls inside the replay window around `now_ms`.
pub fn check_replay(timestamp_ms: i64, now_ms: i64) -> bool {
    (now_ms - timestamp_ms).abs() <= MAX_TIMESTAMP_DRIFT_MS
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Drives an agent that lives behind an HTTP endpoint.
pub struct WebhookExecutor {
    agent_id: String,
    url: String,
    secret: String,
    http: reqwest::Client,
    timeout: Duration,
    max_history: usize,
    task: WebhookTask,
    turn_number: u32,
    previous_actions: Vec<ToolCall>,
}

impl WebhookExecutor {
    pub fn new(
        agent_id: impl Into<String>,
        url: impl Into<String>,
        secret: impl Into<String>,
        http: reqwest::Client,
        config: &WebhookConfig,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            url: url.into(),
            secret: secret.into(),
            http,
            timeout: Duration::from_secs(config.timeout_secs),
            max_history: config.max_history,
            task: WebhookTask {
                system_prompt: String::new(),
                task_prompt: String::new(),
            },
            turn_number: 0,
            previous_actions: Vec::new(),
        }
    }

    /// Build from an agent config, which must carry a webhook url and secret.
    pub fn from_agent(
        agent: &AgentConfig,
        http: reqwest::Client,
        config: &WebhookConfig,
    ) -> OlympicsResult<Self> {
        let url = agent.webhook_url.as_deref().ok_or_else(|| {
            OlympicsError::Config(format!("webhook agent {} has no webhook_url", agent.id))
        })?;
        let secret = agent.webhook_secret.as_deref().ok_or_else(|| {
            OlympicsError::Config(format!("webhook agent {} has no webhook_secret", agent.id))
        })?;
        Ok(Self::new(&agent.id, url, secret, http, config))
    }

    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    fn remember(&mut self, actions: &[ToolCall]) {
        self.previous_actions.extend_from_slice(actions);
        if self.previous_actions.len() > self.max_history {
            let excess = self.previous_actions.len() - self.max_history;
            self.previous_actions.drain(..excess);
        }
    }

    async fn call(&self, body: Vec<u8>) -> Result<WebhookTurnReply, String> {
        let signature = sign_payload(&self.secret, &body).map_err(|e| e.to_string())?;
        let timestamp = chrono::Utc::now().timestamp_millis();

        let resp = self
            .http
            .post(&self.url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(TIMESTAMP_HEADER, timestamp.to_string())
            .header(AGENT_ID_HEADER, &self.agent_id)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("webhook timed out after {}s", self.timeout.as_secs())
                } else {
                    format!("webhook request failed: {e}")
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(format!("webhook returned HTTP {}", status.as_u16()));
        }

        resp.json::<WebhookTurnReply>()
            .await
            .map_err(|e| format!("webhook returned an invalid body: {e}"))
    }
}

#[async_trait]
impl AgentExecutor for WebhookExecutor {
    async fn initialize(&mut self, system_prompt: &str, task_prompt: &str) -> OlympicsResult<()> {
        self.task = WebhookTask {
            system_prompt: system_prompt.to_string(),
            task_prompt: task_prompt.to_string(),
        };
        self.turn_number = 0;
        self.previous_actions.clear();
        Ok(())
    }

    async fn process_turn(&mut self, page: &PageState) -> OlympicsResult<TurnResponse> {
        self.turn_number += 1;

        let request = WebhookTurnRequest {
            agent_id: self.agent_id.clone(),
            task: self.task.clone(),
            page_state: page.clone(),
            turn_number: self.turn_number,
            previous_actions: self.previous_actions.clone(),
        };
        let body = serde_json::to_vec(&request)?;

        match self.call(body).await {
            Ok(reply) => {
                debug!(
                    agent_id = %self.agent_id,
                    turn = self.turn_number,
                    actions = reply.actions.len(),
                    done = reply.done,
                    "Webhook turn"
                );
                self.remember(&reply.actions);
                Ok(TurnResponse {
                    thinking: reply.thinking,
                    tool_calls: reply.actions,
                    done: reply.done,
                    result: reply.result,
                    usage: None,
                })
            }
            Err(reason) => {
                warn!(agent_id = %self.agent_id, turn = self.turn_number, %reason, "Webhook turn failed");
                Ok(TurnResponse::terminal_failure(reason))
            }
        }
    }

    async fn cleanup(&mut self) -> OlympicsResult<()> {
        self.previous_actions.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let body = br#"{"turnNumber":1}"#;
        let signature = sign_payload("top-secret", body).unwrap();
        assert!(signature.starts_with("sha256="));
        assert_eq!(signature.len(), "sha256=".len() + 64);
        assert!(verify_signature("top-secret", body, &signature));
    }

    #[test]
    fn test_verify_rejects_wrong_secret_or_body() {
        let body = b"payload";
        let signature = sign_payload("secret-a", body).unwrap();
        assert!(!verify_signature("secret-b", body, &signature));
        assert!(!verify_signature("secret-a", b"tampered", &signature));
    }

    #[test]
    fn test_verify_rejects_malformed_header() {
        assert!(!verify_signature("s", b"x", "md5=abcdef"));
        assert!(!verify_signature("s", b"x", "sha256=not-hex"));
        assert!(!verify_signature("s", b"x", ""));
    }

    #[test]
    fn test_replay_window() {
        let now = 1_700_000_000_000;
        assert!(check_replay(now, now));
        assert!(check_replay(now - MAX_TIMESTAMP_DRIFT_MS, now));
        assert!(check_replay(now + 60_000, now));
        assert!(!check_replay(now - MAX_TIMESTAMP_DRIFT_MS - 1, now));
    }

    #[test]
    fn test_reply_defaults() {
        let reply: WebhookTurnReply = serde_json::from_str("{}").unwrap();
        assert!(!reply.done);
        assert!(reply.actions.is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let config = WebhookConfig {
            timeout_secs: 1,
            max_history: 2,
        };
        let mut executor =
            WebhookExecutor::new("a", "http://localhost", "s", reqwest::Client::new(), &config);
        executor.remember(&[
            ToolCall::new("click", serde_json::json!({"element": "A"})),
            ToolCall::new("click", serde_json::json!({"element": "B"})),
            ToolCall::new("scroll", serde_json::json!({})),
        ]);
        assert_eq!(executor.previous_actions.len(), 2);
        assert_eq!(executor.previous_actions[0].args["element"], "B");
    }
}
