use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Agents ---

/// Backend that powers an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentProvider {
    /// Hosted Claude model.
    Claude,
    /// Hosted OpenAI model.
    OpenAi,
    /// Hosted Gemini model.
    Gemini,
    /// Agent-controlled HTTP endpoint called once per turn.
    Webhook,
}

impl AgentProvider {
    /// Stable identifier passed to the judging service.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentProvider::Claude => "claude",
            AgentProvider::OpenAi => "openai",
            AgentProvider::Gemini => "gemini",
            AgentProvider::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for AgentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and transport settings for one competing agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub provider: AgentProvider,
    #[serde(default)]
    pub model: String,
    /// Endpoint for [`AgentProvider::Webhook`] agents.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Shared secret used to sign webhook requests.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Rating used when seeding a tournament.
    #[serde(default)]
    pub elo_rating: Option<f64>,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, provider: AgentProvider) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider,
            model: String::new(),
            webhook_url: None,
            webhook_secret: None,
            elo_rating: None,
        }
    }

    /// Shorthand for a webhook-backed agent.
    pub fn webhook(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        let mut agent = Self::new(id, name, AgentProvider::Webhook);
        agent.webhook_url = Some(url.into());
        agent.webhook_secret = Some(secret.into());
        agent
    }

    pub fn with_elo(mut self, rating: f64) -> Self {
        self.elo_rating = Some(rating);
        self
    }
}

// --- Tasks ---

/// How a task turns a run result into points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
    /// Faster completion earns more points, with a floor for finishing at all.
    Time,
    /// All-or-nothing.
    #[default]
    Accuracy,
    /// Completion bonus plus a speed component.
    Composite,
    /// Scored by the external judging service.
    Judged,
    /// Any method this build does not know; scored like accuracy.
    #[serde(other)]
    Unknown,
}

/// Static description of a browser task agents compete on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    /// Time limit in seconds.
    #[serde(default = "default_time_limit")]
    pub time_limit: u64,
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    #[serde(default)]
    pub scoring_method: ScoringMethod,
    #[serde(default = "default_max_score")]
    pub max_score: u32,
    #[serde(default)]
    pub start_url: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub task_prompt: String,
    /// Task-specific settings handed through to the task page.
    #[serde(default)]
    pub config: serde_json::Value,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_difficulty() -> String {
    "medium".to_string()
}

fn default_time_limit() -> u64 {
    120
}

fn default_max_agents() -> usize {
    4
}

fn default_max_score() -> u32 {
    1000
}

impl TaskDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        scoring_method: ScoringMethod,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category: default_category(),
            difficulty: default_difficulty(),
            time_limit: default_time_limit(),
            max_agents: default_max_agents(),
            scoring_method,
            max_score: default_max_score(),
            start_url: String::new(),
            system_prompt: String::new(),
            task_prompt: String::new(),
            config: serde_json::Value::Null,
        }
    }

    pub fn with_time_limit(mut self, seconds: u64) -> Self {
        self.time_limit = seconds;
        self
    }

    pub fn with_max_score(mut self, max_score: u32) -> Self {
        self.max_score = max_score;
        self
    }

    pub fn with_prompts(
        mut self,
        system_prompt: impl Into<String>,
        task_prompt: impl Into<String>,
    ) -> Self {
        self.system_prompt = system_prompt.into();
        self.task_prompt = task_prompt.into();
        self
    }

    /// The time limit in milliseconds.
    pub fn time_limit_ms(&self) -> u64 {
        self.time_limit.saturating_mul(1000)
    }
}

// --- Turn-level types ---

/// What the agent can currently observe in its browser sandbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub accessibility_tree: String,
    /// Error produced by the previous action, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A browser action requested by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// Token accounting reported by model-backed agents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A tool call after it has been performed in the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAction {
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub args: serde_json::Value,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- Run results ---

/// Everything an agent produced while attempting a single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunResult {
    pub agent_id: String,
    pub task_id: String,
    pub success: bool,
    /// Wall-clock time from first turn to completion, in milliseconds.
    pub completion_time_ms: Option<u64>,
    pub actions: Vec<AgentAction>,
    /// Free-form payload the agent reported when it finished.
    pub final_result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub turns: u32,
    pub usage: TokenUsage,
}

impl AgentRunResult {
    /// A run that never produced anything usable.
    pub fn failed(
        agent_id: impl Into<String>,
        task_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            task_id: task_id.into(),
            success: false,
            completion_time_ms: None,
            actions: Vec::new(),
            final_result: None,
            error: Some(error.into()),
            turns: 0,
            usage: TokenUsage::default(),
        }
    }

    /// A successful run finished after `completion_time_ms`.
    pub fn succeeded(
        agent_id: impl Into<String>,
        task_id: impl Into<String>,
        completion_time_ms: u64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            task_id: task_id.into(),
            success: true,
            completion_time_ms: Some(completion_time_ms),
            actions: Vec::new(),
            final_result: None,
            error: None,
            turns: 0,
            usage: TokenUsage::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scoring_method_unknown_fallback() {
        let method: ScoringMethod = serde_json::from_str("\"elo-weighted\"").unwrap();
        assert_eq!(method, ScoringMethod::Unknown);
        let method: ScoringMethod = serde_json::from_str("\"composite\"").unwrap();
        assert_eq!(method, ScoringMethod::Composite);
    }

    #[test]
    fn test_task_definition_defaults() {
        let task: TaskDefinition =
            serde_json::from_str(r#"{"id": "form-blitz", "name": "Form Blitz"}"#).unwrap();
        assert_eq!(task.time_limit, 120);
        assert_eq!(task.max_score, 1000);
        assert_eq!(task.scoring_method, ScoringMethod::Accuracy);
        assert_eq!(task.time_limit_ms(), 120_000);
    }

    #[test]
    fn test_page_state_wire_format() {
        let page = PageState {
            url: "http://localhost/task".to_string(),
            title: "Task".to_string(),
            accessibility_tree: "button Submit".to_string(),
            error: None,
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["accessibilityTree"], "button Submit");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_agent_provider_serialization() {
        let json = serde_json::to_string(&AgentProvider::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
        assert_eq!(AgentProvider::Webhook.to_string(), "webhook");
    }

    #[test]
    fn test_webhook_agent_builder() {
        let agent = AgentConfig::webhook("a1", "Hooky", "http://agent/webhook", "s3cret")
            .with_elo(1450.0);
        assert_eq!(agent.provider, AgentProvider::Webhook);
        assert_eq!(agent.webhook_url.as_deref(), Some("http://agent/webhook"));
        assert_eq!(agent.elo_rating, Some(1450.0));
    }

    #[test]
    fn test_failed_run_result() {
        let result = AgentRunResult::failed("a1", "t1", "sandbox crashed");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("sandbox crashed"));
        assert!(result.completion_time_ms.is_none());
    }
}
