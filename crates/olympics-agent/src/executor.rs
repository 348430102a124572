use crate::webhook::{WebhookConfig, WebhookExecutor};
use async_trait::async_trait;
use olympics_core::{
    AgentConfig, AgentProvider, OlympicsError, OlympicsResult, PageState, TaskDefinition,
    TokenUsage, ToolCall,
};
use serde::{Deserialize, Serialize};

/// One step of agent output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnResponse {
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    /// The agent considers the task finished.
    pub done: bool,
    pub result: Option<serde_json::Value>,
    pub usage: Option<TokenUsage>,
}

impl TurnResponse {
    /// A final turn reporting failure, used when the transport itself broke.
    pub fn terminal_failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            thinking: None,
            tool_calls: Vec::new(),
            done: true,
            result: Some(serde_json::json!({ "success": false, "error": error })),
            usage: None,
        }
    }
}

/// Trait for agent backends.
///
/// Each backend (hosted model, webhook, test double) implements this trait.
/// The runner calls `initialize` once, `process_turn` until the response is
/// `done` or the budget runs out, and `cleanup` exactly once afterwards.
#[async_trait]
pub trait AgentExecutor: Send {
    async fn initialize(&mut self, system_prompt: &str, task_prompt: &str) -> OlympicsResult<()>;

    async fn process_turn(&mut self, page: &PageState) -> OlympicsResult<TurnResponse>;

    async fn cleanup(&mut self) -> OlympicsResult<()>;
}

/// Builds a fresh executor for one agent attempting one task.
pub trait ExecutorFactory: Send + Sync {
    fn create(
        &self,
        agent: &AgentConfig,
        task: &TaskDefinition,
    ) -> OlympicsResult<Box<dyn AgentExecutor>>;
}

/// Factory that knows how to reach webhook agents.
///
/// Hosted-model providers need a custom factory that wraps their adapters.
pub struct DefaultExecutorFactory {
    config: WebhookConfig,
    http: reqwest::Client,
}

impl DefaultExecutorFactory {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

impl Default for DefaultExecutorFactory {
    fn default() -> Self {
        Self::new(WebhookConfig::default())
    }
}

impl ExecutorFactory for DefaultExecutorFactory {
    fn create(
        &self,
        agent: &AgentConfig,
        _task: &TaskDefinition,
    ) -> OlympicsResult<Box<dyn AgentExecutor>> {
        match agent.provider {
            AgentProvider::Webhook => {
                let executor = WebhookExecutor::from_agent(agent, self.http.clone(), &self.config)?;
                Ok(Box::new(executor))
            }
            other => Err(OlympicsError::Config(format!(
                "no executor available for provider '{other}' (agent {})",
                agent.id
            ))),
        }
    }
}
