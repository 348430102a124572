//! Browser sandbox lifecycle.
//!
//! The orchestration core only creates and stops sandboxes; the runner is the
//! one component that reads page state and performs actions inside them. The
//! [`LocalSandboxManager`] keeps every sandbox in process and simulates
//! navigation, which is enough for local runs and tests. Creation waits for
//! capacity when `max_sandboxes` are already running.

use async_trait::async_trait;
use olympics_core::{OlympicsError, OlympicsResult, PageState, ToolCall};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};
use uuid::Uuid;

/// Lifecycle state of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    Running,
    Stopped,
}

/// Handle returned when a sandbox is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxInfo {
    pub id: String,
    pub status: SandboxStatus,
}

/// Result of performing one tool call in a sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Opaque browser-environment lifecycle.
#[async_trait]
pub trait SandboxManager: Send + Sync {
    async fn create_local_sandbox(&self) -> OlympicsResult<SandboxInfo>;

    async fn stop_sandbox(&self, id: &str) -> OlympicsResult<()>;

    /// Stop and forget every sandbox this manager created.
    async fn cleanup(&self) -> OlympicsResult<()>;

    async fn page_state(&self, id: &str) -> OlympicsResult<PageState>;

    async fn perform(&self, id: &str, call: &ToolCall) -> OlympicsResult<ActionOutcome>;
}

// ---------------------------------------------------------------------------
// Local sandbox
// ---------------------------------------------------------------------------

/// Configuration for the in-process sandbox manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSandboxConfig {
    /// Maximum number of sandboxes running at once (default: 32). Further
    /// creates wait until one is stopped.
    #[serde(default = "default_max_sandboxes")]
    pub max_sandboxes: usize,
}

fn default_max_sandboxes() -> usize {
    32
}

impl Default for LocalSandboxConfig {
    fn default() -> Self {
        Self {
            max_sandboxes: default_max_sandboxes(),
        }
    }
}

#[derive(Debug)]
struct LocalSandbox {
    url: String,
    history: Vec<String>,
    last_error: Option<String>,
    /// Capacity slot; returned when the sandbox is removed.
    _permit: OwnedSemaphorePermit,
}

impl LocalSandbox {
    fn new(permit: OwnedSemaphorePermit) -> Self {
        Self {
            url: "about:blank".to_string(),
            history: Vec::new(),
            last_error: None,
            _permit: permit,
        }
    }

    fn page_state(&self) -> PageState {
        let title = self
            .url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("blank")
            .to_string();
        PageState {
            accessibility_tree: format!("RootWebArea \"{title}\"\n  url: {}", self.url),
            url: self.url.clone(),
            title,
            error: self.last_error.clone(),
        }
    }

    fn apply(&mut self, call: &ToolCall) -> ActionOutcome {
        let outcome = match call.tool.as_str() {
            "navigate" => match call.args.get("url").and_then(serde_json::Value::as_str) {
                Some(url) if !url.is_empty() => {
                    let previous = std::mem::replace(&mut self.url, url.to_string());
                    self.history.push(previous);
                    ActionOutcome::ok()
                }
                _ => ActionOutcome::failed("navigate requires a non-empty 'url'"),
            },
            "back" => match self.history.pop() {
                Some(url) => {
                    self.url = url;
                    ActionOutcome::ok()
                }
                None => ActionOutcome::failed("no page to go back to"),
            },
            "click" | "type" | "fill" | "select" | "hover" | "press" | "scroll" | "wait"
            | "screenshot" | "done" => ActionOutcome::ok(),
            other => ActionOutcome::failed(format!("unknown tool '{other}'")),
        };
        self.last_error = outcome.error.clone();
        outcome
    }
}

/// Sandbox manager that keeps simulated browser state in memory.
pub struct LocalSandboxManager {
    config: LocalSandboxConfig,
    capacity: Arc<Semaphore>,
    sandboxes: Mutex<HashMap<String, LocalSandbox>>,
}

impl LocalSandboxManager {
    pub fn new(config: LocalSandboxConfig) -> Self {
        let capacity = Arc::new(Semaphore::new(config.max_sandboxes.max(1)));
        Self {
            config,
            capacity,
            sandboxes: Mutex::new(HashMap::new()),
        }
    }

    /// Number of sandboxes currently running. Stopped sandboxes are dropped
    /// from the manager.
    pub fn running_count(&self) -> usize {
        self.sandboxes.lock().len()
    }

    fn with_running<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut LocalSandbox) -> T,
    ) -> OlympicsResult<T> {
        self.sandboxes
            .lock()
            .get_mut(id)
            .map(f)
            .ok_or_else(|| OlympicsError::Sandbox(format!("sandbox {id} not found")))
    }

    async fn acquire_slot(&self) -> OlympicsResult<OwnedSemaphorePermit> {
        if let Ok(permit) = self.capacity.clone().try_acquire_owned() {
            return Ok(permit);
        }
        debug!(
            max_sandboxes = self.config.max_sandboxes,
            "Sandbox limit reached, waiting for capacity"
        );
        self.capacity
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| OlympicsError::Sandbox("sandbox manager is closed".to_string()))
    }
}

impl Default for LocalSandboxManager {
    fn default() -> Self {
        Self::new(LocalSandboxConfig::default())
    }
}

#[async_trait]
impl SandboxManager for LocalSandboxManager {
    async fn create_local_sandbox(&self) -> OlympicsResult<SandboxInfo> {
        let permit = self.acquire_slot().await?;
        let id = format!("local-{}", Uuid::new_v4());
        self.sandboxes
            .lock()
            .insert(id.clone(), LocalSandbox::new(permit));
        debug!(sandbox_id = %id, "Local sandbox created");
        Ok(SandboxInfo {
            id,
            status: SandboxStatus::Running,
        })
    }

    async fn stop_sandbox(&self, id: &str) -> OlympicsResult<()> {
        self.sandboxes
            .lock()
            .remove(id)
            .ok_or_else(|| OlympicsError::Sandbox(format!("sandbox {id} not found")))?;
        debug!(sandbox_id = %id, "Local sandbox stopped");
        Ok(())
    }

    async fn cleanup(&self) -> OlympicsResult<()> {
        let removed = {
            let mut sandboxes = self.sandboxes.lock();
            let count = sandboxes.len();
            sandboxes.clear();
            count
        };
        if removed > 0 {
            info!(removed, "Local sandboxes cleaned up");
        }
        Ok(())
    }

    async fn page_state(&self, id: &str) -> OlympicsResult<PageState> {
        self.with_running(id, |sandbox| sandbox.page_state())
    }

    async fn perform(&self, id: &str, call: &ToolCall) -> OlympicsResult<ActionOutcome> {
        self.with_running(id, |sandbox| sandbox.apply(call))
    }
}
