use crate::executor::AgentExecutor;
use crate::sandbox::SandboxManager;
use olympics_core::{
    AgentAction, AgentConfig, AgentRunResult, OlympicsResult, TaskDefinition, TokenUsage,
    ToolCall,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Budget applied to every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Maximum number of turns before the run is abandoned (default: 30).
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

fn default_max_turns() -> u32 {
    30
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

/// Cooperative pause/cancel flags shared between a controller and its runs.
///
/// Runs observe the flags between turns; a turn already in flight always
/// completes.
#[derive(Debug, Default)]
pub struct RunControl {
    cancelled: AtomicBool,
    paused: AtomicBool,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Clear both flags so the control can drive a new run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Block while paused. Returns `false` if the run was cancelled meanwhile.
    pub async fn wait_while_paused(&self) -> bool {
        loop {
            if self.is_cancelled() {
                return false;
            }
            if !self.is_paused() {
                return true;
            }
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
        }
    }
}

#[derive(Debug, Default)]
struct RunProgress {
    actions: Vec<AgentAction>,
    turns: u32,
    usage: TokenUsage,
    final_result: Option<serde_json::Value>,
}

enum LoopEnd {
    Done,
    MaxTurns,
    Cancelled,
    TimedOut,
}

/// Wall clock of a run with paused spans taken out.
struct RunClock {
    started: Instant,
    deadline: Instant,
    paused: Duration,
}

impl RunClock {
    fn start(limit: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + limit,
            paused: Duration::ZERO,
        }
    }

    /// Push the deadline back by a span the run spent paused.
    fn exclude(&mut self, span: Duration) {
        self.paused += span;
        self.deadline += span;
    }

    fn active(&self) -> Duration {
        self.started.elapsed().saturating_sub(self.paused)
    }
}

/// The turn loop: page state → agent turn → perform actions → repeat.
pub struct AgentRunner {
    config: RunnerConfig,
    sandboxes: Arc<dyn SandboxManager>,
}

impl AgentRunner {
    pub fn new(config: RunnerConfig, sandboxes: Arc<dyn SandboxManager>) -> Self {
        Self { config, sandboxes }
    }

    /// Run one agent through one task inside an already-created sandbox.
    ///
    /// Budget exhaustion (turns or the task's time limit) and cancellation
    /// produce a failed [`AgentRunResult`]. Errors from the executor itself are
    /// returned so the caller can record the agent as failed. The executor is
    /// cleaned up on every path.
    pub async fn run(
        &self,
        executor: &mut dyn AgentExecutor,
        sandbox_id: &str,
        agent: &AgentConfig,
        task: &TaskDefinition,
        control: &RunControl,
    ) -> OlympicsResult<AgentRunResult> {
        let outcome = self
            .run_inner(executor, sandbox_id, agent, task, control)
            .await;

        if let Err(e) = executor.cleanup().await {
            warn!(agent_id = %agent.id, error = %e, "Executor cleanup failed");
        }

        outcome
    }

    async fn run_inner(
        &self,
        executor: &mut dyn AgentExecutor,
        sandbox_id: &str,
        agent: &AgentConfig,
        task: &TaskDefinition,
        control: &RunControl,
    ) -> OlympicsResult<AgentRunResult> {
        executor
            .initialize(&task.system_prompt, &task.task_prompt)
            .await?;

        if !task.start_url.is_empty() {
            let call = ToolCall::new("navigate", serde_json::json!({ "url": task.start_url }));
            self.sandboxes.perform(sandbox_id, &call).await?;
        }

        info!(agent_id = %agent.id, task_id = %task.id, "Starting agent run");

        let mut clock = RunClock::start(Duration::from_millis(task.time_limit_ms()));
        let mut progress = RunProgress::default();

        let ended = self
            .turn_loop(executor, sandbox_id, agent, control, &mut clock, &mut progress)
            .await?;
        let elapsed_ms = clock.active().as_millis() as u64;

        let failure = match ended {
            LoopEnd::Done => None,
            LoopEnd::MaxTurns => {
                warn!(agent_id = %agent.id, max_turns = self.config.max_turns, "Run reached max turns");
                Some(format!(
                    "exceeded maximum of {} turns",
                    self.config.max_turns
                ))
            }
            LoopEnd::Cancelled => Some("run cancelled".to_string()),
            LoopEnd::TimedOut => {
                warn!(agent_id = %agent.id, time_limit = task.time_limit, "Run hit time limit");
                Some(format!("time limit of {}s exceeded", task.time_limit))
            }
        };

        let reported_failure = progress.final_result.as_ref().and_then(|result| {
            let failed = result.get("success").and_then(serde_json::Value::as_bool) == Some(false);
            failed.then(|| {
                result
                    .get("error")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("agent reported failure")
                    .to_string()
            })
        });
        let error = failure.or(reported_failure);
        let success = error.is_none();

        info!(
            agent_id = %agent.id,
            task_id = %task.id,
            success,
            turns = progress.turns,
            elapsed_ms,
            "Agent run finished"
        );

        Ok(AgentRunResult {
            agent_id: agent.id.clone(),
            task_id: task.id.clone(),
            success,
            completion_time_ms: success.then_some(elapsed_ms),
            actions: progress.actions,
            final_result: progress.final_result,
            error,
            turns: progress.turns,
            usage: progress.usage,
        })
    }

    /// Pauses happen between turns and are excluded from the time limit.
    async fn turn_loop(
        &self,
        executor: &mut dyn AgentExecutor,
        sandbox_id: &str,
        agent: &AgentConfig,
        control: &RunControl,
        clock: &mut RunClock,
        progress: &mut RunProgress,
    ) -> OlympicsResult<LoopEnd> {
        for turn in 0..self.config.max_turns {
            let wait_started = Instant::now();
            let resumed = control.wait_while_paused().await;
            clock.exclude(wait_started.elapsed());
            if !resumed {
                return Ok(LoopEnd::Cancelled);
            }

            let step = tokio::time::timeout_at(
                clock.deadline,
                self.play_turn(executor, sandbox_id, agent, turn, progress),
            )
            .await;
            match step {
                Err(_) => return Ok(LoopEnd::TimedOut),
                Ok(Err(e)) => return Err(e),
                Ok(Ok(true)) => return Ok(LoopEnd::Done),
                Ok(Ok(false)) => {}
            }
        }

        Ok(LoopEnd::MaxTurns)
    }

    /// One turn: observe, ask the agent, perform its tool calls. Returns
    /// whether the agent finished.
    async fn play_turn(
        &self,
        executor: &mut dyn AgentExecutor,
        sandbox_id: &str,
        agent: &AgentConfig,
        turn: u32,
        progress: &mut RunProgress,
    ) -> OlympicsResult<bool> {
        let page = self.sandboxes.page_state(sandbox_id).await?;
        let response = executor.process_turn(&page).await?;
        progress.turns += 1;
        if let Some(usage) = response.usage {
            progress.usage.add(usage);
        }

        debug!(
            agent_id = %agent.id,
            turn,
            tool_calls = response.tool_calls.len(),
            done = response.done,
            "Agent turn"
        );

        let mut finished = response.done;
        for call in &response.tool_calls {
            if call.tool == "done" {
                finished = true;
                progress.final_result = Some(call.args.clone());
                progress.actions.push(action(call, true, None));
                continue;
            }
            match self.sandboxes.perform(sandbox_id, call).await {
                Ok(outcome) => {
                    progress
                        .actions
                        .push(action(call, outcome.success, outcome.error));
                }
                Err(e) => {
                    progress
                        .actions
                        .push(action(call, false, Some(e.to_string())));
                }
            }
        }

        if finished && progress.final_result.is_none() {
            progress.final_result = response.result;
        }
        Ok(finished)
    }
}

fn action(call: &ToolCall, success: bool, error: Option<String>) -> AgentAction {
    AgentAction {
        timestamp: chrono::Utc::now(),
        tool: call.tool.clone(),
        args: call.args.clone(),
        success,
        error,
    }
}
