//! Competition controller: N agents against M tasks.
//!
//! Tasks run one after another. Inside a task every agent gets its own
//! sandbox and executor; agents start a fixed stagger apart and are awaited
//! together, so one agent failing never affects its siblings.

use crate::context::ArenaContext;
use crate::events::ArenaEvent;
use crate::types::{AgentResult, Competition, CompetitionStatus, EventStatus, LeaderboardEntry};
use chrono::Utc;
use futures_util::future::join_all;
use olympics_agent::{AgentRunner, RunControl, RunnerConfig};
use olympics_core::{AgentConfig, AgentRunResult, OlympicsError, OlympicsResult, TaskDefinition};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tuning for competition runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionConfig {
    /// Delay between consecutive agent starts within an event (default: 500).
    #[serde(default = "default_agent_stagger_ms")]
    pub agent_stagger_ms: u64,

    /// Turn budget handed to the runner (default: 30).
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

fn default_agent_stagger_ms() -> u64 {
    500
}

fn default_max_turns() -> u32 {
    30
}

impl Default for CompetitionConfig {
    fn default() -> Self {
        Self {
            agent_stagger_ms: default_agent_stagger_ms(),
            max_turns: default_max_turns(),
        }
    }
}

impl CompetitionConfig {
    fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_turns: self.max_turns,
        }
    }
}

/// Drives a single competition from creation to completion or cancellation.
///
/// One controller holds at most one competition. Calls to
/// [`start_competition`](Self::start_competition) must not overlap.
pub struct CompetitionController {
    ctx: ArenaContext,
    competition: RwLock<Option<Competition>>,
    control: RunControl,
    /// Live sandbox id -> agent id.
    live_sandboxes: Mutex<HashMap<String, String>>,
}

impl CompetitionController {
    pub fn new(ctx: ArenaContext) -> Self {
        Self {
            ctx,
            competition: RwLock::new(None),
            control: RunControl::new(),
            live_sandboxes: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule a new competition, replacing a previous one that has finished.
    ///
    /// Fails while another competition is scheduled, running or paused.
    pub async fn create_competition(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        agents: Vec<AgentConfig>,
        tasks: Vec<TaskDefinition>,
    ) -> OlympicsResult<Competition> {
        if agents.is_empty() {
            return Err(OlympicsError::Config(
                "a competition needs at least one agent".to_string(),
            ));
        }
        if tasks.is_empty() {
            return Err(OlympicsError::Config(
                "a competition needs at least one task".to_string(),
            ));
        }

        let mut current = self.competition.write().await;
        if let Some(active) = current.as_ref().filter(|c| {
            !matches!(
                c.status,
                CompetitionStatus::Completed | CompetitionStatus::Cancelled
            )
        }) {
            return Err(OlympicsError::Config(format!(
                "competition {} is still {}",
                active.id, active.status
            )));
        }

        let competition = Competition::new(name, description, agents, tasks);
        info!(
            competition_id = %competition.id,
            name = %competition.name,
            agents = competition.agents.len(),
            events = competition.events.len(),
            "Competition created"
        );
        self.control.reset();
        *current = Some(competition.clone());
        Ok(competition)
    }

    /// Run every event in order and finish the competition.
    ///
    /// Returns once the competition is completed or cancelled.
    pub async fn start_competition(&self) -> OlympicsResult<()> {
        let (competition_id, name, agents, tasks) = {
            let mut guard = self.competition.write().await;
            let comp = guard.as_mut().ok_or(OlympicsError::NoCompetition)?;
            if comp.status != CompetitionStatus::Scheduled {
                return Err(OlympicsError::Config(format!(
                    "competition {} is {}, not scheduled",
                    comp.id, comp.status
                )));
            }
            comp.status = CompetitionStatus::Running;
            comp.actual_start = Some(Utc::now());
            (
                comp.id,
                comp.name.clone(),
                comp.agents.clone(),
                comp.events
                    .iter()
                    .map(|e| e.task.clone())
                    .collect::<Vec<_>>(),
            )
        };

        info!(competition_id = %competition_id, name = %name, "Competition started");
        self.save_snapshot().await;
        self.emit(
            competition_id,
            ArenaEvent::CompetitionStart {
                competition_id,
                name,
                agent_ids: agents.iter().map(|a| a.id.clone()).collect(),
                task_ids: tasks.iter().map(|t| t.id.clone()).collect(),
            },
        )
        .await;

        for (index, task) in tasks.iter().enumerate() {
            if !self.control.wait_while_paused().await {
                break;
            }

            self.mark_event_running(index).await;
            self.emit(
                competition_id,
                ArenaEvent::EventStart {
                    competition_id,
                    event_index: index,
                    task_id: task.id.clone(),
                },
            )
            .await;

            let results = self.run_event(&agents, task).await;

            let (leaderboard, status) = {
                let mut guard = self.competition.write().await;
                let comp = guard.as_mut().ok_or(OlympicsError::NoCompetition)?;
                if let Err(e) = comp.process_event_results(index, results) {
                    warn!(competition_id = %competition_id, error = %e, "Could not record event results");
                }
                let status = comp
                    .events
                    .get(index)
                    .map(|e| e.status)
                    .unwrap_or(EventStatus::Failed);
                (comp.leaderboard.clone(), status)
            };

            info!(
                competition_id = %competition_id,
                event_index = index,
                task_id = %task.id,
                status = ?status,
                "Event finished"
            );
            self.save_snapshot().await;
            self.emit(
                competition_id,
                ArenaEvent::LeaderboardUpdate {
                    competition_id,
                    leaderboard,
                },
            )
            .await;
            self.emit(
                competition_id,
                ArenaEvent::EventEnd {
                    competition_id,
                    event_index: index,
                    status,
                },
            )
            .await;

            if self.control.is_cancelled() {
                break;
            }
        }

        let (status, leaderboard) = {
            let mut guard = self.competition.write().await;
            let comp = guard.as_mut().ok_or(OlympicsError::NoCompetition)?;
            if comp.status != CompetitionStatus::Cancelled {
                comp.status = CompetitionStatus::Completed;
            }
            comp.end_time.get_or_insert_with(Utc::now);
            (comp.status, comp.leaderboard.clone())
        };

        info!(competition_id = %competition_id, status = %status, "Competition finished");
        self.emit(
            competition_id,
            ArenaEvent::CompetitionEnd {
                competition_id,
                status,
                leaderboard,
            },
        )
        .await;

        if status == CompetitionStatus::Completed {
            if let Some(store) = &self.ctx.snapshots {
                if let Err(e) = store.remove_competition_snapshot(competition_id).await {
                    warn!(competition_id = %competition_id, error = %e, "Failed to remove snapshot");
                }
            }
        }
        Ok(())
    }

    /// Fold externally produced results for one event into the leaderboard.
    pub async fn process_event_results(
        &self,
        event_index: usize,
        results: Vec<AgentResult>,
    ) -> OlympicsResult<()> {
        let mut guard = self.competition.write().await;
        let comp = guard.as_mut().ok_or(OlympicsError::NoCompetition)?;
        comp.process_event_results(event_index, results)
    }

    /// Pause a running competition. Takes effect at the next event or turn boundary.
    pub async fn pause_competition(&self) {
        let mut guard = self.competition.write().await;
        if let Some(comp) = guard.as_mut() {
            if comp.status == CompetitionStatus::Running {
                comp.status = CompetitionStatus::Paused;
                self.control.pause();
                info!(competition_id = %comp.id, "Competition paused");
            }
        }
    }

    pub async fn resume_competition(&self) {
        let mut guard = self.competition.write().await;
        if let Some(comp) = guard.as_mut() {
            if comp.status == CompetitionStatus::Paused {
                comp.status = CompetitionStatus::Running;
                self.control.resume();
                info!(competition_id = %comp.id, "Competition resumed");
            }
        }
    }

    /// Cancel the competition and tear down its sandboxes and persisted state.
    ///
    /// A no-op when no competition exists or it already finished.
    pub async fn cancel_competition(&self) {
        let competition_id = {
            let mut guard = self.competition.write().await;
            let Some(comp) = guard.as_mut() else {
                return;
            };
            if matches!(
                comp.status,
                CompetitionStatus::Completed | CompetitionStatus::Cancelled
            ) {
                return;
            }
            comp.status = CompetitionStatus::Cancelled;
            comp.end_time = Some(Utc::now());
            comp.id
        };

        self.control.cancel();
        info!(competition_id = %competition_id, "Competition cancelled");
        self.stop_live_sandboxes().await;

        if let Some(store) = &self.ctx.snapshots {
            if let Err(e) = store.remove_competition_snapshot(competition_id).await {
                warn!(competition_id = %competition_id, error = %e, "Failed to remove snapshot");
            }
            if let Err(e) = store.delete_event_log(competition_id).await {
                warn!(competition_id = %competition_id, error = %e, "Failed to delete event log");
            }
        }
    }

    /// Stop every sandbox this controller still has running. Idempotent.
    pub async fn cleanup(&self) {
        self.stop_live_sandboxes().await;
    }

    pub async fn competition(&self) -> Option<Competition> {
        self.competition.read().await.clone()
    }

    pub async fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.competition
            .read()
            .await
            .as_ref()
            .map(|c| c.leaderboard.clone())
            .unwrap_or_default()
    }

    /// Number of sandboxes currently held by runs of this controller.
    pub fn live_sandbox_count(&self) -> usize {
        self.live_sandboxes.lock().len()
    }

    // --- internals ---

    async fn mark_event_running(&self, index: usize) {
        let mut guard = self.competition.write().await;
        if let Some(comp) = guard.as_mut() {
            comp.current_event_index = index;
            if let Some(event) = comp.events.get_mut(index) {
                event.status = EventStatus::Running;
                event.started_at = Some(Utc::now());
            }
        }
    }

    async fn run_event(&self, agents: &[AgentConfig], task: &TaskDefinition) -> Vec<AgentResult> {
        let stagger = Duration::from_millis(self.ctx.config.agent_stagger_ms);
        let runs = agents.iter().enumerate().map(|(index, agent)| async move {
            if index > 0 && !stagger.is_zero() {
                tokio::time::sleep(stagger * index as u32).await;
            }
            self.run_agent(agent, task).await
        });
        join_all(runs).await
    }

    async fn run_agent(&self, agent: &AgentConfig, task: &TaskDefinition) -> AgentResult {
        match self.execute_agent(agent, task).await {
            Ok(run) => {
                let score = self.ctx.scoring.score(task, &run, agent.provider).await;
                debug!(agent_id = %agent.id, task_id = %task.id, success = run.success, score, "Agent scored");
                AgentResult::from_run(run, score)
            }
            Err(e) => {
                warn!(agent_id = %agent.id, task_id = %task.id, error = %e, "Agent run failed");
                AgentResult::failed(&agent.id, &task.id, e.to_string())
            }
        }
    }

    async fn execute_agent(
        &self,
        agent: &AgentConfig,
        task: &TaskDefinition,
    ) -> OlympicsResult<AgentRunResult> {
        if self.control.is_cancelled() {
            return Ok(AgentRunResult::failed(&agent.id, &task.id, "run cancelled"));
        }

        let sandbox = self.ctx.sandboxes.create_local_sandbox().await?;
        self.live_sandboxes
            .lock()
            .insert(sandbox.id.clone(), agent.id.clone());

        let outcome = match self.ctx.executors.create(agent, task) {
            Ok(mut executor) => {
                let runner =
                    AgentRunner::new(self.ctx.config.runner_config(), self.ctx.sandboxes.clone());
                runner
                    .run(executor.as_mut(), &sandbox.id, agent, task, &self.control)
                    .await
            }
            Err(e) => Err(e),
        };

        self.release_sandbox(&sandbox.id).await;
        outcome
    }

    async fn release_sandbox(&self, sandbox_id: &str) {
        let owner = self.live_sandboxes.lock().remove(sandbox_id);
        if let Some(agent_id) = owner {
            if let Err(e) = self.ctx.sandboxes.stop_sandbox(sandbox_id).await {
                warn!(sandbox_id, agent_id = %agent_id, error = %e, "Failed to stop sandbox");
            }
        }
    }

    async fn stop_live_sandboxes(&self) {
        let drained: Vec<(String, String)> = self.live_sandboxes.lock().drain().collect();
        for (sandbox_id, agent_id) in drained {
            if let Err(e) = self.ctx.sandboxes.stop_sandbox(&sandbox_id).await {
                warn!(sandbox_id = %sandbox_id, agent_id = %agent_id, error = %e, "Failed to stop sandbox");
            }
        }
    }

    async fn save_snapshot(&self) {
        let Some(store) = &self.ctx.snapshots else {
            return;
        };
        if self.control.is_cancelled() {
            return;
        }
        let snapshot = self.competition.read().await.clone();
        if let Some(comp) = snapshot {
            if let Err(e) = store.save_competition_snapshot(&comp).await {
                warn!(competition_id = %comp.id, error = %e, "Failed to save snapshot");
            }
        }
    }

    async fn emit(&self, competition_id: Uuid, event: ArenaEvent) {
        if let Some(store) = &self.ctx.snapshots {
            if !self.control.is_cancelled() {
                if let Err(e) = store.append_event_log(competition_id, &event).await {
                    warn!(competition_id = %competition_id, error = %e, "Failed to append event log");
                }
            }
        }
        self.ctx.events.emit(event);
    }
}
