use chrono::{DateTime, Utc};
use olympics_core::{
    AgentAction, AgentConfig, AgentRunResult, OlympicsError, OlympicsResult, TaskDefinition,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

/// Elo rating used for seeding when an agent has none configured.
pub const DEFAULT_ELO_RATING: f64 = 1200.0;

// --- Competitions ---

/// Lifecycle of a competition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompetitionStatus {
    Scheduled,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl std::fmt::Display for CompetitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompetitionStatus::Scheduled => write!(f, "scheduled"),
            CompetitionStatus::Running => write!(f, "running"),
            CompetitionStatus::Paused => write!(f, "paused"),
            CompetitionStatus::Completed => write!(f, "completed"),
            CompetitionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Lifecycle of one task execution inside a competition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Outcome class of a single agent's attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentResultStatus {
    Completed,
    Failed,
}

/// One agent's scored attempt at one task. Never modified after it is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub task_id: String,
    pub status: AgentResultStatus,
    pub score: u32,
    pub actions: Vec<AgentAction>,
    pub completion_time_ms: Option<u64>,
    pub error: Option<String>,
}

impl AgentResult {
    /// Wrap a runner result with its score. Failed runs always score 0.
    pub fn from_run(run: AgentRunResult, score: u32) -> Self {
        let status = if run.success {
            AgentResultStatus::Completed
        } else {
            AgentResultStatus::Failed
        };
        Self {
            agent_id: run.agent_id,
            task_id: run.task_id,
            status,
            score: if run.success { score } else { 0 },
            actions: run.actions,
            completion_time_ms: run.completion_time_ms,
            error: run.error,
        }
    }

    /// An attempt that errored before producing a run result.
    pub fn failed(
        agent_id: impl Into<String>,
        task_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            task_id: task_id.into(),
            status: AgentResultStatus::Failed,
            score: 0,
            actions: Vec::new(),
            completion_time_ms: None,
            error: Some(error.into()),
        }
    }

    /// A completed attempt with the given score and no recorded actions.
    pub fn completed(agent_id: impl Into<String>, task_id: impl Into<String>, score: u32) -> Self {
        Self {
            agent_id: agent_id.into(),
            task_id: task_id.into(),
            status: AgentResultStatus::Completed,
            score,
            actions: Vec::new(),
            completion_time_ms: None,
            error: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == AgentResultStatus::Completed
    }
}

/// One task executed by every agent of a competition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionEvent {
    pub id: Uuid,
    pub task: TaskDefinition,
    pub status: EventStatus,
    pub results: Vec<AgentResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CompetitionEvent {
    pub fn new(task: TaskDefinition) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            status: EventStatus::Pending,
            results: Vec::new(),
            started_at: None,
            ended_at: None,
        }
    }
}

/// Cumulative standing of one agent in a competition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub agent_id: String,
    pub agent_name: String,
    pub total_score: u64,
    pub events_won: u32,
    pub events_completed: u32,
    pub rank: usize,
}

/// N agents against M tasks, scored into a leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competition {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub status: CompetitionStatus,
    pub agents: Vec<AgentConfig>,
    pub events: Vec<CompetitionEvent>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub current_event_index: usize,
    pub created_at: DateTime<Utc>,
    pub actual_start: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Competition {
    /// A scheduled competition with one pending event per task and a zeroed
    /// leaderboard entry per agent, ranked in agent order.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        agents: Vec<AgentConfig>,
        tasks: Vec<TaskDefinition>,
    ) -> Self {
        let leaderboard = agents
            .iter()
            .enumerate()
            .map(|(i, agent)| LeaderboardEntry {
                agent_id: agent.id.clone(),
                agent_name: agent.name.clone(),
                total_score: 0,
                events_won: 0,
                events_completed: 0,
                rank: i + 1,
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            status: CompetitionStatus::Scheduled,
            agents,
            events: tasks.into_iter().map(CompetitionEvent::new).collect(),
            leaderboard,
            current_event_index: 0,
            created_at: Utc::now(),
            actual_start: None,
            end_time: None,
        }
    }

    pub fn entry(&self, agent_id: &str) -> Option<&LeaderboardEntry> {
        self.leaderboard.iter().find(|e| e.agent_id == agent_id)
    }

    /// Fold one event's results into the event and the leaderboard.
    ///
    /// Every agent holding the strictly positive top score of the event gets
    /// the win. The leaderboard is re-sorted by total score (stable, so equal
    /// totals keep their previous order) and ranks are reassigned 1..N.
    pub fn process_event_results(
        &mut self,
        event_index: usize,
        results: Vec<AgentResult>,
    ) -> OlympicsResult<()> {
        let event = self.events.get_mut(event_index).ok_or_else(|| {
            OlympicsError::Config(format!(
                "event index {event_index} out of range for competition {}",
                self.id
            ))
        })?;

        let top_score = results.iter().map(|r| r.score).max().unwrap_or(0);
        let all_failed = !results.is_empty() && results.iter().all(|r| !r.is_completed());

        for result in &results {
            let Some(entry) = self
                .leaderboard
                .iter_mut()
                .find(|e| e.agent_id == result.agent_id)
            else {
                warn!(agent_id = %result.agent_id, "Result for an agent outside the competition ignored");
                continue;
            };
            entry.total_score += u64::from(result.score);
            if result.is_completed() {
                entry.events_completed += 1;
            }
            if top_score > 0 && result.score == top_score {
                entry.events_won += 1;
            }
        }

        event.results.extend(results);
        event.status = if all_failed {
            EventStatus::Failed
        } else {
            EventStatus::Completed
        };
        event.ended_at = Some(Utc::now());

        self.leaderboard.sort_by(|a, b| b.total_score.cmp(&a.total_score));
        for (i, entry) in self.leaderboard.iter_mut().enumerate() {
            entry.rank = i + 1;
        }
        Ok(())
    }
}

// --- Tournaments ---

/// Lifecycle of a tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TournamentStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
}

/// Scheduling algorithm of a tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BracketType {
    SingleElimination,
    RoundRobin,
    Swiss,
}

impl std::fmt::Display for BracketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BracketType::SingleElimination => write!(f, "single-elimination"),
            BracketType::RoundRobin => write!(f, "round-robin"),
            BracketType::Swiss => write!(f, "swiss"),
        }
    }
}

/// Seeding position of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentSeed {
    pub agent_id: String,
    /// 1-based; seed 1 is the strongest.
    pub seed_number: usize,
    pub elo_rating: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Pending,
    Running,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Running,
    Completed,
    Bye,
}

/// One agent's tally inside a match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub score: u64,
    pub tasks_won: u32,
    pub tasks_played: u32,
}

/// A 1-vs-1 competition, or a bye when it holds a single agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentMatch {
    pub id: Uuid,
    /// 1-based position within the round.
    pub match_number: usize,
    pub agent_ids: Vec<String>,
    pub is_bye: bool,
    pub status: MatchStatus,
    pub winner_id: Option<String>,
    pub loser_id: Option<String>,
    pub results: BTreeMap<String, MatchResult>,
    pub competition_id: Option<Uuid>,
    pub task_id: Option<String>,
    /// Set when the winner was drawn at random because the match errored.
    pub forfeit_reason: Option<String>,
}

impl TournamentMatch {
    pub fn new(match_number: usize, agent_ids: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            match_number,
            agent_ids,
            is_bye: false,
            status: MatchStatus::Pending,
            winner_id: None,
            loser_id: None,
            results: BTreeMap::new(),
            competition_id: None,
            task_id: None,
            forfeit_reason: None,
        }
    }

    /// A bye: the single agent advances without playing.
    pub fn bye(match_number: usize, agent_id: impl Into<String>) -> Self {
        let agent_id = agent_id.into();
        let mut m = Self::new(match_number, vec![agent_id.clone()]);
        m.is_bye = true;
        m.status = MatchStatus::Bye;
        m.winner_id = Some(agent_id);
        m
    }

    /// Turn a match that ended up with a single agent into a bye.
    pub(crate) fn convert_to_bye(&mut self) {
        if let [agent_id] = self.agent_ids.as_slice() {
            self.is_bye = true;
            self.status = MatchStatus::Bye;
            self.winner_id = Some(agent_id.clone());
        }
    }

    pub fn involves(&self, agent_id: &str) -> bool {
        self.agent_ids.iter().any(|id| id == agent_id)
    }
}

/// A set of matches played concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentRound {
    pub id: Uuid,
    pub round_number: usize,
    pub name: String,
    pub status: RoundStatus,
    pub matches: Vec<TournamentMatch>,
    pub advancing_agent_ids: Vec<String>,
    pub eliminated_agent_ids: Vec<String>,
}

impl TournamentRound {
    pub fn new(round_number: usize, name: impl Into<String>, matches: Vec<TournamentMatch>) -> Self {
        Self {
            id: Uuid::new_v4(),
            round_number,
            name: name.into(),
            status: RoundStatus::Pending,
            matches,
            advancing_agent_ids: Vec::new(),
            eliminated_agent_ids: Vec::new(),
        }
    }

    /// Every agent id scheduled in this round, in match order.
    pub fn agent_ids(&self) -> Vec<&str> {
        self.matches
            .iter()
            .flat_map(|m| m.agent_ids.iter().map(String::as_str))
            .collect()
    }
}

/// Position of one single-elimination match in the bracket graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketNode {
    /// `r<round>-m<match>`.
    pub id: String,
    pub match_id: Uuid,
    pub round_number: usize,
    pub match_number: usize,
    pub agent_ids: Vec<String>,
    pub winner_id: Option<String>,
    /// Node the winner feeds into; `None` for the final.
    pub child_node: Option<String>,
}

/// Single-elimination bracket as an arena of nodes addressed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub nodes: Vec<BracketNode>,
}

impl Bracket {
    pub fn node_id(round_number: usize, match_number: usize) -> String {
        format!("r{round_number}-m{match_number}")
    }

    pub fn node(&self, id: &str) -> Option<&BracketNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut BracketNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }
}

/// Final position of an agent in a tournament.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentStanding {
    pub agent_id: String,
    pub agent_name: String,
    pub rank: usize,
    pub matches_won: u32,
    pub matches_lost: u32,
    pub matches_tied: u32,
    pub total_score: u64,
    /// Round in which the agent was knocked out; `None` if never eliminated.
    pub round_eliminated: Option<usize>,
}

/// A multi-round schedule of 1-vs-1 matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tournament {
    pub id: Uuid,
    pub name: String,
    pub bracket_type: BracketType,
    pub status: TournamentStatus,
    pub agents: Vec<AgentConfig>,
    pub seeds: Vec<TournamentSeed>,
    pub rounds: Vec<TournamentRound>,
    pub current_round_index: usize,
    /// Number of rounds the tournament will play; Swiss rounds are generated
    /// lazily so `rounds` can be shorter than this while running.
    pub total_rounds: usize,
    pub bracket: Option<Bracket>,
    pub final_standings: Vec<TournamentStanding>,
    pub task_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Tournament {
    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            TournamentStatus::Completed | TournamentStatus::Cancelled
        )
    }
}

/// Everything needed to create a tournament.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentConfig {
    pub name: String,
    pub bracket_type: BracketType,
    pub agents: Vec<AgentConfig>,
    pub task_ids: Vec<String>,
    /// Upper bound on Swiss rounds (default: 5).
    #[serde(default = "default_swiss_rounds")]
    pub swiss_rounds: usize,
}

fn default_swiss_rounds() -> usize {
    5
}

impl TournamentConfig {
    pub fn new(
        name: impl Into<String>,
        bracket_type: BracketType,
        agents: Vec<AgentConfig>,
        task_ids: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            bracket_type,
            agents,
            task_ids,
            swiss_rounds: default_swiss_rounds(),
        }
    }
}
