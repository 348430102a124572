//! Tournament controller.
//!
//! A tournament is a sequence of rounds; every match in a round is a fresh
//! two-agent [`CompetitionController`] run on one randomly picked task. Rounds
//! run strictly in order, matches within a round run concurrently.
//!
//! A match that errors still produces a winner, drawn at random, so the
//! bracket always advances. Such matches carry a `forfeit_reason`.

use crate::bracket::{
    build_seeds, calculate_round_robin_standings, calculate_single_elimination_standings,
    calculate_swiss_final_standings, generate_round_robin, generate_single_elimination,
    generate_swiss_first_round, generate_swiss_pairings, swiss_round_count,
};
use crate::competition::CompetitionController;
use crate::context::ArenaContext;
use crate::events::ArenaEvent;
use crate::types::{
    Bracket, BracketType, MatchResult, MatchStatus, RoundStatus, Tournament, TournamentConfig,
    TournamentMatch, TournamentStatus,
};
use chrono::Utc;
use futures_util::future::join_all;
use olympics_core::{AgentConfig, OlympicsError, OlympicsResult, TaskDefinition, TaskRegistry};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A match about to be played, detached from the tournament lock.
#[derive(Debug, Clone)]
struct PendingMatch {
    match_id: Uuid,
    match_number: usize,
    agent_ids: Vec<String>,
    agents: Vec<AgentConfig>,
}

#[derive(Debug, Clone)]
struct MatchOutcome {
    match_id: Uuid,
    results: BTreeMap<String, MatchResult>,
    winner_id: Option<String>,
    loser_id: Option<String>,
    competition_id: Option<Uuid>,
    task_id: Option<String>,
    forfeit_reason: Option<String>,
}

impl MatchOutcome {
    fn apply_to(self, m: &mut TournamentMatch) {
        m.results = self.results;
        m.winner_id = self.winner_id;
        m.loser_id = self.loser_id;
        m.competition_id = self.competition_id;
        m.task_id = self.task_id;
        m.forfeit_reason = self.forfeit_reason;
        m.status = MatchStatus::Completed;
    }
}

/// Drives one tournament from creation to final standings.
pub struct TournamentController {
    ctx: ArenaContext,
    registry: Arc<dyn TaskRegistry>,
    tournament: RwLock<Option<Tournament>>,
    tasks: parking_lot::RwLock<Vec<TaskDefinition>>,
    rng: Mutex<StdRng>,
}

impl TournamentController {
    pub fn new(ctx: ArenaContext, registry: Arc<dyn TaskRegistry>) -> Self {
        Self {
            ctx,
            registry,
            tournament: RwLock::new(None),
            tasks: parking_lot::RwLock::new(Vec::new()),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Make task picks, coin flips and forfeit draws reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    /// Validate the config, seed the agents and generate the schedule.
    pub async fn create_tournament(&self, config: TournamentConfig) -> OlympicsResult<Tournament> {
        if config.agents.len() < 2 {
            return Err(OlympicsError::Config(format!(
                "a tournament needs at least 2 agents, got {}",
                config.agents.len()
            )));
        }
        {
            let mut seen = HashSet::new();
            if let Some(dup) = config.agents.iter().find(|a| !seen.insert(a.id.as_str())) {
                return Err(OlympicsError::Config(format!(
                    "agent id '{}' appears more than once",
                    dup.id
                )));
            }
        }
        if config.bracket_type == BracketType::Swiss && config.swiss_rounds == 0 {
            return Err(OlympicsError::Config(
                "swiss_rounds must be at least 1".to_string(),
            ));
        }

        let tasks = self.registry.resolve(&config.task_ids);
        if tasks.is_empty() {
            return Err(OlympicsError::InvalidTask(format!(
                "none of the task ids {:?} are registered",
                config.task_ids
            )));
        }

        let seeds = build_seeds(&config.agents);
        let (rounds, bracket, total_rounds) = match config.bracket_type {
            BracketType::SingleElimination => {
                let schedule = generate_single_elimination(&seeds);
                let total = schedule.rounds.len();
                (schedule.rounds, Some(schedule.bracket), total)
            }
            BracketType::RoundRobin => {
                let rounds = generate_round_robin(&seeds);
                let total = rounds.len();
                (rounds, None, total)
            }
            BracketType::Swiss => (
                vec![generate_swiss_first_round(&seeds)],
                None,
                swiss_round_count(seeds.len(), config.swiss_rounds),
            ),
        };

        let tournament = Tournament {
            id: Uuid::new_v4(),
            name: config.name,
            bracket_type: config.bracket_type,
            status: TournamentStatus::Pending,
            agents: config.agents,
            seeds,
            rounds,
            current_round_index: 0,
            total_rounds,
            bracket,
            final_standings: Vec::new(),
            task_ids: tasks.iter().map(|t| t.id.clone()).collect(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        };

        info!(
            tournament_id = %tournament.id,
            name = %tournament.name,
            bracket_type = %tournament.bracket_type,
            agents = tournament.agents.len(),
            rounds = total_rounds,
            tasks = tasks.len(),
            "Tournament created"
        );
        *self.tasks.write() = tasks;
        *self.tournament.write().await = Some(tournament.clone());
        Ok(tournament)
    }

    /// Play every round and compute the final standings.
    pub async fn start_tournament(&self) -> OlympicsResult<Tournament> {
        let (tournament_id, name, bracket_type) = {
            let mut guard = self.tournament.write().await;
            let t = guard.as_mut().ok_or(OlympicsError::NoTournament)?;
            if t.status != TournamentStatus::Pending {
                return Err(OlympicsError::Config(format!(
                    "tournament {} has already been started",
                    t.id
                )));
            }
            t.status = TournamentStatus::Running;
            t.started_at = Some(Utc::now());
            (t.id, t.name.clone(), t.bracket_type)
        };

        info!(tournament_id = %tournament_id, "Tournament started");
        self.ctx.events.emit(ArenaEvent::TournamentStart {
            tournament_id,
            name,
            bracket_type,
        });

        match bracket_type {
            BracketType::SingleElimination => self.run_single_elimination().await?,
            BracketType::RoundRobin => self.run_round_robin().await?,
            BracketType::Swiss => self.run_swiss().await?,
        }

        let finished = {
            let mut guard = self.tournament.write().await;
            let t = guard.as_mut().ok_or(OlympicsError::NoTournament)?;
            t.final_standings = match t.bracket_type {
                BracketType::SingleElimination => {
                    calculate_single_elimination_standings(&t.agents, &t.rounds)
                }
                BracketType::RoundRobin => calculate_round_robin_standings(&t.agents, &t.rounds),
                BracketType::Swiss => calculate_swiss_final_standings(&t.agents, &t.rounds),
            };
            if t.status != TournamentStatus::Cancelled {
                t.status = TournamentStatus::Completed;
            }
            t.ended_at.get_or_insert_with(Utc::now);
            t.clone()
        };

        info!(
            tournament_id = %tournament_id,
            status = ?finished.status,
            champion = finished.final_standings.first().map(|s| s.agent_id.as_str()).unwrap_or("-"),
            "Tournament finished"
        );
        self.ctx.events.emit(ArenaEvent::TournamentEnd {
            tournament_id,
            status: finished.status,
            standings: finished.final_standings.clone(),
        });
        Ok(finished)
    }

    /// Stop scheduling new rounds. Matches already running finish normally.
    pub async fn cancel_tournament(&self) {
        let mut guard = self.tournament.write().await;
        if let Some(t) = guard.as_mut() {
            if !t.is_finished() {
                t.status = TournamentStatus::Cancelled;
                t.ended_at = Some(Utc::now());
                info!(tournament_id = %t.id, "Tournament cancelled");
            }
        }
    }

    pub async fn tournament(&self) -> Option<Tournament> {
        self.tournament.read().await.clone()
    }

    // --- drivers ---

    async fn run_single_elimination(&self) -> OlympicsResult<()> {
        let total = self.total_rounds().await?;
        for index in 0..total {
            if self.is_cancelled().await {
                break;
            }
            self.run_round(index).await?;
            self.advance_winners(index).await?;
        }
        Ok(())
    }

    async fn run_round_robin(&self) -> OlympicsResult<()> {
        let total = self.total_rounds().await?;
        for index in 0..total {
            if self.is_cancelled().await {
                break;
            }
            self.run_round(index).await?;
        }
        Ok(())
    }

    /// Swiss rounds are paired lazily from the results so far.
    async fn run_swiss(&self) -> OlympicsResult<()> {
        let total = self.total_rounds().await?;
        for index in 0..total {
            if self.is_cancelled().await {
                break;
            }
            if index > 0 {
                let mut guard = self.tournament.write().await;
                let t = guard.as_mut().ok_or(OlympicsError::NoTournament)?;
                if t.rounds.len() <= index {
                    let round = generate_swiss_pairings(index + 1, &t.seeds, &t.rounds);
                    t.rounds.push(round);
                }
            }
            self.run_round(index).await?;
        }
        Ok(())
    }

    async fn total_rounds(&self) -> OlympicsResult<usize> {
        self.tournament
            .read()
            .await
            .as_ref()
            .map(|t| t.total_rounds)
            .ok_or(OlympicsError::NoTournament)
    }

    async fn is_cancelled(&self) -> bool {
        self.tournament
            .read()
            .await
            .as_ref()
            .map_or(true, |t| t.status == TournamentStatus::Cancelled)
    }

    // --- rounds ---

    async fn run_round(&self, index: usize) -> OlympicsResult<()> {
        let (tournament_id, round_number, name, pending) = {
            let mut guard = self.tournament.write().await;
            let t = guard.as_mut().ok_or(OlympicsError::NoTournament)?;
            t.current_round_index = index;
            let tournament_id = t.id;
            let agents = &t.agents;
            let round = t.rounds.get_mut(index).ok_or_else(|| {
                OlympicsError::Config(format!("tournament {tournament_id} has no round {index}"))
            })?;
            round.status = RoundStatus::Running;

            let mut pending = Vec::new();
            for m in &mut round.matches {
                if m.status != MatchStatus::Pending {
                    continue;
                }
                match m.agent_ids.len() {
                    2 => {
                        m.status = MatchStatus::Running;
                        pending.push(PendingMatch {
                            match_id: m.id,
                            match_number: m.match_number,
                            agent_ids: m.agent_ids.clone(),
                            agents: m
                                .agent_ids
                                .iter()
                                .filter_map(|id| agents.iter().find(|a| &a.id == id).cloned())
                                .collect(),
                        });
                    }
                    1 => m.convert_to_bye(),
                    _ => {
                        warn!(tournament_id = %tournament_id, match_id = %m.id, "Match has no agents, skipping");
                        m.status = MatchStatus::Completed;
                    }
                }
            }
            (tournament_id, round.round_number, round.name.clone(), pending)
        };

        info!(tournament_id = %tournament_id, round_number, matches = pending.len(), "Round started");
        self.ctx.events.emit(ArenaEvent::RoundStart {
            tournament_id,
            round_number,
            name,
        });

        let outcomes = join_all(
            pending
                .iter()
                .map(|p| self.run_match(tournament_id, round_number, p)),
        )
        .await;

        let match_ends: Vec<ArenaEvent> = outcomes
            .iter()
            .map(|o| ArenaEvent::MatchEnd {
                tournament_id,
                round_number,
                match_id: o.match_id,
                winner_id: o.winner_id.clone(),
                forfeited: o.forfeit_reason.is_some(),
            })
            .collect();

        let (advancing, eliminated) = {
            let mut guard = self.tournament.write().await;
            let t = guard.as_mut().ok_or(OlympicsError::NoTournament)?;
            let round = t.rounds.get_mut(index).ok_or_else(|| {
                OlympicsError::Config(format!("tournament {tournament_id} has no round {index}"))
            })?;
            for outcome in outcomes {
                if let Some(m) = round.matches.iter_mut().find(|m| m.id == outcome.match_id) {
                    outcome.apply_to(m);
                }
            }
            round.advancing_agent_ids = round
                .matches
                .iter()
                .filter_map(|m| m.winner_id.clone())
                .collect();
            round.eliminated_agent_ids = round
                .matches
                .iter()
                .filter_map(|m| m.loser_id.clone())
                .collect();
            round.status = RoundStatus::Completed;
            (
                round.advancing_agent_ids.clone(),
                round.eliminated_agent_ids.clone(),
            )
        };

        for event in match_ends {
            self.ctx.events.emit(event);
        }
        info!(tournament_id = %tournament_id, round_number, advancing = advancing.len(), "Round finished");
        self.ctx.events.emit(ArenaEvent::RoundEnd {
            tournament_id,
            round_number,
            advancing,
            eliminated,
        });
        Ok(())
    }

    /// Write round winners into the bracket and into the next round, in match
    /// order: the winners of matches 2k-1 and 2k meet in match k.
    async fn advance_winners(&self, index: usize) -> OlympicsResult<()> {
        let (tournament_id, bracket) = {
            let mut guard = self.tournament.write().await;
            let t = guard.as_mut().ok_or(OlympicsError::NoTournament)?;
            let Some(round) = t.rounds.get(index) else {
                return Ok(());
            };
            let round_number = round.round_number;
            let winners: Vec<(usize, Option<String>)> = round
                .matches
                .iter()
                .map(|m| (m.match_number, m.winner_id.clone()))
                .collect();

            if let Some(bracket) = t.bracket.as_mut() {
                for (match_number, winner) in &winners {
                    if let Some(node) = bracket.node_mut(&Bracket::node_id(round_number, *match_number)) {
                        node.winner_id = winner.clone();
                    }
                }
            }

            if let Some(next) = t.rounds.get_mut(index + 1) {
                for (position, (_, winner)) in winners.iter().enumerate() {
                    let Some(winner) = winner else {
                        continue;
                    };
                    if let Some(m) = next.matches.get_mut(position / 2) {
                        m.agent_ids.push(winner.clone());
                    }
                }
                if let Some(bracket) = t.bracket.as_mut() {
                    for m in &next.matches {
                        if let Some(node) =
                            bracket.node_mut(&Bracket::node_id(next.round_number, m.match_number))
                        {
                            node.agent_ids = m.agent_ids.clone();
                        }
                    }
                }
            }
            (t.id, t.bracket.clone())
        };

        if let Some(bracket) = bracket {
            self.ctx.events.emit(ArenaEvent::BracketUpdate {
                tournament_id,
                bracket,
            });
        }
        Ok(())
    }

    // --- matches ---

    async fn run_match(
        &self,
        tournament_id: Uuid,
        round_number: usize,
        pending: &PendingMatch,
    ) -> MatchOutcome {
        let played = match self.pick_task() {
            Some(task) => self.play_match(pending, task).await,
            None => Err(OlympicsError::InvalidTask("task pool is empty".to_string())),
        };
        match played {
            Ok(outcome) => {
                info!(
                    tournament_id = %tournament_id,
                    round_number,
                    match_id = %pending.match_id,
                    winner_id = outcome.winner_id.as_deref().unwrap_or("-"),
                    "Match finished"
                );
                outcome
            }
            Err(e) => {
                error!(
                    tournament_id = %tournament_id,
                    round_number,
                    match_id = %pending.match_id,
                    error = %e,
                    "Match failed, drawing a random winner"
                );
                self.forfeit(pending, e.to_string())
            }
        }
    }

    async fn play_match(
        &self,
        pending: &PendingMatch,
        task: TaskDefinition,
    ) -> OlympicsResult<MatchOutcome> {
        let [first, second] = pending.agents.as_slice() else {
            return Err(OlympicsError::Config(format!(
                "match {} needs two known agents, found {}",
                pending.match_id,
                pending.agents.len()
            )));
        };

        let controller = CompetitionController::new(self.ctx.clone());
        let played = async {
            controller
                .create_competition(
                    format!("Match {}", pending.match_number),
                    format!("{} vs {}", first.name, second.name),
                    pending.agents.clone(),
                    vec![task.clone()],
                )
                .await?;
            controller.start_competition().await?;
            controller
                .competition()
                .await
                .ok_or(OlympicsError::NoCompetition)
        }
        .await;
        controller.cleanup().await;
        let competition = played?;

        let tasks_played = competition.events.len() as u32;
        let results: BTreeMap<String, MatchResult> = competition
            .leaderboard
            .iter()
            .map(|entry| {
                (
                    entry.agent_id.clone(),
                    MatchResult {
                        score: entry.total_score,
                        tasks_won: entry.events_won,
                        tasks_played,
                    },
                )
            })
            .collect();

        let score = |id: &str| results.get(id).map_or(0, |r| r.score);
        let first_wins = match score(first.id.as_str()).cmp(&score(second.id.as_str())) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.rng.lock().gen_bool(0.5),
        };
        let (winner, loser) = if first_wins {
            (first, second)
        } else {
            (second, first)
        };

        Ok(MatchOutcome {
            match_id: pending.match_id,
            results,
            winner_id: Some(winner.id.clone()),
            loser_id: Some(loser.id.clone()),
            competition_id: Some(competition.id),
            task_id: Some(task.id),
            forfeit_reason: None,
        })
    }

    fn forfeit(&self, pending: &PendingMatch, reason: String) -> MatchOutcome {
        let ids = &pending.agent_ids;
        let (winner_id, loser_id) = match ids.len() {
            0 => (None, None),
            1 => (Some(ids[0].clone()), None),
            _ => {
                let w = usize::from(self.rng.lock().gen_bool(0.5));
                (Some(ids[w].clone()), Some(ids[1 - w].clone()))
            }
        };
        MatchOutcome {
            match_id: pending.match_id,
            results: BTreeMap::new(),
            winner_id,
            loser_id,
            competition_id: None,
            task_id: None,
            forfeit_reason: Some(reason),
        }
    }

    fn pick_task(&self) -> Option<TaskDefinition> {
        let tasks = self.tasks.read();
        let mut rng = self.rng.lock();
        tasks.choose(&mut *rng).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::competition::CompetitionConfig;
    use async_trait::async_trait;
    use olympics_agent::{AgentExecutor, ExecutorFactory, LocalSandboxManager, TurnResponse};
    use olympics_core::{AgentProvider, InMemoryTaskRegistry, PageState, ScoringMethod, ToolCall};
    use serde_json::json;

    /// Finishes immediately; scores come from the accuracy task, so every
    /// match is a tie settled by a coin flip.
    struct InstantExecutor;

    #[async_trait]
    impl AgentExecutor for InstantExecutor {
        async fn initialize(&mut self, _system: &str, _task: &str) -> OlympicsResult<()> {
            Ok(())
        }

        async fn process_turn(&mut self, _page: &PageState) -> OlympicsResult<TurnResponse> {
            Ok(TurnResponse {
                tool_calls: vec![ToolCall::new("done", json!({"success": true}))],
                done: true,
                ..Default::default()
            })
        }

        async fn cleanup(&mut self) -> OlympicsResult<()> {
            Ok(())
        }
    }

    struct InstantFactory;

    impl ExecutorFactory for InstantFactory {
        fn create(
            &self,
            _agent: &AgentConfig,
            _task: &TaskDefinition,
        ) -> OlympicsResult<Box<dyn AgentExecutor>> {
            Ok(Box::new(InstantExecutor))
        }
    }

    /// Takes one slow turn before finishing.
    struct SlowFactory(u64);

    struct SlowExecutor(u64);

    #[async_trait]
    impl AgentExecutor for SlowExecutor {
        async fn initialize(&mut self, _system: &str, _task: &str) -> OlympicsResult<()> {
            Ok(())
        }

        async fn process_turn(&mut self, page: &PageState) -> OlympicsResult<TurnResponse> {
            tokio::time::sleep(std::time::Duration::from_millis(self.0)).await;
            InstantExecutor.process_turn(page).await
        }

        async fn cleanup(&mut self) -> OlympicsResult<()> {
            Ok(())
        }
    }

    impl ExecutorFactory for SlowFactory {
        fn create(
            &self,
            _agent: &AgentConfig,
            _task: &TaskDefinition,
        ) -> OlympicsResult<Box<dyn AgentExecutor>> {
            Ok(Box::new(SlowExecutor(self.0)))
        }
    }

    fn controller() -> TournamentController {
        let ctx = ArenaContext::new(Arc::new(LocalSandboxManager::default()), Arc::new(InstantFactory))
            .with_config(CompetitionConfig {
                agent_stagger_ms: 0,
                max_turns: 5,
            });
        let registry = InMemoryTaskRegistry::with_tasks([
            TaskDefinition::new("form-blitz", "Form Blitz", ScoringMethod::Accuracy),
            TaskDefinition::new("shopping-cart", "Shopping Cart", ScoringMethod::Accuracy),
        ]);
        TournamentController::new(ctx, Arc::new(registry)).with_seed(7)
    }

    fn agents(n: usize) -> Vec<AgentConfig> {
        (1..=n)
            .map(|i| AgentConfig::new(format!("a{i}"), format!("Agent {i}"), AgentProvider::Claude))
            .collect()
    }

    fn config(bracket_type: BracketType, n: usize) -> TournamentConfig {
        TournamentConfig::new(
            "Cup",
            bracket_type,
            agents(n),
            vec!["form-blitz".to_string(), "shopping-cart".to_string()],
        )
    }

    #[tokio::test]
    async fn test_create_validates_config() {
        let c = controller();
        let err = c
            .create_tournament(config(BracketType::RoundRobin, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, OlympicsError::Config(_)));

        let mut unknown = config(BracketType::RoundRobin, 2);
        unknown.task_ids = vec!["nope".to_string()];
        let err = c.create_tournament(unknown).await.unwrap_err();
        assert!(matches!(err, OlympicsError::InvalidTask(_)));

        let mut dup = config(BracketType::RoundRobin, 2);
        dup.agents[1].id = "a1".to_string();
        assert!(c.create_tournament(dup).await.is_err());
        assert!(c.tournament().await.is_none());
    }

    #[tokio::test]
    async fn test_start_without_tournament() {
        let err = controller().start_tournament().await.unwrap_err();
        assert!(matches!(err, OlympicsError::NoTournament));
    }

    #[tokio::test]
    async fn test_unknown_task_ids_are_dropped() {
        let c = controller();
        let mut cfg = config(BracketType::SingleElimination, 2);
        cfg.task_ids.push("missing".to_string());
        let t = c.create_tournament(cfg).await.unwrap();
        assert_eq!(t.task_ids, vec!["form-blitz", "shopping-cart"]);
        assert_eq!(t.status, TournamentStatus::Pending);
        assert_eq!(t.seeds[0].elo_rating, 1200.0);
    }

    #[tokio::test]
    async fn test_round_robin_plays_every_match() {
        let c = controller();
        c.create_tournament(config(BracketType::RoundRobin, 5))
            .await
            .unwrap();
        let t = c.start_tournament().await.unwrap();

        assert_eq!(t.status, TournamentStatus::Completed);
        assert_eq!(t.rounds.len(), 5);
        for round in &t.rounds {
            assert_eq!(round.status, RoundStatus::Completed);
            for m in &round.matches {
                if m.is_bye {
                    assert_eq!(m.status, MatchStatus::Bye);
                    continue;
                }
                assert_eq!(m.status, MatchStatus::Completed);
                assert!(m.winner_id.is_some() && m.loser_id.is_some());
                assert_ne!(m.winner_id, m.loser_id);
                assert!(m.forfeit_reason.is_none());
                assert!(m.task_id.is_some());
                assert_eq!(m.results.len(), 2);
            }
        }
        let total_wins: u32 = t.final_standings.iter().map(|s| s.matches_won).sum();
        assert_eq!(total_wins, 10);
        assert_eq!(t.final_standings.len(), 5);
    }

    #[tokio::test]
    async fn test_swiss_generates_rounds_lazily() {
        let c = controller();
        let created = c
            .create_tournament(config(BracketType::Swiss, 6))
            .await
            .unwrap();
        assert_eq!(created.rounds.len(), 1);
        assert_eq!(created.total_rounds, 4);

        let t = c.start_tournament().await.unwrap();
        assert_eq!(t.rounds.len(), 4);
        for round in &t.rounds {
            let mut ids = round.agent_ids();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), 6);
        }
        let total_wins: u32 = t.final_standings.iter().map(|s| s.matches_won).sum();
        assert_eq!(total_wins, 12);
    }

    #[tokio::test]
    async fn test_single_elimination_with_byes() {
        let c = controller();
        c.create_tournament(config(BracketType::SingleElimination, 5))
            .await
            .unwrap();
        let t = c.start_tournament().await.unwrap();

        assert_eq!(t.rounds.len(), 3);
        assert_eq!(t.rounds[0].advancing_agent_ids.len(), 4);
        assert_eq!(t.rounds[1].matches.iter().map(|m| m.agent_ids.len()).sum::<usize>(), 4);
        assert_eq!(t.rounds[2].matches[0].agent_ids.len(), 2);

        let champion = &t.final_standings[0];
        assert!(champion.round_eliminated.is_none());
        assert_eq!(
            t.rounds[2].matches[0].winner_id.as_deref(),
            Some(champion.agent_id.as_str())
        );
        let bracket = t.bracket.unwrap();
        assert_eq!(
            bracket.node("r3-m1").unwrap().winner_id.as_deref(),
            Some(champion.agent_id.as_str())
        );
    }

    #[tokio::test]
    async fn test_match_error_forfeits_to_random_winner() {
        let c = controller();
        c.create_tournament(config(BracketType::RoundRobin, 2))
            .await
            .unwrap();
        let pending = PendingMatch {
            match_id: Uuid::new_v4(),
            match_number: 1,
            agent_ids: vec!["a1".to_string(), "ghost".to_string()],
            agents: agents(1),
        };
        let outcome = c.run_match(Uuid::new_v4(), 1, &pending).await;
        assert!(outcome.forfeit_reason.unwrap().contains("two known agents"));
        let winner = outcome.winner_id.unwrap();
        let loser = outcome.loser_id.unwrap();
        assert_ne!(winner, loser);
        assert!(pending.agent_ids.contains(&winner));
        assert!(outcome.competition_id.is_none());
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let c = controller();
        c.create_tournament(config(BracketType::RoundRobin, 4))
            .await
            .unwrap();
        c.cancel_tournament().await;
        assert_eq!(c.tournament().await.unwrap().status, TournamentStatus::Cancelled);
        assert!(c.start_tournament().await.is_err());

        // no tournament at all is fine too
        controller().cancel_tournament().await;
    }

    #[tokio::test]
    async fn test_cancel_while_running_finishes_current_round() {
        let ctx = ArenaContext::new(Arc::new(LocalSandboxManager::default()), Arc::new(SlowFactory(300)))
            .with_config(CompetitionConfig {
                agent_stagger_ms: 0,
                max_turns: 5,
            });
        let mut rx = ctx.events.subscribe();
        let registry = InMemoryTaskRegistry::with_tasks([TaskDefinition::new(
            "form-blitz",
            "Form Blitz",
            ScoringMethod::Accuracy,
        )]);
        let c = Arc::new(TournamentController::new(ctx, Arc::new(registry)).with_seed(7));
        let mut cfg = config(BracketType::SingleElimination, 4);
        cfg.task_ids = vec!["form-blitz".to_string()];
        c.create_tournament(cfg).await.unwrap();

        let handle = {
            let c = c.clone();
            tokio::spawn(async move { c.start_tournament().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        c.cancel_tournament().await;
        let t = handle.await.unwrap().unwrap();

        assert_eq!(t.status, TournamentStatus::Cancelled);
        assert!(t.ended_at.is_some());
        assert_eq!(t.rounds[0].status, RoundStatus::Completed);
        assert!(t.rounds[0]
            .matches
            .iter()
            .all(|m| m.status == MatchStatus::Completed && m.winner_id.is_some()));
        assert_eq!(t.rounds[1].status, RoundStatus::Pending);
        assert!(t.rounds[1]
            .matches
            .iter()
            .all(|m| m.status == MatchStatus::Pending && m.results.is_empty()));
        assert_eq!(t.final_standings.len(), 4);

        let mut round_starts = 0;
        let mut end_status = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                ArenaEvent::RoundStart { .. } => round_starts += 1,
                ArenaEvent::TournamentEnd { status, .. } => end_status = Some(status),
                _ => {}
            }
        }
        assert_eq!(round_starts, 1);
        assert_eq!(end_status, Some(TournamentStatus::Cancelled));
    }
}
