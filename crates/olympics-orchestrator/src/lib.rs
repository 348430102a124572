//! Orchestration core of the AI Olympics arena.
//!
//! Runs agents against timed browser tasks and turns their results into
//! rankings:
//!
//! - [`CompetitionController`]: N agents against M tasks, with pause, resume,
//!   cancel and crash-recovery snapshots.
//! - [`TournamentController`]: single-elimination, round-robin or Swiss
//!   schedules of 1-vs-1 matches, each match a two-agent competition.
//! - [`ScoringEngine`]: deterministic task scoring with an optional external judge.
//! - [`EventBus`]: broadcast of lifecycle and leaderboard events.
//! - [`ArenaService`]: owns tournament controllers by id.

/// Seeding, schedule generation and standings.
pub mod bracket;
/// Competition lifecycle.
pub mod competition;
/// Shared collaborators.
pub mod context;
/// Lifecycle events and their broadcast bus.
pub mod events;
/// Task scoring.
pub mod scoring;
/// Tournament registry.
pub mod service;
/// Snapshot and event-log persistence.
pub mod snapshot;
/// Tournament lifecycle.
pub mod tournament;
/// Competition and tournament data model.
pub mod types;

pub use competition::{CompetitionConfig, CompetitionController};
pub use context::ArenaContext;
pub use events::{ArenaEvent, EventBus};
pub use scoring::{calculate_score, Judge, Judgement, ScoringEngine};
pub use service::ArenaService;
pub use snapshot::{FileSnapshotStore, SnapshotStore};
pub use tournament::TournamentController;
pub use types::{
    AgentResult, AgentResultStatus, Bracket, BracketNode, BracketType, Competition,
    CompetitionEvent, CompetitionStatus, EventStatus, LeaderboardEntry, MatchResult, MatchStatus,
    RoundStatus, Tournament, TournamentConfig, TournamentMatch, TournamentRound, TournamentSeed,
    TournamentStanding, TournamentStatus, DEFAULT_ELO_RATING,
};
