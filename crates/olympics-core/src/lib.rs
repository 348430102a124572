//! Core types and error definitions for the AI Olympics arena.
//!
//! This crate provides the foundational types shared across all Olympics crates,
//! including error handling, agent and task descriptions, and the read-only task
//! registry consulted when a tournament is created.
//!
//! # Main types
//!
//! - [`OlympicsError`]: Unified error enum for all Olympics subsystems.
//! - [`OlympicsResult`]: Convenience alias for `Result<T, OlympicsError>`.
//! - [`AgentConfig`]: Identity and transport settings for one competing agent.
//! - [`TaskDefinition`]: Static description of a timed browser task.
//! - [`AgentRunResult`]: What an agent produced while attempting a task.
//! - [`TaskRegistry`]: Lookup of task definitions by id.

/// Task definition lookup.
pub mod registry;
/// Agent, task, and run-result types.
pub mod types;

pub use registry::{InMemoryTaskRegistry, TaskRegistry};
pub use types::{
    AgentAction, AgentConfig, AgentProvider, AgentRunResult, PageState, ScoringMethod,
    TaskDefinition, TokenUsage, ToolCall,
};

// --- Error types ---

/// Top-level error type for the Olympics arena.
///
/// Each variant corresponds to a failure class the orchestration core
/// distinguishes: configuration mistakes are returned before any work starts,
/// everything else is caught and degraded by the controllers.
#[derive(Debug, thiserror::Error)]
pub enum OlympicsError {
    /// `start_competition` was called before `create_competition`.
    #[error("No competition has been created")]
    NoCompetition,

    /// `start_tournament` was called before `create_tournament`.
    #[error("No tournament has been created")]
    NoTournament,

    /// None of the requested task ids resolved against the task registry.
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error raised by an agent executor or the runner driving it.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error from an outbound HTTP request (e.g. webhook agent call).
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error from the sandbox manager.
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// An error from the external judging service.
    #[error("Judge error: {0}")]
    Judge(String),

    /// An error persisting snapshots or event logs.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`OlympicsError`].
pub type OlympicsResult<T> = Result<T, OlympicsError>;
