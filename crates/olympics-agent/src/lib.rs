//! Agent execution layer for the AI Olympics arena.
//!
//! Everything the orchestration core needs to drive an agent through a task
//! without knowing what the agent is:
//!
//! - [`AgentExecutor`]: the turn-based contract (`initialize`, `process_turn`, `cleanup`).
//! - [`ExecutorFactory`]: picks an executor implementation per agent at construction time.
//! - [`WebhookExecutor`]: calls an agent-controlled HTTP endpoint with signed payloads.
//! - [`SandboxManager`]: opaque browser-environment lifecycle, with [`LocalSandboxManager`].
//! - [`AgentRunner`]: the turn loop enforcing the turn and time budget.

pub mod executor;
pub mod runner;
pub mod sandbox;
pub mod webhook;

pub use executor::{AgentExecutor, DefaultExecutorFactory, ExecutorFactory, TurnResponse};
pub use runner::{AgentRunner, RunControl, RunnerConfig};
pub use sandbox::{
    ActionOutcome, LocalSandboxConfig, LocalSandboxManager, SandboxInfo, SandboxManager,
    SandboxStatus,
};
pub use webhook::{WebhookConfig, WebhookExecutor};
