use crate::competition::CompetitionConfig;
use crate::events::EventBus;
use crate::scoring::{Judge, ScoringEngine};
use crate::snapshot::SnapshotStore;
use olympics_agent::{ExecutorFactory, SandboxManager};
use std::sync::Arc;

/// Collaborators shared by every controller of an arena.
///
/// Cloning is cheap; each match of a tournament gets its own competition
/// controller built from a clone of the tournament's context.
#[derive(Clone)]
pub struct ArenaContext {
    pub sandboxes: Arc<dyn SandboxManager>,
    pub executors: Arc<dyn ExecutorFactory>,
    pub scoring: ScoringEngine,
    pub events: EventBus,
    pub snapshots: Option<Arc<dyn SnapshotStore>>,
    pub config: CompetitionConfig,
}

impl ArenaContext {
    pub fn new(sandboxes: Arc<dyn SandboxManager>, executors: Arc<dyn ExecutorFactory>) -> Self {
        Self {
            sandboxes,
            executors,
            scoring: ScoringEngine::new(),
            events: EventBus::default(),
            snapshots: None,
            config: CompetitionConfig::default(),
        }
    }

    pub fn with_judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.scoring = ScoringEngine::with_judge(judge);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_snapshots(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn with_config(mut self, config: CompetitionConfig) -> Self {
        self.config = config;
        self
    }
}
