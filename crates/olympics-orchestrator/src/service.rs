use crate::context::ArenaContext;
use crate::events::EventBus;
use crate::tournament::TournamentController;
use crate::types::{Tournament, TournamentConfig};
use olympics_core::{OlympicsError, OlympicsResult, TaskRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Front door of the arena: owns every tournament controller by id.
pub struct ArenaService {
    ctx: ArenaContext,
    registry: Arc<dyn TaskRegistry>,
    tournaments: RwLock<HashMap<Uuid, Arc<TournamentController>>>,
    seed: Option<u64>,
}

impl ArenaService {
    pub fn new(ctx: ArenaContext, registry: Arc<dyn TaskRegistry>) -> Self {
        Self {
            ctx,
            registry,
            tournaments: RwLock::new(HashMap::new()),
            seed: None,
        }
    }

    /// Seed the random source of every tournament created from now on.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.ctx.events
    }

    pub async fn create_tournament(&self, config: TournamentConfig) -> OlympicsResult<Tournament> {
        let mut controller = TournamentController::new(self.ctx.clone(), self.registry.clone());
        if let Some(seed) = self.seed {
            controller = controller.with_seed(seed);
        }
        let tournament = controller.create_tournament(config).await?;
        self.tournaments
            .write()
            .await
            .insert(tournament.id, Arc::new(controller));
        Ok(tournament)
    }

    /// Run a tournament in the background.
    pub async fn start_tournament(
        &self,
        id: Uuid,
    ) -> OlympicsResult<JoinHandle<OlympicsResult<Tournament>>> {
        let controller = self.controller(id).await?;
        Ok(tokio::spawn(async move { controller.start_tournament().await }))
    }

    /// Run a tournament to the end and return its final state.
    pub async fn run_tournament(&self, id: Uuid) -> OlympicsResult<Tournament> {
        self.controller(id).await?.start_tournament().await
    }

    pub async fn get_tournament(&self, id: Uuid) -> Option<Tournament> {
        let controller = self.tournaments.read().await.get(&id).cloned()?;
        controller.tournament().await
    }

    pub async fn cancel_tournament(&self, id: Uuid) -> OlympicsResult<()> {
        self.controller(id).await?.cancel_tournament().await;
        Ok(())
    }

    /// Forget a tournament. Returns whether it was known.
    pub async fn remove_tournament(&self, id: Uuid) -> bool {
        self.tournaments.write().await.remove(&id).is_some()
    }

    /// Every known tournament, oldest first.
    pub async fn list_tournaments(&self) -> Vec<Tournament> {
        let controllers: Vec<Arc<TournamentController>> =
            self.tournaments.read().await.values().cloned().collect();
        let mut tournaments = Vec::with_capacity(controllers.len());
        for controller in controllers {
            if let Some(t) = controller.tournament().await {
                tournaments.push(t);
            }
        }
        tournaments.sort_by_key(|t| t.created_at);
        tournaments
    }

    /// Cancel every running tournament and stop all sandboxes.
    pub async fn shutdown(&self) {
        let controllers: Vec<Arc<TournamentController>> =
            self.tournaments.read().await.values().cloned().collect();
        for controller in controllers {
            controller.cancel_tournament().await;
        }
        if let Err(e) = self.ctx.sandboxes.cleanup().await {
            warn!(error = %e, "Sandbox cleanup failed");
        }
        info!("Arena shut down");
    }

    async fn controller(&self, id: Uuid) -> OlympicsResult<Arc<TournamentController>> {
        self.tournaments
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(OlympicsError::NoTournament)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{BracketType, TournamentStatus};
    use async_trait::async_trait;
    use olympics_agent::{AgentExecutor, ExecutorFactory, LocalSandboxManager, TurnResponse};
    use olympics_core::{
        AgentConfig, AgentProvider, InMemoryTaskRegistry, PageState, ScoringMethod,
        TaskDefinition, ToolCall,
    };
    use serde_json::json;

    struct DoneExecutor;

    #[async_trait]
    impl AgentExecutor for DoneExecutor {
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

    struct DoneFactory;

    impl ExecutorFactory for DoneFactory {
        fn create(
            &self,
            _agent: &AgentConfig,
            _task: &TaskDefinition,
        ) -> OlympicsResult<Box<dyn AgentExecutor>> {
            Ok(Box::new(DoneExecutor))
        }
    }

    fn service() -> (ArenaService, Arc<LocalSandboxManager>) {
        let sandboxes = Arc::new(LocalSandboxManager::default());
        let ctx = ArenaContext::new(sandboxes.clone(), Arc::new(DoneFactory)).with_config(
            crate::competition::CompetitionConfig {
                agent_stagger_ms: 0,
                max_turns: 3,
            },
        );
        let registry = InMemoryTaskRegistry::with_tasks([TaskDefinition::new(
            "form-blitz",
            "Form Blitz",
            ScoringMethod::Accuracy,
        )]);
        (ArenaService::new(ctx, Arc::new(registry)).with_seed(42), sandboxes)
    }

    fn config(n: usize) -> TournamentConfig {
        TournamentConfig::new(
            "Open",
            BracketType::SingleElimination,
            (1..=n)
                .map(|i| AgentConfig::new(format!("a{i}"), format!("A{i}"), AgentProvider::Gemini))
                .collect(),
            vec!["form-blitz".to_string()],
        )
    }

    #[tokio::test]
    async fn test_unknown_tournament() {
        let (svc, _) = service();
        let id = Uuid::new_v4();
        assert!(matches!(
            svc.run_tournament(id).await.unwrap_err(),
            OlympicsError::NoTournament
        ));
        assert!(matches!(
            svc.cancel_tournament(id).await.unwrap_err(),
            OlympicsError::NoTournament
        ));
        assert!(svc.start_tournament(id).await.is_err());
        assert!(svc.get_tournament(id).await.is_none());
        assert!(!svc.remove_tournament(id).await);
    }

    #[tokio::test]
    async fn test_background_run_completes() {
        let (svc, sandboxes) = service();
        let created = svc.create_tournament(config(4)).await.unwrap();
        let handle = svc.start_tournament(created.id).await.unwrap();
        let finished = handle.await.unwrap().unwrap();

        assert_eq!(finished.status, TournamentStatus::Completed);
        assert_eq!(finished.final_standings.len(), 4);
        assert_eq!(
            svc.get_tournament(created.id).await.unwrap().status,
            TournamentStatus::Completed
        );
        assert_eq!(sandboxes.running_count(), 0);
    }

    #[tokio::test]
    async fn test_list_and_remove() {
        let (svc, _) = service();
        let first = svc.create_tournament(config(2)).await.unwrap();
        let second = svc.create_tournament(config(3)).await.unwrap();

        let ids: Vec<Uuid> = svc.list_tournaments().await.iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id) && ids.contains(&second.id));

        assert!(svc.remove_tournament(first.id).await);
        assert_eq!(svc.list_tournaments().await.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending() {
        let (svc, _) = service();
        let created = svc.create_tournament(config(2)).await.unwrap();
        svc.shutdown().await;
        assert_eq!(
            svc.get_tournament(created.id).await.unwrap().status,
            TournamentStatus::Cancelled
        );
        svc.shutdown().await;
    }
}
