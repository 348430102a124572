use olympics_agent::{LocalSandboxConfig, WebhookConfig};
use olympics_core::{AgentConfig, TaskDefinition};
use olympics_orchestrator::{BracketType, CompetitionConfig, TournamentConfig};
use serde::Deserialize;
use std::path::PathBuf;

/// Contents of an arena TOML file.
#[derive(Debug, Deserialize)]
pub struct ArenaConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Fixed seed for reproducible task picks and coin flips.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub tournament: TournamentSection,
    #[serde(default)]
    pub competition: CompetitionConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub sandbox: LocalSandboxConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
}

#[derive(Debug, Deserialize)]
pub struct TournamentSection {
    #[serde(default = "default_tournament_name")]
    pub name: String,
    #[serde(default = "default_bracket_type")]
    pub bracket_type: BracketType,
    #[serde(default = "default_swiss_rounds")]
    pub swiss_rounds: usize,
    /// Tasks to draw matches from; empty means every configured task.
    #[serde(default)]
    pub task_ids: Vec<String>,
}

impl Default for TournamentSection {
    fn default() -> Self {
        Self {
            name: default_tournament_name(),
            bracket_type: default_bracket_type(),
            swiss_rounds: default_swiss_rounds(),
            task_ids: Vec::new(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_tournament_name() -> String {
    "AI Olympics".to_string()
}
fn default_bracket_type() -> BracketType {
    BracketType::SingleElimination
}
fn default_swiss_rounds() -> usize {
    5
}

impl ArenaConfig {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn tournament_config(&self) -> TournamentConfig {
        let task_ids = if self.tournament.task_ids.is_empty() {
            self.tasks.iter().map(|t| t.id.clone()).collect()
        } else {
            self.tournament.task_ids.clone()
        };
        let mut config = TournamentConfig::new(
            self.tournament.name.clone(),
            self.tournament.bracket_type,
            self.agents.clone(),
            task_ids,
        );
        config.swiss_rounds = self.tournament.swiss_rounds;
        config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use olympics_core::{AgentProvider, ScoringMethod};

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ArenaConfig::parse("").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.tournament.bracket_type, BracketType::SingleElimination);
        assert_eq!(config.competition.agent_stagger_ms, 500);
        assert_eq!(config.webhook.timeout_secs, 30);
        assert!(config.agents.is_empty());
    }

    #[test]
    fn test_full_config() {
        let text = r#"
            data_dir = "/tmp/arena"
            seed = 9

            [tournament]
            name = "Spring Cup"
            bracket_type = "swiss"
            swiss_rounds = 3

            [competition]
            agent_stagger_ms = 0

            [[agents]]
            id = "scout"
            name = "Scout"
            provider = "webhook"
            webhook_url = "http://localhost:9000/turn"
            webhook_secret = "s3cret"

            [[agents]]
            id = "claude"
            name = "Claude"
            provider = "claude"
            elo_rating = 1500.0

            [[tasks]]
            id = "form-blitz"
            name = "Form Blitz"
            scoring_method = "time"
            time_limit = 60

            [[tasks]]
            id = "essay"
            name = "Essay"
            scoring_method = "judged"
        "#;
        let config = ArenaConfig::parse(text).unwrap();
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[0].provider, AgentProvider::Webhook);
        assert_eq!(config.agents[1].elo_rating, Some(1500.0));
        assert_eq!(config.tasks[0].scoring_method, ScoringMethod::Time);
        assert_eq!(config.tasks[1].max_score, 1000);

        let tournament = config.tournament_config();
        assert_eq!(tournament.name, "Spring Cup");
        assert_eq!(tournament.bracket_type, BracketType::Swiss);
        assert_eq!(tournament.swiss_rounds, 3);
        assert_eq!(tournament.task_ids, vec!["form-blitz", "essay"]);
    }

    #[test]
    fn test_unknown_bracket_type_is_rejected() {
        let err = ArenaConfig::parse("[tournament]\nbracket_type = \"ladder\"\n");
        assert!(err.is_err());
    }
}
