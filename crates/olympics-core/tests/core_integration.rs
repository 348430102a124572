#![allow(clippy::unwrap_used, clippy::expect_used)]

use olympics_core::*;
use serde_json::json;

// ---------------------------------------------------------------------------
// 1. Task catalogue loaded from JSON
// ---------------------------------------------------------------------------

#[test]
fn task_catalogue_from_json() {
    let raw = json!([
        {"id": "form-blitz", "name": "Form Blitz", "scoring_method": "time", "time_limit": 45},
        {"id": "essay", "name": "Essay", "scoring_method": "judged", "max_score": 500},
        {"id": "maze", "name": "Maze", "scoring_method": "speedrun"}
    ]);
    let tasks: Vec<TaskDefinition> = serde_json::from_value(raw).unwrap();
    let registry = InMemoryTaskRegistry::with_tasks(tasks);

    assert_eq!(registry.len(), 3);
    assert_eq!(registry.task_ids(), vec!["essay", "form-blitz", "maze"]);

    let blitz = registry.get_task_by_id("form-blitz").unwrap();
    assert_eq!(blitz.time_limit_ms(), 45_000);
    assert_eq!(blitz.max_score, 1000);

    let maze = registry.get_task_by_id("maze").unwrap();
    assert_eq!(maze.scoring_method, ScoringMethod::Unknown);
}

// ---------------------------------------------------------------------------
// 2. Resolution keeps the requested order
// ---------------------------------------------------------------------------

#[test]
fn resolve_keeps_requested_order() {
    let registry = InMemoryTaskRegistry::with_tasks([
        TaskDefinition::new("a", "A", ScoringMethod::Accuracy),
        TaskDefinition::new("b", "B", ScoringMethod::Accuracy),
    ]);
    let ids: Vec<String> = ["b", "ghost", "a"].iter().map(|s| s.to_string()).collect();
    let resolved: Vec<String> = registry.resolve(&ids).into_iter().map(|t| t.id).collect();
    assert_eq!(resolved, vec!["b", "a"]);

    registry.register(TaskDefinition::new("a", "A v2", ScoringMethod::Time));
    assert_eq!(registry.get_task_by_id("a").unwrap().name, "A v2");
    assert_eq!(registry.len(), 2);
}

// ---------------------------------------------------------------------------
// 3. Agent roster from JSON
// ---------------------------------------------------------------------------

#[test]
fn agent_roster_from_json() {
    let agents: Vec<AgentConfig> = serde_json::from_value(json!([
        {"id": "hook", "name": "Hook", "provider": "webhook",
         "webhook_url": "http://localhost:9000", "webhook_secret": "s"},
        {"id": "g", "name": "Gem", "provider": "gemini", "elo_rating": 1430.5}
    ]))
    .unwrap();
    assert_eq!(agents[0].provider, AgentProvider::Webhook);
    assert_eq!(agents[0].webhook_url.as_deref(), Some("http://localhost:9000"));
    assert_eq!(agents[1].provider.to_string(), "gemini");
    assert_eq!(agents[1].elo_rating, Some(1430.5));

    let err = serde_json::from_value::<AgentConfig>(json!({"id": "x", "name": "X", "provider": "mistral"}));
    assert!(err.is_err());
}
