//! Turning run results into points.
//!
//! [`calculate_score`] is the pure policy for every scoring method except
//! judged tasks, which need the external [`Judge`] and therefore go through
//! [`ScoringEngine::score`].

use async_trait::async_trait;
use olympics_core::{AgentProvider, AgentRunResult, OlympicsResult, ScoringMethod, TaskDefinition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Points awarded for finishing at the time limit, out of 1000.
const TIME_FLOOR: f64 = 100.0;
/// Points earned by speed, out of 1000.
const TIME_SPEED_RANGE: f64 = 900.0;
const COMPOSITE_COMPLETION_WEIGHT: f64 = 0.6;
const COMPOSITE_SPEED_WEIGHT: f64 = 0.4;

/// Verdict returned by the judging service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgement {
    pub score: f64,
    #[serde(default)]
    pub breakdown: serde_json::Value,
}

/// External evaluator for judged tasks.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge_submission(
        &self,
        task_id: &str,
        payload: &serde_json::Value,
        provider_id: &str,
    ) -> OlympicsResult<Judgement>;
}

/// Fraction of the time budget left unused, in `[0, 1]`.
///
/// A missing or zero completion time counts as using the whole budget.
pub fn time_ratio(task: &TaskDefinition, result: &AgentRunResult) -> f64 {
    let limit_ms = task.time_limit_ms() as f64;
    if limit_ms <= 0.0 {
        return 0.0;
    }
    let taken_ms = match result.completion_time_ms {
        Some(ms) if ms > 0 => ms as f64,
        _ => limit_ms,
    };
    (1.0 - taken_ms / limit_ms).clamp(0.0, 1.0)
}

/// Score a run under the task's scoring method.
///
/// Judged tasks are scored like accuracy here; use [`ScoringEngine::score`]
/// to consult the judge. The result is always within `0..=task.max_score`.
pub fn calculate_score(task: &TaskDefinition, result: &AgentRunResult) -> u32 {
    if !result.success {
        return 0;
    }
    let max = f64::from(task.max_score);
    let raw = match task.scoring_method {
        ScoringMethod::Time => {
            let ratio = time_ratio(task, result);
            (TIME_FLOOR + TIME_SPEED_RANGE * ratio) * max / 1000.0
        }
        ScoringMethod::Composite => {
            let ratio = time_ratio(task, result);
            max * COMPOSITE_COMPLETION_WEIGHT + max * COMPOSITE_SPEED_WEIGHT * ratio
        }
        ScoringMethod::Accuracy | ScoringMethod::Judged | ScoringMethod::Unknown => max,
    };
    clamp_score(raw, task.max_score)
}

fn clamp_score(raw: f64, max_score: u32) -> u32 {
    if !raw.is_finite() {
        return 0;
    }
    raw.round().clamp(0.0, f64::from(max_score)) as u32
}

/// Scores runs, consulting the judge for judged tasks when one is configured.
#[derive(Clone, Default)]
pub struct ScoringEngine {
    judge: Option<Arc<dyn Judge>>,
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_judge(judge: Arc<dyn Judge>) -> Self {
        Self { judge: Some(judge) }
    }

    pub fn has_judge(&self) -> bool {
        self.judge.is_some()
    }

    pub async fn score(
        &self,
        task: &TaskDefinition,
        result: &AgentRunResult,
        provider: AgentProvider,
    ) -> u32 {
        if !result.success || task.scoring_method != ScoringMethod::Judged {
            return calculate_score(task, result);
        }
        let Some(judge) = &self.judge else {
            debug!(task_id = %task.id, "No judge configured, using default scoring");
            return calculate_score(task, result);
        };

        let payload = result
            .final_result
            .clone()
            .unwrap_or(serde_json::Value::Null);
        match judge
            .judge_submission(&task.id, &payload, provider.as_str())
            .await
        {
            Ok(judgement) if judgement.score.is_finite() => {
                clamp_score(judgement.score, task.max_score)
            }
            Ok(judgement) => {
                warn!(task_id = %task.id, score = judgement.score, "Judge returned a non-finite score, using default scoring");
                calculate_score(task, result)
            }
            Err(e) => {
                warn!(task_id = %task.id, agent_id = %result.agent_id, error = %e, "Judging failed, using default scoring");
                calculate_score(task, result)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use olympics_core::OlympicsError;
    use serde_json::json;

    fn task(method: ScoringMethod) -> TaskDefinition {
        TaskDefinition::new("t", "Task", method).with_time_limit(60)
    }

    fn success(ms: u64) -> AgentRunResult {
        AgentRunResult::succeeded("a", "t", ms)
    }

    #[test]
    fn test_time_score_at_limit_is_floor() {
        assert_eq!(calculate_score(&task(ScoringMethod::Time), &success(60_000)), 100);
        let scaled = task(ScoringMethod::Time).with_max_score(500);
        assert_eq!(calculate_score(&scaled, &success(60_000)), 50);
    }

    #[test]
    fn test_time_score_near_instant_is_max() {
        assert_eq!(calculate_score(&task(ScoringMethod::Time), &success(1)), 1000);
    }

    #[test]
    fn test_time_score_halfway() {
        assert_eq!(calculate_score(&task(ScoringMethod::Time), &success(30_000)), 550);
    }

    #[test]
    fn test_time_score_over_limit_keeps_floor() {
        assert_eq!(calculate_score(&task(ScoringMethod::Time), &success(90_000)), 100);
    }

    #[test]
    fn test_missing_completion_time_uses_limit() {
        let mut result = success(0);
        assert_eq!(calculate_score(&task(ScoringMethod::Time), &result), 100);
        result.completion_time_ms = None;
        assert_eq!(calculate_score(&task(ScoringMethod::Composite), &result), 600);
    }

    #[test]
    fn test_composite_score() {
        let t = task(ScoringMethod::Composite);
        assert_eq!(calculate_score(&t, &success(60_000)), 600);
        assert_eq!(calculate_score(&t, &success(30_000)), 800);
    }

    #[test]
    fn test_accuracy_and_unknown() {
        assert_eq!(calculate_score(&task(ScoringMethod::Accuracy), &success(10)), 1000);
        assert_eq!(calculate_score(&task(ScoringMethod::Unknown), &success(10)), 1000);
        assert_eq!(calculate_score(&task(ScoringMethod::Judged), &success(10)), 1000);
    }

    #[test]
    fn test_failure_scores_zero_for_every_method() {
        let failed = AgentRunResult::failed("a", "t", "timeout");
        for method in [
            ScoringMethod::Time,
            ScoringMethod::Accuracy,
            ScoringMethod::Composite,
            ScoringMethod::Judged,
            ScoringMethod::Unknown,
        ] {
            assert_eq!(calculate_score(&task(method), &failed), 0);
        }
    }

    #[test]
    fn test_score_is_bounded() {
        for ms in [0, 1, 59_999, 60_000, 1_000_000, u64::MAX] {
            for method in [ScoringMethod::Time, ScoringMethod::Composite] {
                let t = task(method).with_max_score(777);
                assert!(calculate_score(&t, &success(ms)) <= 777);
            }
        }
    }

    #[test]
    fn test_zero_time_limit() {
        let t = task(ScoringMethod::Time).with_time_limit(0);
        assert_eq!(calculate_score(&t, &success(10)), 100);
    }

    struct FixedJudge(f64);

    #[async_trait]
    impl Judge for FixedJudge {
        async fn judge_submission(
            &self,
            _task_id: &str,
            _payload: &serde_json::Value,
            _provider_id: &str,
        ) -> OlympicsResult<Judgement> {
            Ok(Judgement {
                score: self.0,
                breakdown: json!({"quality": self.0}),
            })
        }
    }

    struct DownJudge;

    #[async_trait]
    impl Judge for DownJudge {
        async fn judge_submission(
            &self,
            _task_id: &str,
            _payload: &serde_json::Value,
            _provider_id: &str,
        ) -> OlympicsResult<Judgement> {
            Err(OlympicsError::Judge("service unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_judged_uses_judge_score() {
        let engine = ScoringEngine::with_judge(Arc::new(FixedJudge(712.6)));
        let score = engine
            .score(&task(ScoringMethod::Judged), &success(10), AgentProvider::Claude)
            .await;
        assert_eq!(score, 713);
    }

    #[tokio::test]
    async fn test_judged_score_is_clamped() {
        let engine = ScoringEngine::with_judge(Arc::new(FixedJudge(5000.0)));
        let t = task(ScoringMethod::Judged);
        assert_eq!(engine.score(&t, &success(10), AgentProvider::Claude).await, 1000);

        let engine = ScoringEngine::with_judge(Arc::new(FixedJudge(-3.0)));
        assert_eq!(engine.score(&t, &success(10), AgentProvider::Claude).await, 0);

        let engine = ScoringEngine::with_judge(Arc::new(FixedJudge(f64::NAN)));
        assert_eq!(engine.score(&t, &success(10), AgentProvider::Claude).await, 1000);
    }

    #[tokio::test]
    async fn test_missing_judge_uses_default() {
        let engine = ScoringEngine::new();
        assert!(!engine.has_judge());
        let score = engine
            .score(&task(ScoringMethod::Judged), &success(10), AgentProvider::Claude)
            .await;
        assert_eq!(score, 1000);
    }

    #[tokio::test]
    async fn test_judge_error_falls_back_to_default() {
        let engine = ScoringEngine::with_judge(Arc::new(DownJudge));
        assert!(engine.has_judge());
        let score = engine
            .score(&task(ScoringMethod::Judged), &success(10), AgentProvider::Webhook)
            .await;
        assert_eq!(score, 1000);
    }

    #[tokio::test]
    async fn test_failed_run_skips_judge() {
        let engine = ScoringEngine::with_judge(Arc::new(FixedJudge(900.0)));
        let failed = AgentRunResult::failed("a", "t", "crashed");
        let score = engine
            .score(&task(ScoringMethod::Judged), &failed, AgentProvider::Claude)
            .await;
        assert_eq!(score, 0);
    }

    #[tokio::test]
    async fn test_non_judged_ignores_judge() {
        let engine = ScoringEngine::with_judge(Arc::new(FixedJudge(1.0)));
        let score = engine
            .score(&task(ScoringMethod::Time), &success(60_000), AgentProvider::Claude)
            .await;
        assert_eq!(score, 100);
    }
}
