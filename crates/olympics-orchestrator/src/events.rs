use crate::types::{
    Bracket, BracketType, CompetitionStatus, EventStatus, LeaderboardEntry, TournamentStanding,
    TournamentStatus,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 256;

/// Progress notifications published by the controllers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ArenaEvent {
    #[serde(rename = "competition:start")]
    CompetitionStart {
        competition_id: Uuid,
        name: String,
        agent_ids: Vec<String>,
        task_ids: Vec<String>,
    },
    #[serde(rename = "competition:end")]
    CompetitionEnd {
        competition_id: Uuid,
        status: CompetitionStatus,
        leaderboard: Vec<LeaderboardEntry>,
    },
    #[serde(rename = "event:start")]
    EventStart {
        competition_id: Uuid,
        event_index: usize,
        task_id: String,
    },
    #[serde(rename = "event:end")]
    EventEnd {
        competition_id: Uuid,
        event_index: usize,
        status: EventStatus,
    },
    #[serde(rename = "leaderboard:update")]
    LeaderboardUpdate {
        competition_id: Uuid,
        leaderboard: Vec<LeaderboardEntry>,
    },
    #[serde(rename = "tournament:start")]
    TournamentStart {
        tournament_id: Uuid,
        name: String,
        bracket_type: BracketType,
    },
    #[serde(rename = "tournament:end")]
    TournamentEnd {
        tournament_id: Uuid,
        status: TournamentStatus,
        standings: Vec<TournamentStanding>,
    },
    #[serde(rename = "round:start")]
    RoundStart {
        tournament_id: Uuid,
        round_number: usize,
        name: String,
    },
    #[serde(rename = "round:end")]
    RoundEnd {
        tournament_id: Uuid,
        round_number: usize,
        advancing: Vec<String>,
        eliminated: Vec<String>,
    },
    #[serde(rename = "match:end")]
    MatchEnd {
        tournament_id: Uuid,
        round_number: usize,
        match_id: Uuid,
        winner_id: Option<String>,
        /// The winner was drawn at random because the match errored.
        forfeited: bool,
    },
    #[serde(rename = "bracket:update")]
    BracketUpdate {
        tournament_id: Uuid,
        bracket: Bracket,
    },
}

impl ArenaEvent {
    /// Wire name of the event, e.g. `competition:start`.
    pub fn kind(&self) -> &'static str {
        match self {
            ArenaEvent::CompetitionStart { .. } => "competition:start",
            ArenaEvent::CompetitionEnd { .. } => "competition:end",
            ArenaEvent::EventStart { .. } => "event:start",
            ArenaEvent::EventEnd { .. } => "event:end",
            ArenaEvent::LeaderboardUpdate { .. } => "leaderboard:update",
            ArenaEvent::TournamentStart { .. } => "tournament:start",
            ArenaEvent::TournamentEnd { .. } => "tournament:end",
            ArenaEvent::RoundStart { .. } => "round:start",
            ArenaEvent::RoundEnd { .. } => "round:end",
            ArenaEvent::MatchEnd { .. } => "match:end",
            ArenaEvent::BracketUpdate { .. } => "bracket:update",
        }
    }
}

/// Fan-out of [`ArenaEvent`]s to any number of subscribers.
///
/// Cloning shares the underlying channel. Publishing with nobody listening is
/// not an error, and slow subscribers lag rather than block the controllers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ArenaEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArenaEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ArenaEvent) {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(receivers) => trace!(event = kind, receivers, "Arena event emitted"),
            Err(_) => trace!(event = kind, "Arena event dropped, no subscribers"),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(ArenaEvent::RoundStart {
            tournament_id: Uuid::new_v4(),
            round_number: 1,
            name: "Final".to_string(),
        });
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.clone().subscribe();
        let id = Uuid::new_v4();
        bus.emit(ArenaEvent::EventStart {
            competition_id: id,
            event_index: 0,
            task_id: "form-blitz".to_string(),
        });

        for rx in [&mut first, &mut second] {
            match rx.recv().await.unwrap() {
                ArenaEvent::EventStart { competition_id, .. } => assert_eq!(competition_id, id),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn test_wire_format() {
        let event = ArenaEvent::MatchEnd {
            tournament_id: Uuid::nil(),
            round_number: 2,
            match_id: Uuid::nil(),
            winner_id: Some("a".to_string()),
            forfeited: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "match:end");
        assert_eq!(json["forfeited"], true);
        assert_eq!(event.kind(), "match:end");

        let back: ArenaEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
