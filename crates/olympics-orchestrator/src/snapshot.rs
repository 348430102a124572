use crate::events::ArenaEvent;
use crate::types::Competition;
use async_trait::async_trait;
use olympics_core::{OlympicsError, OlympicsResult};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Crash-recovery bookkeeping for running competitions.
///
/// Controllers treat every call as best effort: a failure is logged and the
/// run carries on.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_competition_snapshot(&self, competition: &Competition) -> OlympicsResult<()>;
    async fn load_competition_snapshot(&self, id: Uuid) -> OlympicsResult<Option<Competition>>;
    async fn remove_competition_snapshot(&self, id: Uuid) -> OlympicsResult<()>;
    /// Ids of competitions that still have a snapshot, i.e. did not finish.
    async fn list_snapshots(&self) -> OlympicsResult<Vec<Uuid>>;
    async fn append_event_log(&self, competition_id: Uuid, event: &ArenaEvent)
        -> OlympicsResult<()>;
    async fn read_event_log(&self, competition_id: Uuid) -> OlympicsResult<Vec<ArenaEvent>>;
    async fn delete_event_log(&self, competition_id: Uuid) -> OlympicsResult<()>;
}

/// Snapshots as `<dir>/snapshots/<id>.json`, event logs as `<dir>/events/<id>.jsonl`.
pub struct FileSnapshotStore {
    snapshots_dir: PathBuf,
    events_dir: PathBuf,
}

impl FileSnapshotStore {
    pub async fn new(dir: PathBuf) -> OlympicsResult<Self> {
        let snapshots_dir = dir.join("snapshots");
        let events_dir = dir.join("events");
        tokio::fs::create_dir_all(&snapshots_dir).await?;
        tokio::fs::create_dir_all(&events_dir).await?;
        Ok(Self {
            snapshots_dir,
            events_dir,
        })
    }

    fn snapshot_path(&self, id: Uuid) -> PathBuf {
        self.snapshots_dir.join(format!("{}.json", id))
    }

    fn event_log_path(&self, id: Uuid) -> PathBuf {
        self.events_dir.join(format!("{}.jsonl", id))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save_competition_snapshot(&self, competition: &Competition) -> OlympicsResult<()> {
        let path = self.snapshot_path(competition.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(competition)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load_competition_snapshot(&self, id: Uuid) -> OlympicsResult<Option<Competition>> {
        let path = self.snapshot_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let competition: Competition = serde_json::from_str(&data).map_err(|e| {
            OlympicsError::Persistence(format!("Failed to parse snapshot {}: {}", id, e))
        })?;
        Ok(Some(competition))
    }

    async fn remove_competition_snapshot(&self, id: Uuid) -> OlympicsResult<()> {
        let path = self.snapshot_path(id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn list_snapshots(&self) -> OlympicsResult<Vec<Uuid>> {
        let mut entries = tokio::fs::read_dir(&self.snapshots_dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn append_event_log(
        &self,
        competition_id: Uuid,
        event: &ArenaEvent,
    ) -> OlympicsResult<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.event_log_path(competition_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_event_log(&self, competition_id: Uuid) -> OlympicsResult<Vec<ArenaEvent>> {
        let path = self.event_log_path(competition_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(path).await?;
        data.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| {
                    OlympicsError::Persistence(format!("Corrupt event log entry: {}", e))
                })
            })
            .collect()
    }

    async fn delete_event_log(&self, competition_id: Uuid) -> OlympicsResult<()> {
        let path = self.event_log_path(competition_id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::CompetitionStatus;
    use olympics_core::{AgentConfig, AgentProvider, ScoringMethod, TaskDefinition};

    fn competition() -> Competition {
        Competition::new(
            "Snapshot",
            "",
            vec![AgentConfig::new("a", "Alpha", AgentProvider::Claude)],
            vec![TaskDefinition::new("t", "Task", ScoringMethod::Accuracy)],
        )
    }

    #[tokio::test]
    async fn test_snapshot_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().to_path_buf()).await.unwrap();
        let mut comp = competition();
        comp.status = CompetitionStatus::Running;

        store.save_competition_snapshot(&comp).await.unwrap();
        assert_eq!(store.list_snapshots().await.unwrap(), vec![comp.id]);

        let loaded = store.load_competition_snapshot(comp.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, CompetitionStatus::Running);
        assert_eq!(loaded.leaderboard, comp.leaderboard);

        store.remove_competition_snapshot(comp.id).await.unwrap();
        store.remove_competition_snapshot(comp.id).await.unwrap();
        assert!(store.load_competition_snapshot(comp.id).await.unwrap().is_none());
        assert!(store.list_snapshots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_event_log_append_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().to_path_buf()).await.unwrap();
        let id = Uuid::new_v4();

        for index in 0..3 {
            store
                .append_event_log(
                    id,
                    &ArenaEvent::EventStart {
                        competition_id: id,
                        event_index: index,
                        task_id: "t".to_string(),
                    },
                )
                .await
                .unwrap();
        }
        let events = store.read_event_log(id).await.unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[2], ArenaEvent::EventStart { event_index: 2, .. }));

        store.delete_event_log(id).await.unwrap();
        assert!(store.read_event_log(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().to_path_buf()).await.unwrap();
        let id = Uuid::new_v4();
        tokio::fs::write(store.snapshot_path(id), "{oops").await.unwrap();
        let err = store.load_competition_snapshot(id).await.unwrap_err();
        assert!(matches!(err, OlympicsError::Persistence(_)));
    }
}
