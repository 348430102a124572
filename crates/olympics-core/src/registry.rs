use crate::types::TaskDefinition;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Read-only lookup of task definitions by id.
pub trait TaskRegistry: Send + Sync {
    fn get_task_by_id(&self, id: &str) -> Option<TaskDefinition>;

    /// Resolve every id that exists, silently dropping unknown ones.
    fn resolve(&self, ids: &[String]) -> Vec<TaskDefinition> {
        ids.iter().filter_map(|id| self.get_task_by_id(id)).collect()
    }
}

/// Task registry backed by a map, filled from static configuration.
#[derive(Default)]
pub struct InMemoryTaskRegistry {
    tasks: RwLock<HashMap<String, TaskDefinition>>,
}

impl InMemoryTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: impl IntoIterator<Item = TaskDefinition>) -> Self {
        let registry = Self::new();
        for task in tasks {
            registry.register(task);
        }
        registry
    }

    /// Add or replace a task definition.
    pub fn register(&self, task: TaskDefinition) {
        self.tasks.write().insert(task.id.clone(), task);
    }

    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tasks.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

impl TaskRegistry for InMemoryTaskRegistry {
    fn get_task_by_id(&self, id: &str) -> Option<TaskDefinition> {
        self.tasks.read().get(id).cloned()
    }
}
