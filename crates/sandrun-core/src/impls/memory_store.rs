//! In-memory task store for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{OutputLine, StreamKind, TaskId, TaskRecord};
use crate::ports::task_store::{ArtifactRow, StoreError, TaskStore};

/// One persisted log row, as the external store would keep it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRow {
    pub task_id: TaskId,
    pub stream: StreamKind,
    pub content: String,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    records: HashMap<TaskId, TaskRecord>,
    logs: Vec<LogRow>,
    artifacts: HashMap<TaskId, Vec<ArtifactRow>>,
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    state: Mutex<State>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All log rows appended for one task, in append order.
    pub async fn logs_for(&self, id: TaskId) -> Vec<LogRow> {
        let state = self.state.lock().await;
        state
            .logs
            .iter()
            .filter(|row| row.task_id == id)
            .cloned()
            .collect()
    }

    pub async fn artifacts_for(&self, id: TaskId) -> Vec<ArtifactRow> {
        let state = self.state.lock().await;
        state.artifacts.get(&id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, record: TaskRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.records.insert(record.id, record);
        Ok(())
    }

    async fn mark_running(&self, id: TaskId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let record = state.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.mark_running(now);
        Ok(())
    }

    async fn append_log(
        &self,
        id: TaskId,
        line: &OutputLine,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.records.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        state.logs.push(LogRow {
            task_id: id,
            stream: line.stream(),
            content: line.to_string(),
            at,
        });
        Ok(())
    }

    async fn finish(
        &self,
        id: TaskId,
        success: bool,
        message: &str,
        output_files: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let record = state.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.mark_finished(success, message, output_files.to_vec(), now);
        Ok(())
    }

    async fn add_artifacts(&self, id: TaskId, artifacts: &[ArtifactRow]) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.records.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        state
            .artifacts
            .entry(id)
            .or_default()
            .extend(artifacts.iter().cloned());
        Ok(())
    }

    async fn fetch(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.records.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SessionId, TaskStatus};

    fn record() -> TaskRecord {
        TaskRecord::new(
            TaskId::generate(),
            SessionId::new("s-1"),
            "prompt",
            vec!["ppt".into()],
            vec!["tapd".into()],
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_create_fetch_roundtrip() {
        let store = InMemoryTaskStore::new();
        let r = record();
        let id = r.id;
        store.create(r).await.unwrap();
        let fetched = store.fetch(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_lifecycle_updates_the_stored_record() {
        let store = InMemoryTaskStore::new();
        let r = record();
        let id = r.id;
        store.create(r).await.unwrap();
        store.mark_running(id, Utc::now()).await.unwrap();
        store
            .finish(id, true, "任务执行成功", &["a.pptx".into()], Utc::now())
            .await
            .unwrap();
        let fetched = store.fetch(id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Succeeded);
        assert_eq!(fetched.output_files, vec!["a.pptx".to_string()]);
    }

    #[tokio::test]
    async fn test_logs_are_kept_per_task_in_order() {
        let store = InMemoryTaskStore::new();
        let r = record();
        let id = r.id;
        store.create(r).await.unwrap();
        let now = Utc::now();
        store
            .append_log(id, &OutputLine::stdout("install", "a"), now)
            .await
            .unwrap();
        store
            .append_log(id, &OutputLine::error("run", "boom"), now)
            .await
            .unwrap();
        let logs = store.logs_for(id).await;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].content, "[install][stdout] a");
        assert_eq!(logs[1].stream, StreamKind::Error);
    }

    #[tokio::test]
    async fn test_operations_on_unknown_task_fail() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::generate();
        assert!(store.mark_running(id, Utc::now()).await.is_err());
        assert!(
            store
                .append_log(id, &OutputLine::note("x"), Utc::now())
                .await
                .is_err()
        );
    }
}
