//! Task service: accepts requests, launches workflows, and persists what the
//! relay and promise deliver.
//!
//! The buffered path (`run_to_completion`) drains the relay internally; the
//! streaming path (`stream`) hands lines to the caller one at a time while
//! persisting each as a log row. Both end by persisting the final record and
//! artifact rows from the resolved outcome.

use std::sync::Arc;

use tracing::info;

use crate::app::driver::{TaskRun, WorkflowDriver};
use crate::app::request::{TaskRequest, merge_defaults};
use crate::config::DispatchConfig;
use crate::domain::{
    DispatchError, ExecutionOutcome, OutputLine, SessionId, TaskId, TaskRecord, TaskStatus,
};
use crate::ports::clock::Clock;
use crate::ports::environment::EnvironmentProvisioner;
use crate::ports::task_store::{ArtifactRow, TaskStore};
use crate::promise::ResultHandle;
use crate::relay::RelayReceiver;

/// What the surrounding HTTP layer returns for a completed task.
#[derive(Debug, Clone)]
pub struct TaskCompletion {
    pub task_id: TaskId,
    pub session_id: SessionId,
    pub status: TaskStatus,
    pub outcome: ExecutionOutcome,
}

pub struct TaskService {
    config: DispatchConfig,
    provisioner: Arc<dyn EnvironmentProvisioner>,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
}

impl TaskService {
    pub fn new(
        config: DispatchConfig,
        provisioner: Arc<dyn EnvironmentProvisioner>,
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            provisioner,
            store,
            clock,
        }
    }

    /// Validate the request, merge default capabilities, and persist a
    /// pending record. No environment is touched yet.
    pub async fn accept(&self, request: TaskRequest) -> Result<TaskRecord, DispatchError> {
        request.validate()?;
        let record = TaskRecord::new(
            TaskId::generate(),
            SessionId::new(request.session_id),
            request.prompt,
            merge_defaults(&self.config.default_skills, &request.skills),
            merge_defaults(&self.config.default_mcps, &request.mcps),
            self.clock.now(),
        );
        self.store.create(record.clone()).await?;
        info!(task_id = %record.id, session_id = %record.session_id, "task accepted");
        Ok(record)
    }

    /// Run the workflow to completion, persisting every line and the final
    /// record, and return the summary the caller gets back.
    pub async fn run_to_completion(
        &self,
        task: &TaskRecord,
    ) -> Result<TaskCompletion, DispatchError> {
        let mut stream = self.stream(task).await?;
        while stream.next_line().await.is_some() {}
        stream.finish().await
    }

    /// Launch the workflow and return a live stream the caller drains.
    pub async fn stream(&self, task: &TaskRecord) -> Result<TaskStream, DispatchError> {
        self.store.mark_running(task.id, self.clock.now()).await?;
        let driver = WorkflowDriver::new(self.config.clone(), self.provisioner.clone());
        let (receiver, handle) = driver.start(TaskRun {
            task_id: task.id,
            session_id: task.session_id.clone(),
            prompt: task.prompt.clone(),
            skills: task.skills.clone(),
            mcps: task.integrations.clone(),
        });
        Ok(TaskStream {
            task_id: task.id,
            session_id: task.session_id.clone(),
            receiver,
            handle,
            store: self.store.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
        })
    }
}

/// Live output of one running task. `next_line` until `None`, then `finish`.
pub struct TaskStream {
    task_id: TaskId,
    session_id: SessionId,
    receiver: RelayReceiver,
    handle: ResultHandle,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
}

impl TaskStream {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Next line from the relay; each delivered line is also persisted as a
    /// log row. `None` means end-of-stream.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        let line = self.receiver.recv().await?;
        // A log row that fails to persist must not break the live stream.
        if let Err(err) = self
            .store
            .append_log(self.task_id, &line, self.clock.now())
            .await
        {
            tracing::warn!(task_id = %self.task_id, error = %err, "log row not persisted");
        }
        Some(line)
    }

    /// Await the final outcome, persist the terminal record and artifact
    /// rows, and return the completion summary.
    pub async fn finish(mut self) -> Result<TaskCompletion, DispatchError> {
        // Drain any lines the caller left unread so the log is complete.
        while self.next_line().await.is_some() {}

        let outcome = self.handle.outcome().await;
        self.store
            .finish(
                self.task_id,
                outcome.success,
                &outcome.message,
                &outcome.artifacts,
                self.clock.now(),
            )
            .await?;
        if !outcome.artifacts.is_empty() {
            let rows: Vec<ArtifactRow> = outcome
                .artifacts
                .iter()
                .map(|file| ArtifactRow {
                    file_path: file.clone(),
                    download_url: self.config.download_url(file),
                })
                .collect();
            self.store.add_artifacts(self.task_id, &rows).await?;
        }
        let status = if outcome.success {
            TaskStatus::Succeeded
        } else {
            TaskStatus::Failed
        };
        Ok(TaskCompletion {
            task_id: self.task_id,
            session_id: self.session_id,
            status,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryTaskStore, ScriptedEnvironment, ScriptedProvisioner};
    use crate::ports::clock::SystemClock;
    use crate::ports::environment::Execution;

    fn request() -> TaskRequest {
        TaskRequest {
            session_id: "s-1".into(),
            prompt: "做一份周报".into(),
            skills: vec!["ppt".into()],
            mcps: vec!["tapd".into()],
        }
    }

    fn healthy_env() -> Arc<ScriptedEnvironment> {
        let env = Arc::new(ScriptedEnvironment::new());
        env.respond(
            "ls -1 /data/skills",
            Execution::with_stdout(["ppt", "excel", "zip", "browse_user"]),
        );
        env.respond(
            "cat /data/all_mcp.json",
            Execution::with_stdout([r#"{"tapd": {}}"#]),
        );
        env.respond("npm i -g", Execution::with_stdout(["added 1 package"]));
        env.respond("claude", Execution::with_stdout(["report ready"]));
        env.respond(
            "ls -1 /data/context/s-1/artifact",
            Execution::with_stdout(["weekly.pptx"]),
        );
        env
    }

    fn service(env: Arc<ScriptedEnvironment>, store: Arc<InMemoryTaskStore>) -> TaskService {
        TaskService::new(
            DispatchConfig::default(),
            Arc::new(ScriptedProvisioner::new(env)),
            store,
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn accept_merges_defaults_and_persists_pending() {
        let store = Arc::new(InMemoryTaskStore::new());
        let service = service(healthy_env(), store.clone());
        let record = service.accept(request()).await.unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        // Defaults first, requested "ppt" deduplicated.
        assert_eq!(record.skills, vec!["ppt", "excel", "zip", "browse_user"]);
        assert_eq!(record.integrations, vec!["tapd"]);
        assert!(store.fetch(record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn accept_rejects_invalid_requests_without_creating_anything() {
        let store = Arc::new(InMemoryTaskStore::new());
        let env = healthy_env();
        let service = service(env.clone(), store);
        let err = service
            .accept(TaskRequest {
                prompt: String::new(),
                ..request()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        assert!(env.commands().is_empty());
    }

    #[tokio::test]
    async fn run_to_completion_persists_logs_record_and_artifacts() {
        let store = Arc::new(InMemoryTaskStore::new());
        let service = service(healthy_env(), store.clone());
        let record = service.accept(request()).await.unwrap();
        let completion = service.run_to_completion(&record).await.unwrap();

        assert_eq!(completion.status, TaskStatus::Succeeded);
        assert!(completion.outcome.success);

        let stored = store.fetch(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Succeeded);
        assert_eq!(stored.message.as_deref(), Some("任务执行成功"));
        assert_eq!(stored.output_files, vec!["weekly.pptx".to_string()]);
        assert!(stored.started_at.is_some() && stored.finished_at.is_some());

        let logs = store.logs_for(record.id).await;
        let contents: Vec<&str> = logs.iter().map(|l| l.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "[install][stdout] added 1 package",
                "[run][stdout] report ready",
                "产出文件:",
                "https://base-api/download/weekly.pptx",
            ]
        );

        let artifacts = store.artifacts_for(record.id).await;
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].file_path, "weekly.pptx");
        assert_eq!(
            artifacts[0].download_url,
            "https://base-api/download/weekly.pptx"
        );
    }

    #[tokio::test]
    async fn stream_delivers_lines_live_and_finish_persists() {
        let store = Arc::new(InMemoryTaskStore::new());
        let service = service(healthy_env(), store.clone());
        let record = service.accept(request()).await.unwrap();

        let mut stream = service.stream(&record).await.unwrap();
        assert_eq!(
            store.fetch(record.id).await.unwrap().unwrap().status,
            TaskStatus::Running
        );

        let mut lines = Vec::new();
        while let Some(line) = stream.next_line().await {
            lines.push(line.to_string());
        }
        assert_eq!(lines[0], "[install][stdout] added 1 package");
        assert_eq!(lines.last().map(String::as_str), Some("https://base-api/download/weekly.pptx"));

        let completion = stream.finish().await.unwrap();
        assert_eq!(completion.status, TaskStatus::Succeeded);
        assert_eq!(
            store.fetch(record.id).await.unwrap().unwrap().status,
            TaskStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn finish_drains_unread_lines_into_the_log() {
        let store = Arc::new(InMemoryTaskStore::new());
        let service = service(healthy_env(), store.clone());
        let record = service.accept(request()).await.unwrap();

        // Caller abandons the stream immediately; finish still logs it all.
        let stream = service.stream(&record).await.unwrap();
        let completion = stream.finish().await.unwrap();
        assert!(completion.outcome.success);
        assert_eq!(store.logs_for(record.id).await.len(), 4);
    }

    #[tokio::test]
    async fn failed_run_is_persisted_as_failed() {
        let env = Arc::new(ScriptedEnvironment::new());
        env.respond(
            "ls -1 /data/skills",
            Execution::with_stdout(["ppt", "excel", "zip", "browse_user"]),
        );
        env.respond(
            "cat /data/all_mcp.json",
            Execution::with_stdout([r#"{"tapd": {}}"#]),
        );
        env.respond("npm i -g", Execution::with_stdout(["ok"]));
        env.respond("claude", Execution::failed("CommandFailed", "exit status 1"));

        let store = Arc::new(InMemoryTaskStore::new());
        let service = service(env, store.clone());
        let record = service.accept(request()).await.unwrap();
        let completion = service.run_to_completion(&record).await.unwrap();

        assert_eq!(completion.status, TaskStatus::Failed);
        let stored = store.fetch(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.message.as_deref(), Some("任务执行失败"));
    }
}
