//! Demo: dispatch one task against a scripted sandbox and stream its output.

use std::sync::Arc;

use sandrun_core::config::DispatchConfig;
use sandrun_core::impls::{InMemoryTaskStore, ScriptedEnvironment, ScriptedProvisioner};
use sandrun_core::ports::clock::SystemClock;
use sandrun_core::ports::environment::Execution;
use sandrun_core::{TaskRequest, TaskService};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // (A) A scripted sandbox standing in for the real provisioner.
    let env = Arc::new(ScriptedEnvironment::new());
    env.respond(
        "ls -1 /data/skills",
        Execution::with_stdout(["ppt", "excel", "zip", "browse_user"]),
    );
    env.respond(
        "cat /data/all_mcp.json",
        Execution::with_stdout([r#"{"tapd": {}}"#]),
    );
    env.respond(
        "npm i -g",
        Execution::with_stdout(["added 1 package in 2s"]),
    );
    env.respond(
        "claude",
        Execution::with_stdout(["收到任务，开始生成周报", "周报已写入 artifact/weekly.pptx"]),
    );
    env.respond(
        "ls -1 /data/context/demo/artifact",
        Execution::with_stdout(["weekly.pptx"]),
    );

    // (B) Service wired with the in-memory store.
    let store = Arc::new(InMemoryTaskStore::new());
    let service = TaskService::new(
        DispatchConfig::default(),
        Arc::new(ScriptedProvisioner::new(env.clone())),
        store.clone(),
        Arc::new(SystemClock),
    );

    // (C) Accept a task and stream it live, like the /tasks/{id}/stream path.
    let record = match service
        .accept(TaskRequest {
            session_id: "demo".to_string(),
            prompt: "帮我整理本周的周报".to_string(),
            skills: vec!["ppt".to_string()],
            mcps: vec!["tapd".to_string()],
        })
        .await
    {
        Ok(record) => record,
        Err(err) => {
            eprintln!("request rejected: {err}");
            return;
        }
    };
    println!("accepted: {}", record.id);

    let mut stream = match service.stream(&record).await {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("stream failed: {err}");
            return;
        }
    };
    while let Some(line) = stream.next_line().await {
        println!("{line}");
    }

    // (D) After the stream ends, the final record is already determined.
    match stream.finish().await {
        Ok(completion) => {
            println!(
                "final: status={} message={} artifacts={:?}",
                completion.status.as_str(),
                completion.outcome.message,
                completion.outcome.artifacts
            );
            println!("terminate calls: {}", env.terminate_count());
        }
        Err(err) => eprintln!("finish failed: {err}"),
    }
}
