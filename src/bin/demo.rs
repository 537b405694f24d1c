//! Demonstration worker wired to the in-memory broker and backend.
//!
//! Registers a few tasks, submits a chain and a group with a chord callback,
//! then runs a worker until both finish.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use taskweave::backends::{InMemoryBackend, ResultBackend};
use taskweave::brokers::InMemoryBroker;
use taskweave::tasks::{humanize_results, task_fn, Signature, TaskArg, TaskResult, TaskState};
use taskweave::{Config, Server};

#[tokio::main]
async fn main() -> Result<()> {
    taskweave::logging::init();

    let backend = Arc::new(InMemoryBackend::new());
    let server = Arc::new(Server::new(
        Config::default(),
        Arc::new(InMemoryBroker::new()),
        backend.clone(),
    ));

    server
        .register_task(
            "add",
            Arc::new(task_fn(|a: i64, b: i64| async move {
                Ok(vec![TaskResult::int(a + b)])
            })),
        )
        .await;
    server
        .register_task(
            "square",
            Arc::new(task_fn(|x: i64| async move {
                Ok(vec![TaskResult::int(x * x)])
            })),
        )
        .await;
    server
        .register_task(
            "tag_result",
            Arc::new(task_fn(|tag: String, value: i64| async move {
                Ok(vec![TaskResult::string(format!("{tag}={value}"))])
            })),
        )
        .await;
    server
        .register_task(
            "sum3",
            Arc::new(task_fn(|a: i64, b: i64, c: i64| async move {
                Ok(vec![TaskResult::int(a + b + c)])
            })),
        )
        .await;

    // A chain: square(7), then tag the squared value.
    let tagged = Signature::new("tag_result").with_args(vec![TaskArg::string("square")]);
    let tagged_uuid = tagged.uuid;
    server
        .send_task(
            Signature::new("square")
                .with_args(vec![TaskArg::int(7)])
                .on_success(tagged),
        )
        .await?;

    // A group of three adds with a chord summing their results.
    let group_uuid = Uuid::new_v4();
    let chord = Signature::new("sum3");
    let chord_uuid = chord.uuid;
    for i in 0..3i64 {
        server
            .send_task(
                Signature::new("add")
                    .with_args(vec![TaskArg::int(i), TaskArg::int(i * 10)])
                    .in_group(group_uuid, 3)
                    .with_chord(chord.clone()),
            )
            .await?;
    }

    let worker = Arc::new(server.new_worker("demo-worker", 4));
    let (outcomes, mut terminal) = mpsc::channel(4);
    worker.launch_async(outcomes);

    wait_for_success(&backend, tagged_uuid, "chain result").await?;
    wait_for_success(&backend, chord_uuid, "chord result").await?;

    worker.quit().await;
    match terminal.recv().await {
        Some(Ok(())) => info!("worker stopped"),
        Some(Err(err)) => bail!("worker terminated: {err}"),
        None => bail!("worker outcome channel closed"),
    }
    Ok(())
}

async fn wait_for_success(
    backend: &Arc<InMemoryBackend>,
    task_uuid: Uuid,
    label: &str,
) -> Result<()> {
    for _ in 0..100 {
        if let Some(record) = backend.task_state(task_uuid).await? {
            match record.state {
                TaskState::Success => {
                    let results = record.results.unwrap_or_default();
                    info!(%task_uuid, results = %humanize_results(&results), "{label}");
                    return Ok(());
                }
                TaskState::Failure => {
                    bail!("{label}: task failed: {:?}", record.error)
                }
                _ => {}
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    bail!("{label}: timed out waiting for task {task_uuid}")
}
