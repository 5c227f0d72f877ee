//! Queue consumer loops (spec.md §4.2 worker pools: 5 workers for `execute`,
//! 2 for `ai`). Each worker repeatedly promotes due delayed messages, blocks
//! for the next ready one, and dispatches it to the run processor.

use std::sync::Arc;
use std::time::Duration;

use engine::RunProcessor;
use queue::{Message, Queue, QueueName};
use tracing::{error, info, warn};

const EXECUTE_WORKERS: usize = 5;
const AI_WORKERS: usize = 2;
const DEQUEUE_TIMEOUT_SECS: f64 = 5.0;
const PROMOTE_INTERVAL: Duration = Duration::from_millis(500);

/// Runs forever, consuming one named queue. Spawned `workers_per_queue`
/// times per queue name by `run_worker_pools`.
async fn run_worker_loop(queue: Queue, processor: Arc<RunProcessor>, queue_name: QueueName, worker_index: usize) {
    info!(%queue_name, worker_index, "worker starting");
    let mut last_promote = std::time::Instant::now();

    let mut dequeue_conn = loop {
        match queue.dedicated_connection().await {
            Ok(conn) => break conn,
            Err(e) => {
                error!(%e, %queue_name, worker_index, "failed to open dedicated dequeue connection, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    };

    loop {
        if last_promote.elapsed() >= PROMOTE_INTERVAL {
            if let Err(e) = queue.promote_due(queue_name).await {
                warn!(%e, %queue_name, "failed to promote due messages");
            }
            last_promote = std::time::Instant::now();
        }

        match queue.dequeue(&mut dequeue_conn, queue_name, DEQUEUE_TIMEOUT_SECS).await {
            Ok(Some(message)) => dispatch(&processor, queue_name, message).await,
            Ok(None) => {}
            Err(e) => {
                error!(%e, %queue_name, "dequeue failed, backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn dispatch(processor: &RunProcessor, source_queue: QueueName, message: Message) {
    let result = match message {
        Message::StartRun { run_id, workflow_id } => processor.on_start_run(run_id, workflow_id).await,
        Message::ExecuteStep { run_id, workflow_id, step_index, step_id, attempt } => {
            processor
                .on_execute_step(engine::ExecuteStepMsg { run_id, workflow_id, step_index, step_id, attempt }, source_queue)
                .await
        }
        Message::CompleteRun { run_id, status } => {
            info!(%run_id, %status, "received CompleteRun notification (no-op, reserved for future consumers)");
            Ok(())
        }
    };

    if let Err(e) = result {
        error!(%e, %source_queue, "message processing failed");
    }
}

/// Spawns the full fleet of queue workers and blocks until all of them exit
/// (which, barring a panic, is never — this future is meant to be awaited
/// for the lifetime of the `worker` subcommand).
pub async fn run_worker_pools(queue: Queue, processor: Arc<RunProcessor>) {
    let mut handles = Vec::new();

    for i in 0..EXECUTE_WORKERS {
        let queue = queue.clone();
        let processor = processor.clone();
        handles.push(tokio::spawn(async move { run_worker_loop(queue, processor, QueueName::Execute, i).await }));
    }

    for i in 0..AI_WORKERS {
        let queue = queue.clone();
        let processor = processor.clone();
        handles.push(tokio::spawn(async move { run_worker_loop(queue, processor, QueueName::Ai, i).await }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}
