//! Polling worker and task-facing service API.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::constants::{
    TASK_LIST_COUNT_MAX, TASK_RETRY_COUNT_MAX_DEFAULT, WORKER_POLL_INTERVAL_SECS_DEFAULT,
};
use crate::dst::SimClock;
use crate::embedding::EmbeddingProvider;
use crate::retrieval::{RetrievalEngine, StoreRequest};
use crate::storage::{AccessStore, VectorStore};
use crate::task::{EmbeddingPayload, Task, TaskError, TaskKind, TaskQueue, TaskStatus};

// =============================================================================
// Worker Report
// =============================================================================

/// Outcome of one worker tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Tasks claimed this tick (0 or 1)
    pub processed: usize,
    /// Tasks completed
    pub completed: usize,
    /// Tasks returned to the queue for retry
    pub retried: usize,
    /// Tasks failed terminally
    pub failed: usize,
}

enum Outcome {
    Completed,
    Retried,
    Failed,
}

// =============================================================================
// Task Worker
// =============================================================================

/// Polls the queue and executes one task per tick.
///
/// The worker never cancels a task mid-flight: shutdown is observed between
/// ticks, and a tick runs to completion once a task is claimed.
#[derive(Debug)]
pub struct TaskWorker<Q, P, V, A>
where
    Q: TaskQueue,
    P: EmbeddingProvider,
    V: VectorStore,
    A: AccessStore,
{
    queue: Arc<Q>,
    provider: Arc<P>,
    engine: Arc<RetrievalEngine<V, A>>,
    clock: SimClock,
    poll_interval: Duration,
}

impl<Q, P, V, A> TaskWorker<Q, P, V, A>
where
    Q: TaskQueue,
    P: EmbeddingProvider,
    V: VectorStore,
    A: AccessStore,
{
    /// Create a worker with the default poll interval.
    #[must_use]
    pub fn new(
        queue: Arc<Q>,
        provider: Arc<P>,
        engine: Arc<RetrievalEngine<V, A>>,
        clock: SimClock,
    ) -> Self {
        Self {
            queue,
            provider,
            engine,
            clock,
            poll_interval: Duration::from_secs(WORKER_POLL_INTERVAL_SECS_DEFAULT),
        }
    }

    /// Override the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        assert!(!poll_interval.is_zero(), "poll interval must be positive");
        self.poll_interval = poll_interval;
        self
    }

    /// Spawn the polling loop; returns the shutdown trigger and join handle.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> (watch::Sender<bool>, JoinHandle<()>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(shutdown_rx));
        (shutdown_tx, handle)
    }

    /// Poll until the shutdown signal flips to `true`.
    ///
    /// A tick that drained a task is followed immediately by another, so a
    /// backlog clears at full speed; an idle tick waits out the poll interval.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.tick().await {
                Ok(report) if report.processed > 0 => continue,
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "worker tick failed"),
            }
            tokio::select! {
                () = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("worker stopped");
    }

    /// Claim and execute at most one task.
    ///
    /// # Errors
    /// Returns `TaskError` when the queue itself fails. Task-level failures
    /// (embedding errors, storage errors during persistence) are absorbed
    /// into the task's retry/fail lifecycle and reported, not returned.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self) -> Result<WorkerReport, TaskError> {
        let Some(mut task) = self.queue.dequeue().await? else {
            return Ok(WorkerReport::default());
        };

        task.mark_processing(self.clock.now());
        self.queue.update(&task).await?;
        tracing::debug!(task_id = %task.id, retry = task.retry_count, "claimed task");

        let outcome = match serde_json::from_value::<TaskKind>(task.payload.clone()) {
            Ok(TaskKind::Embedding(payload)) => self.process_embedding(&mut task, payload).await?,
            Err(_) => {
                // Unknown producers never wedge the queue: echo the payload
                // back as the result and move on.
                tracing::warn!(task_id = %task.id, "unrecognized task type; completing verbatim");
                let raw = task.payload.clone();
                task.complete(raw, self.clock.now());
                self.queue.update(&task).await?;
                Outcome::Completed
            }
        };

        let mut report = WorkerReport {
            processed: 1,
            ..WorkerReport::default()
        };
        match outcome {
            Outcome::Completed => report.completed = 1,
            Outcome::Retried => report.retried = 1,
            Outcome::Failed => report.failed = 1,
        }
        Ok(report)
    }

    async fn process_embedding(
        &self,
        task: &mut Task,
        payload: EmbeddingPayload,
    ) -> Result<Outcome, TaskError> {
        let embedding = match self.provider.generate(&payload.text, &payload.model).await {
            Ok(embedding) => embedding,
            Err(err) => {
                let retryable = err.is_retryable();
                return self.settle_failure(task, &err.to_string(), retryable).await;
            }
        };

        let result = if payload.store_in_db {
            let mut request = StoreRequest::new(&task.character_id, &payload.text, embedding.dense)
                .layer(payload.layer)
                .metadata(payload.metadata);
            if let Some(sparse) = embedding.sparse {
                request = request.sparse(sparse);
            }
            match self.engine.store(request).await {
                Ok(fragment) => json!({
                    "fragmentId": fragment.id,
                    "layer": fragment.layer.as_str(),
                    "model": embedding.model,
                    "tokenCount": embedding.token_count,
                }),
                Err(err) => {
                    // Storage hiccups are worth a retry; the embedding is
                    // recomputed, which is cheap next to losing the task.
                    return self.settle_failure(task, &err.to_string(), true).await;
                }
            }
        } else {
            json!({
                "dense": embedding.dense,
                "sparse": embedding.sparse,
                "model": embedding.model,
                "tokenCount": embedding.token_count,
            })
        };

        task.complete(result, self.clock.now());
        self.queue.update(task).await?;
        tracing::debug!(task_id = %task.id, "task completed");
        Ok(Outcome::Completed)
    }

    async fn settle_failure(
        &self,
        task: &mut Task,
        error: &str,
        retryable: bool,
    ) -> Result<Outcome, TaskError> {
        if retryable && task.can_retry() {
            task.reset_for_retry(self.clock.now());
            self.queue.enqueue(task).await?;
            tracing::debug!(
                task_id = %task.id,
                retry = task.retry_count,
                error,
                "task requeued for retry"
            );
            return Ok(Outcome::Retried);
        }

        task.fail(error, self.clock.now());
        self.queue.update(task).await?;
        tracing::warn!(task_id = %task.id, error, "task failed terminally");
        Ok(Outcome::Failed)
    }
}

// =============================================================================
// Exchange Protocol
// =============================================================================

/// One result pushed back by an external consumer. Exactly one of `result`
/// and `error` must be set.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangePush {
    /// Task being settled
    pub task_id: String,
    /// Success payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A push/pull round from an external consumer: settle finished work, then
/// claim more.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    /// Results to settle
    #[serde(default)]
    pub pushes: Vec<ExchangePush>,
    /// How many new tasks to claim
    #[serde(default)]
    pub pull_count: usize,
}

/// Response to an exchange round.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeResponse {
    /// Pushes applied
    pub accepted: usize,
    /// Pushes ignored (unknown task, not processing, or malformed)
    pub rejected: usize,
    /// Newly claimed tasks, oldest first, already marked processing
    pub tasks: Vec<Task>,
}

// =============================================================================
// Task Service
// =============================================================================

/// Producer-facing API over the queue: create, inspect, and exchange tasks.
#[derive(Debug)]
pub struct TaskService<Q: TaskQueue> {
    queue: Arc<Q>,
    clock: SimClock,
    max_retries: u32,
}

impl<Q: TaskQueue> TaskService<Q> {
    /// Create a service with the default retry budget for new tasks.
    #[must_use]
    pub fn new(queue: Arc<Q>, clock: SimClock) -> Self {
        Self {
            queue,
            clock,
            max_retries: TASK_RETRY_COUNT_MAX_DEFAULT,
        }
    }

    /// Override the retry budget given to new tasks.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Validate and enqueue a new task.
    ///
    /// # Errors
    /// Returns `TaskError` on invalid payloads or queue failure.
    #[tracing::instrument(skip(self, payload), fields(character_id))]
    pub async fn create_task(
        &self,
        character_id: &str,
        payload: Value,
    ) -> Result<Task, TaskError> {
        let task =
            Task::with_max_retries(character_id, payload, self.max_retries, self.clock.now())?;
        self.queue.enqueue(&task).await?;
        tracing::debug!(task_id = %task.id, "task created");
        Ok(task)
    }

    /// Fetch a task by id.
    ///
    /// # Errors
    /// Returns `TaskError::NotFound` for an unknown id.
    pub async fn get_task(&self, task_id: &str) -> Result<Task, TaskError> {
        self.queue
            .get(task_id)
            .await?
            .ok_or_else(|| TaskError::NotFound {
                id: task_id.to_string(),
            })
    }

    /// Remove a task outright, claimed or not.
    ///
    /// # Errors
    /// Returns `TaskError::NotFound` for an unknown id.
    pub async fn delete_task(&self, task_id: &str) -> Result<(), TaskError> {
        self.queue.delete(task_id).await?;
        tracing::debug!(task_id, "task deleted");
        Ok(())
    }

    /// List tasks, newest first, optionally scoped to one character.
    ///
    /// # Errors
    /// Returns `TaskError` on an invalid limit or queue failure.
    pub async fn list_tasks(
        &self,
        character_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Task>, TaskError> {
        Ok(self.queue.list(character_id, limit).await?)
    }

    /// Settle pushed results, then claim up to `pull_count` pending tasks.
    ///
    /// Pushes referencing unknown tasks, tasks not currently processing, or
    /// carrying neither/both of result and error are counted as rejected and
    /// skipped; they never abort the round. A pushed error consumes a retry
    /// when budget remains, otherwise the task fails terminally.
    ///
    /// # Errors
    /// Returns `TaskError` only when the queue itself fails.
    #[tracing::instrument(skip(self, request), fields(pushes = request.pushes.len(), pull = request.pull_count))]
    pub async fn exchange(&self, request: ExchangeRequest) -> Result<ExchangeResponse, TaskError> {
        if request.pull_count > TASK_LIST_COUNT_MAX {
            return Err(TaskError::Validation {
                message: format!("pull_count must be at most {TASK_LIST_COUNT_MAX}"),
            });
        }

        let mut response = ExchangeResponse::default();
        let now = self.clock.now();

        for push in request.pushes {
            let Some(mut task) = self.queue.get(&push.task_id).await? else {
                tracing::warn!(task_id = %push.task_id, "push for unknown task");
                response.rejected += 1;
                continue;
            };
            if task.status != TaskStatus::Processing {
                tracing::warn!(
                    task_id = %task.id,
                    status = task.status.as_str(),
                    "push for task not processing"
                );
                response.rejected += 1;
                continue;
            }

            match (push.result, push.error) {
                (Some(result), None) => {
                    task.complete(result, now);
                    self.queue.update(&task).await?;
                    response.accepted += 1;
                }
                (None, Some(error)) => {
                    if task.can_retry() {
                        task.reset_for_retry(now);
                        self.queue.enqueue(&task).await?;
                    } else {
                        task.fail(error, now);
                        self.queue.update(&task).await?;
                    }
                    response.accepted += 1;
                }
                _ => {
                    tracing::warn!(task_id = %task.id, "push must carry exactly one of result/error");
                    response.rejected += 1;
                }
            }
        }

        while response.tasks.len() < request.pull_count {
            let Some(mut task) = self.queue.dequeue().await? else {
                break;
            };
            task.mark_processing(now);
            self.queue.update(&task).await?;
            response.tasks.push(task);
        }

        // Postcondition
        assert!(
            response.tasks.len() <= request.pull_count,
            "pulled tasks bounded by request"
        );
        Ok(response)
    }
}

// =============================================================================
// Tests
// =============================================================================
