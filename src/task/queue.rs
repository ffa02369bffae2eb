//! Task queue trait and its in-memory simulation backend.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::constants::TASK_LIST_COUNT_MAX;
use crate::dst::{FaultInjector, FaultType};
use crate::storage::{StorageError, StorageResult};
use crate::task::{Task, TaskStatus};

// =============================================================================
// Task Queue Trait
// =============================================================================

/// Trait for task queue backends.
///
/// FIFO over pending tasks: `dequeue` always yields the oldest pending task.
/// A retried task re-enters at the back of the line via `enqueue`.
#[async_trait]
pub trait TaskQueue: Send + Sync + std::fmt::Debug + 'static {
    /// Add a pending task to the back of the queue. Re-enqueueing an existing
    /// task id overwrites its record and moves it to the back.
    async fn enqueue(&self, task: &Task) -> StorageResult<()>;

    /// Pop the oldest pending task, or `None` when the queue is idle. The
    /// returned task is no longer in line; the caller owns its next
    /// transition and persists it with [`TaskQueue::update`].
    async fn dequeue(&self) -> StorageResult<Option<Task>>;

    /// Persist a task's current state without touching queue order.
    async fn update(&self, task: &Task) -> StorageResult<()>;

    /// Fetch one task by id.
    async fn get(&self, task_id: &str) -> StorageResult<Option<Task>>;

    /// List tasks, newest first, optionally filtered to one character.
    async fn list(&self, character_id: Option<&str>, limit: usize) -> StorageResult<Vec<Task>>;

    /// Remove a task record (and its queue position, if still pending).
    async fn delete(&self, task_id: &str) -> StorageResult<()>;
}

// =============================================================================
// Simulated Task Queue (for DST)
// =============================================================================

#[derive(Debug, Default)]
struct QueueInner {
    /// Pending task ids in FIFO order
    order: VecDeque<String>,
    /// All tasks ever enqueued, by id
    tasks: HashMap<String, Task>,
}

/// In-memory FIFO task queue for deterministic simulation testing.
///
/// A single mutex guards both the order and the records so a dequeue is
/// atomic: no two workers can claim the same task.
#[derive(Debug, Clone, Default)]
pub struct SimTaskQueue {
    inner: Arc<Mutex<QueueInner>>,
    fault_injector: Option<Arc<FaultInjector>>,
}

impl SimTaskQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with fault injection enabled.
    #[must_use]
    pub fn with_faults(fault_injector: Arc<FaultInjector>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner::default())),
            fault_injector: Some(fault_injector),
        }
    }

    /// Pending tasks currently in line.
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.inner.lock().unwrap().order.len()
    }

    fn should_inject(&self, fault: FaultType) -> bool {
        self.fault_injector
            .as_ref()
            .is_some_and(|injector| injector.should_inject(fault))
    }
}

#[async_trait]
impl TaskQueue for SimTaskQueue {
    async fn enqueue(&self, task: &Task) -> StorageResult<()> {
        // Precondition: only pending tasks wait in line
        assert_eq!(
            task.status,
            TaskStatus::Pending,
            "only pending tasks can be enqueued"
        );

        if self.should_inject(FaultType::QueueEnqueueFail) {
            return Err(StorageError::write("injected fault: enqueue failed"));
        }

        let mut inner = self.inner.lock().unwrap();
        inner.order.retain(|id| id != &task.id);
        inner.order.push_back(task.id.clone());
        inner.tasks.insert(task.id.clone(), task.clone());

        // Postcondition: in line exactly once
        assert_eq!(
            inner.order.iter().filter(|id| *id == &task.id).count(),
            1,
            "task must be in line exactly once"
        );
        Ok(())
    }

    async fn dequeue(&self) -> StorageResult<Option<Task>> {
        if self.should_inject(FaultType::QueueDequeueFail) {
            return Err(StorageError::read("injected fault: dequeue failed"));
        }

        let mut inner = self.inner.lock().unwrap();
        while let Some(id) = inner.order.pop_front() {
            // The record may have been overwritten since it queued; skip
            // anything no longer pending.
            if let Some(task) = inner.tasks.get(&id) {
                if task.status == TaskStatus::Pending {
                    return Ok(Some(task.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn update(&self, task: &Task) -> StorageResult<()> {
        if self.should_inject(FaultType::QueueUpdateFail) {
            return Err(StorageError::write("injected fault: update failed"));
        }

        let mut inner = self.inner.lock().unwrap();
        if !inner.tasks.contains_key(&task.id) {
            return Err(StorageError::not_found(&task.id));
        }
        inner.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, task_id: &str) -> StorageResult<Option<Task>> {
        if task_id.is_empty() {
            return Err(StorageError::validation("task_id must not be empty"));
        }
        let inner = self.inner.lock().unwrap();
        Ok(inner.tasks.get(task_id).cloned())
    }

    async fn list(&self, character_id: Option<&str>, limit: usize) -> StorageResult<Vec<Task>> {
        if limit == 0 || limit > TASK_LIST_COUNT_MAX {
            return Err(StorageError::validation(format!(
                "limit must be 1-{TASK_LIST_COUNT_MAX}"
            )));
        }

        let inner = self.inner.lock().unwrap();
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| character_id.is_none_or(|c| t.character_id == c))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn delete(&self, task_id: &str) -> StorageResult<()> {
        if task_id.is_empty() {
            return Err(StorageError::validation("task_id must not be empty"));
        }
        if self.should_inject(FaultType::QueueUpdateFail) {
            return Err(StorageError::write("injected fault: delete failed"));
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.tasks.remove(task_id).is_none() {
            return Err(StorageError::not_found(task_id));
        }
        inner.order.retain(|id| id != task_id);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
