//! Task Queue - Asynchronous Embedding Pipeline
//!
//! `TigerStyle`: Explicit state machine, bounded retries, FIFO fairness.
//!
//! # Lifecycle
//!
//! ```text
//! pending --dequeue--> processing --ok--> completed
//!    ^                     |
//!    |   retryable error,  |  non-retryable error
//!    +---retries left------+  or retries exhausted --> failed
//! ```
//!
//! Tasks carry an opaque JSON payload with a `type` discriminator. The worker
//! understands `embedding` payloads; anything else is completed as-is with the
//! raw payload echoed back, so unknown producers never wedge the queue.

mod queue;
mod worker;

pub use queue::{SimTaskQueue, TaskQueue};
pub use worker::{
    ExchangePush, ExchangeRequest, ExchangeResponse, TaskService, TaskWorker, WorkerReport,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::constants::{
    CHARACTER_ID_BYTES_MAX, EMBEDDING_MODEL_DEFAULT, TASK_PAYLOAD_BYTES_MAX,
    TASK_RETRY_COUNT_MAX_DEFAULT,
};
use crate::storage::{MemoryLayer, StorageError};

// =============================================================================
// Error Types
// =============================================================================

/// Errors from task operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    /// Task failed validation
    #[error("validation error: {message}")]
    Validation {
        /// What was invalid
        message: String,
    },

    /// Task not found
    #[error("task not found: {id}")]
    NotFound {
        /// Task id
        id: String,
    },

    /// The queue backend failed
    #[error("queue error: {message}")]
    Queue {
        /// Error message
        message: String,
    },
}

impl From<StorageError> for TaskError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { id } => TaskError::NotFound { id },
            StorageError::Validation { message } => TaskError::Validation { message },
            other => TaskError::Queue {
                message: other.to_string(),
            },
        }
    }
}

// =============================================================================
// Task Status
// =============================================================================

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, waiting for a worker
    Pending,
    /// Claimed by a worker
    Processing,
    /// Finished successfully; `result` is set
    Completed,
    /// Finished unsuccessfully; `error` is set
    Failed,
}

impl TaskStatus {
    /// Terminal states never transition again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Lowercase name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

// =============================================================================
// Payloads
// =============================================================================

fn default_model() -> String {
    EMBEDDING_MODEL_DEFAULT.to_string()
}

fn default_layer() -> MemoryLayer {
    MemoryLayer::Working
}

/// Payload of an `embedding` task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingPayload {
    /// Text to embed
    pub text: String,
    /// Model to embed with
    #[serde(default = "default_model")]
    pub model: String,
    /// Persist the embedded text as a retrievable fragment
    #[serde(default)]
    pub store_in_db: bool,
    /// Layer for the stored fragment
    #[serde(default = "default_layer")]
    pub layer: MemoryLayer,
    /// Metadata for the stored fragment
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl EmbeddingPayload {
    /// Payload that embeds and persists `text` at the working layer.
    #[must_use]
    pub fn store(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: default_model(),
            store_in_db: true,
            layer: MemoryLayer::Working,
            metadata: Map::new(),
        }
    }

    /// Payload that only computes vectors for `text`.
    #[must_use]
    pub fn embed_only(text: impl Into<String>) -> Self {
        Self {
            store_in_db: false,
            ..Self::store(text)
        }
    }
}

/// The payload kinds the worker knows how to dispatch.
///
/// Internally tagged on `type`; payloads with an unrecognized tag fail to
/// parse here and are completed verbatim by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Generate vectors for text, optionally persisting a fragment
    Embedding(EmbeddingPayload),
}

// =============================================================================
// Task
// =============================================================================

/// One unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task id
    pub id: String,
    /// Character the task belongs to
    pub character_id: String,
    /// Opaque payload with a `type` discriminator
    pub payload: Value,
    /// Lifecycle state
    pub status: TaskStatus,
    /// Retries consumed so far
    pub retry_count: u32,
    /// Retry budget
    pub max_retries: u32,
    /// Set when completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Set when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// When a worker first claimed the task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Set exactly when the task reaches a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Last transition time
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a pending task with the default retry budget.
    ///
    /// # Errors
    /// Returns `TaskError::Validation` for an empty character id, an
    /// oversized or non-object payload, a `type` the worker cannot dispatch,
    /// or an `embedding` payload with empty text.
    pub fn new(
        character_id: impl Into<String>,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<Self, TaskError> {
        Self::with_max_retries(character_id, payload, TASK_RETRY_COUNT_MAX_DEFAULT, now)
    }

    /// Create a pending task with an explicit retry budget.
    ///
    /// # Errors
    /// Same validation as [`Task::new`].
    pub fn with_max_retries(
        character_id: impl Into<String>,
        payload: Value,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, TaskError> {
        let character_id = character_id.into();
        if character_id.is_empty() || character_id.len() > CHARACTER_ID_BYTES_MAX {
            return Err(TaskError::Validation {
                message: format!(
                    "character_id must be 1-{CHARACTER_ID_BYTES_MAX} bytes"
                ),
            });
        }

        let Some(object) = payload.as_object() else {
            return Err(TaskError::Validation {
                message: "payload must be a JSON object".to_string(),
            });
        };
        if !object.get("type").is_some_and(Value::is_string) {
            return Err(TaskError::Validation {
                message: "payload must carry a string `type`".to_string(),
            });
        }
        let serialized_len = serde_json::to_string(&payload)
            .map_err(|e| TaskError::Validation {
                message: format!("payload not serializable: {e}"),
            })?
            .len();
        if serialized_len > TASK_PAYLOAD_BYTES_MAX {
            return Err(TaskError::Validation {
                message: format!("payload exceeds {TASK_PAYLOAD_BYTES_MAX} bytes"),
            });
        }

        // Creation only accepts kinds a worker can dispatch. Unknown kinds
        // can still enter the queue from external producers via the exchange
        // protocol; the worker completes those verbatim.
        match serde_json::from_value::<TaskKind>(payload.clone()) {
            Ok(TaskKind::Embedding(embedding)) => {
                if embedding.text.is_empty() {
                    return Err(TaskError::Validation {
                        message: "embedding text must not be empty".to_string(),
                    });
                }
            }
            Err(err) => {
                return Err(TaskError::Validation {
                    message: format!("unsupported task payload: {err}"),
                });
            }
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            character_id,
            payload,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        })
    }

    /// Whether another retry fits in the budget.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Claim the task for processing.
    ///
    /// # Panics
    /// Panics unless the task is pending.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        assert_eq!(
            self.status,
            TaskStatus::Pending,
            "only pending tasks can be claimed"
        );
        self.status = TaskStatus::Processing;
        self.started_at.get_or_insert(now);
        self.updated_at = now;
    }

    /// Finish the task successfully.
    ///
    /// # Panics
    /// Panics unless the task is processing.
    pub fn complete(&mut self, result: Value, now: DateTime<Utc>) {
        assert_eq!(
            self.status,
            TaskStatus::Processing,
            "only processing tasks can complete"
        );
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(now);
        self.updated_at = now;

        // Postcondition: completed_at set iff terminal
        assert!(self.completed_at.is_some(), "terminal task needs completed_at");
    }

    /// Finish the task unsuccessfully.
    ///
    /// # Panics
    /// Panics unless the task is processing.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        assert_eq!(
            self.status,
            TaskStatus::Processing,
            "only processing tasks can fail"
        );
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Return the task to the queue after a transient failure.
    ///
    /// # Panics
    /// Panics unless the task is processing and has retry budget left.
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) {
        assert_eq!(
            self.status,
            TaskStatus::Processing,
            "only processing tasks can be retried"
        );
        assert!(self.can_retry(), "retry budget exhausted");

        self.retry_count += 1;
        self.status = TaskStatus::Pending;
        self.updated_at = now;

        // Postcondition
        assert!(self.retry_count <= self.max_retries, "retry count bounded");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dst::SimClock;
    use serde_json::json;

    fn embedding_payload(text: &str) -> Value {
        serde_json::to_value(TaskKind::Embedding(EmbeddingPayload::store(text))).unwrap()
    }

    #[test]
    fn test_new_task_is_pending() {
        let clock = SimClock::at_ms(1000);
        let task = Task::new("char-1", embedding_payload("hello"), clock.now()).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.max_retries, TASK_RETRY_COUNT_MAX_DEFAULT);
        assert!(task.result.is_none());
        assert!(task.error.is_none());
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_payload_wire_format() {
        let payload = embedding_payload("hi");
        assert_eq!(payload["type"], "embedding");
        assert_eq!(payload["storeInDb"], true);
        assert_eq!(payload["layer"], "working");
    }

    #[test]
    fn test_payload_defaults_on_parse() {
        let kind: TaskKind =
            serde_json::from_value(json!({"type": "embedding", "text": "hi"})).unwrap();
        let TaskKind::Embedding(payload) = kind;
        assert_eq!(payload.model, EMBEDDING_MODEL_DEFAULT);
        assert!(!payload.store_in_db);
        assert_eq!(payload.layer, MemoryLayer::Working);
    }

    #[test]
    fn test_validation_rejects_bad_payloads() {
        let clock = SimClock::new();
        let now = clock.now();

        assert!(matches!(
            Task::new("", embedding_payload("hi"), now),
            Err(TaskError::Validation { .. })
        ));
        assert!(matches!(
            Task::new("char-1", json!("not an object"), now),
            Err(TaskError::Validation { .. })
        ));
        assert!(matches!(
            Task::new("char-1", json!({"text": "no type"}), now),
            Err(TaskError::Validation { .. })
        ));
        assert!(matches!(
            Task::new("char-1", json!({"type": "embedding", "text": ""}), now),
            Err(TaskError::Validation { .. })
        ));
    }

    #[test]
    fn test_unsupported_type_rejected_at_creation() {
        let clock = SimClock::new();
        assert!(matches!(
            Task::new("char-1", json!({"type": "mystery", "x": 1}), clock.now()),
            Err(TaskError::Validation { .. })
        ));
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let clock = SimClock::at_ms(1000);
        let mut task = Task::new("char-1", embedding_payload("hi"), clock.now()).unwrap();

        clock.advance_secs(1);
        task.mark_processing(clock.now());
        assert_eq!(task.status, TaskStatus::Processing);
        assert_eq!(task.started_at, Some(clock.now()));
        assert!(task.completed_at.is_none());

        clock.advance_secs(1);
        task.complete(json!({"ok": true}), clock.now());
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.status.is_terminal());
        assert_eq!(task.completed_at, Some(clock.now()));
        assert_eq!(task.updated_at, clock.now());
    }

    #[test]
    fn test_retry_cycle() {
        let clock = SimClock::new();
        let mut task =
            Task::with_max_retries("char-1", embedding_payload("hi"), 2, clock.now()).unwrap();

        for attempt in 1..=2 {
            task.mark_processing(clock.now());
            assert!(task.can_retry());
            task.reset_for_retry(clock.now());
            assert_eq!(task.retry_count, attempt);
            assert_eq!(task.status, TaskStatus::Pending);
        }

        task.mark_processing(clock.now());
        assert!(!task.can_retry());
        task.fail("gave up", clock.now());
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("gave up"));
    }

    #[test]
    #[should_panic(expected = "only pending tasks can be claimed")]
    fn test_cannot_claim_twice() {
        let clock = SimClock::new();
        let mut task = Task::new("char-1", embedding_payload("hi"), clock.now()).unwrap();
        task.mark_processing(clock.now());
        task.mark_processing(clock.now());
    }

    #[test]
    #[should_panic(expected = "retry budget exhausted")]
    fn test_cannot_retry_past_budget() {
        let clock = SimClock::new();
        let mut task =
            Task::with_max_retries("char-1", embedding_payload("hi"), 0, clock.now()).unwrap();
        task.mark_processing(clock.now());
        task.reset_for_retry(clock.now());
    }

    #[test]
    fn test_task_serde_round_trip() {
        let clock = SimClock::at_ms(42_000);
        let task = Task::new("char-1", embedding_payload("hi"), clock.now()).unwrap();
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["characterId"], "char-1");
        assert_eq!(json["status"], "pending");
        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }
}
