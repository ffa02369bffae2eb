//! Integration Tests for the Embedding Task Pipeline
//!
//! End-to-end workflow validation:
//! - create_task -> worker -> completed, fragment retrievable
//! - Transient faults burn retries, then complete or fail terminally
//! - Exchange protocol: external consumers pull work and push results

use std::sync::Arc;

use serde_json::json;

use engram_memory::dst::{FaultConfig, FaultInjector, FaultType, SimClock};
use engram_memory::retrieval::{QueryVectors, RetrievalEngine};
use engram_memory::scoring::HybridScorer;
use engram_memory::storage::{SimAccessStore, SimVectorStore};
use engram_memory::task::{
    EmbeddingPayload, ExchangePush, ExchangeRequest, SimTaskQueue, Task, TaskKind, TaskQueue,
    TaskService, TaskStatus, TaskWorker,
};
use engram_memory::{EmbeddingProvider, SimEmbeddingProvider};

const MODEL: &str = engram_memory::constants::EMBEDDING_MODEL_DEFAULT;
const MAX_RETRIES: u32 = engram_memory::constants::TASK_RETRY_COUNT_MAX_DEFAULT;

struct Pipeline {
    clock: SimClock,
    queue: Arc<SimTaskQueue>,
    service: TaskService<SimTaskQueue>,
    worker: TaskWorker<SimTaskQueue, SimEmbeddingProvider, SimVectorStore, SimAccessStore>,
    engine: Arc<RetrievalEngine<SimVectorStore, SimAccessStore>>,
    provider: Arc<SimEmbeddingProvider>,
}

fn make_pipeline(provider: SimEmbeddingProvider) -> Pipeline {
    let clock = SimClock::at_ms(1_000_000_000);
    let queue = Arc::new(SimTaskQueue::new());
    let provider = Arc::new(provider);
    let engine = Arc::new(RetrievalEngine::new(
        Arc::new(SimVectorStore::new()),
        Arc::new(SimAccessStore::new()),
        HybridScorer::default(),
        clock.clone(),
    ));
    let worker = TaskWorker::new(
        Arc::clone(&queue),
        Arc::clone(&provider),
        Arc::clone(&engine),
        clock.clone(),
    );
    let service = TaskService::new(Arc::clone(&queue), clock.clone());
    Pipeline {
        clock,
        queue,
        service,
        worker,
        engine,
        provider,
    }
}

fn store_payload(text: &str) -> serde_json::Value {
    serde_json::to_value(TaskKind::Embedding(EmbeddingPayload::store(text))).unwrap()
}

// =============================================================================
// Happy Path Tests
// =============================================================================

#[tokio::test]
async fn test_embedding_task_end_to_end() {
    let pipeline = make_pipeline(SimEmbeddingProvider::new(42));

    let task = pipeline
        .service
        .create_task("alice", store_payload("hello from the queue"))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    let report = pipeline.worker.tick().await.unwrap();
    assert_eq!(report.completed, 1);

    let done = pipeline.service.get_task(&task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    let result = done.result.expect("completed task carries a result");
    let fragment_id = result["fragmentId"].as_str().unwrap();
    assert_eq!(result["layer"], "working");

    // The stored fragment comes back for the same text's vectors.
    let embedding = pipeline
        .provider
        .generate("hello from the queue", MODEL)
        .await
        .unwrap();
    let results = pipeline
        .engine
        .retrieve("alice", &QueryVectors::dense(embedding.dense), 5)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].fragment.id, fragment_id);
}

#[tokio::test]
async fn test_backlog_processes_in_order() {
    let pipeline = make_pipeline(SimEmbeddingProvider::new(42));

    let mut ids = Vec::new();
    for i in 0..5 {
        let task = pipeline
            .service
            .create_task("alice", store_payload(&format!("memory number {i}")))
            .await
            .unwrap();
        ids.push(task.id);
    }

    for _ in 0..5 {
        assert_eq!(pipeline.worker.tick().await.unwrap().completed, 1);
    }
    assert_eq!(pipeline.worker.tick().await.unwrap().processed, 0);

    for id in &ids {
        let task = pipeline.service.get_task(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }
}

// =============================================================================
// Retry Tests
// =============================================================================

#[tokio::test]
async fn test_transient_faults_recover_within_budget() {
    // Two timeouts, then the provider recovers.
    let injector = Arc::new(
        FaultInjector::new(7).with_fault(
            FaultConfig::new(FaultType::EmbeddingTimeout, 1.0).with_max_injections(2),
        ),
    );
    let pipeline = make_pipeline(SimEmbeddingProvider::with_faults(42, injector));

    let task = pipeline
        .service
        .create_task("alice", store_payload("eventually embedded"))
        .await
        .unwrap();

    let mut completed = 0;
    for _ in 0..=MAX_RETRIES {
        completed += pipeline.worker.tick().await.unwrap().completed;
    }
    assert_eq!(completed, 1);

    let done = pipeline.service.get_task(&task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.retry_count, 2);
}

#[tokio::test]
async fn test_persistent_faults_fail_after_budget() {
    let injector = Arc::new(
        FaultInjector::new(7).with_fault(FaultConfig::new(FaultType::EmbeddingTimeout, 1.0)),
    );
    let pipeline = make_pipeline(SimEmbeddingProvider::with_faults(42, injector));

    let task = pipeline
        .service
        .create_task("alice", store_payload("never embedded"))
        .await
        .unwrap();

    for _ in 0..MAX_RETRIES {
        assert_eq!(pipeline.worker.tick().await.unwrap().retried, 1);
    }
    assert_eq!(pipeline.worker.tick().await.unwrap().failed, 1);
    assert_eq!(pipeline.worker.tick().await.unwrap().processed, 0);

    let done = pipeline.service.get_task(&task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.retry_count, MAX_RETRIES);
    assert!(done.error.is_some());

    // Nothing was persisted for the failed task.
    let embedding = SimEmbeddingProvider::new(42)
        .generate("never embedded", MODEL)
        .await
        .unwrap();
    let results = pipeline
        .engine
        .retrieve("alice", &QueryVectors::dense(embedding.dense), 5)
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_failed_task_does_not_block_the_queue() {
    let injector = Arc::new(
        FaultInjector::new(7).with_fault(FaultConfig::new(FaultType::EmbeddingFail, 1.0)),
    );
    let flaky = make_pipeline(SimEmbeddingProvider::with_faults(42, injector));

    let doomed = flaky
        .service
        .create_task("alice", store_payload("doomed"))
        .await
        .unwrap();
    // An unknown kind from an external producer, behind the doomed task.
    let mut unknown = Task::new("alice", store_payload("stand-in"), flaky.clock.now()).unwrap();
    unknown.payload = json!({"type": "summarize", "window": 3});
    flaky.queue.enqueue(&unknown).await.unwrap();

    // Drain until idle: the doomed task burns its budget, the unknown task
    // completes verbatim in between retries.
    for _ in 0..20 {
        if flaky.worker.tick().await.unwrap().processed == 0 {
            break;
        }
    }

    assert_eq!(
        flaky.service.get_task(&doomed.id).await.unwrap().status,
        TaskStatus::Failed
    );
    assert_eq!(
        flaky.service.get_task(&unknown.id).await.unwrap().status,
        TaskStatus::Completed
    );
}

// =============================================================================
// Exchange Protocol Tests
// =============================================================================

#[tokio::test]
async fn test_exchange_round_trip() {
    let pipeline = make_pipeline(SimEmbeddingProvider::new(42));

    let task = pipeline
        .service
        .create_task("alice", store_payload("remote work"))
        .await
        .unwrap();

    // Consumer pulls the task.
    let pulled = pipeline
        .service
        .exchange(ExchangeRequest {
            pushes: Vec::new(),
            pull_count: 10,
        })
        .await
        .unwrap();
    assert_eq!(pulled.tasks.len(), 1);
    assert_eq!(pulled.tasks[0].id, task.id);
    assert_eq!(pulled.tasks[0].status, TaskStatus::Processing);

    // A second pull finds nothing: the task is claimed.
    let empty = pipeline
        .service
        .exchange(ExchangeRequest {
            pushes: Vec::new(),
            pull_count: 10,
        })
        .await
        .unwrap();
    assert!(empty.tasks.is_empty());

    // Consumer pushes its result and the task settles.
    let settled = pipeline
        .service
        .exchange(ExchangeRequest {
            pushes: vec![ExchangePush {
                task_id: task.id.clone(),
                result: Some(json!({"fragmentId": "remote-1"})),
                error: None,
            }],
            pull_count: 0,
        })
        .await
        .unwrap();
    assert_eq!(settled.accepted, 1);

    let done = pipeline.service.get_task(&task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result.unwrap()["fragmentId"], "remote-1");
}

#[tokio::test]
async fn test_exchange_error_retries_until_exhausted() {
    let pipeline = make_pipeline(SimEmbeddingProvider::new(42));

    let task = pipeline
        .service
        .create_task("alice", store_payload("unreliable consumer"))
        .await
        .unwrap();

    // The consumer keeps failing the task until its budget runs out.
    for attempt in 1..=MAX_RETRIES {
        let pulled = pipeline
            .service
            .exchange(ExchangeRequest {
                pushes: Vec::new(),
                pull_count: 1,
            })
            .await
            .unwrap();
        assert_eq!(pulled.tasks.len(), 1, "attempt {attempt} should claim");

        pipeline
            .service
            .exchange(ExchangeRequest {
                pushes: vec![ExchangePush {
                    task_id: task.id.clone(),
                    result: None,
                    error: Some(format!("attempt {attempt} crashed")),
                }],
                pull_count: 0,
            })
            .await
            .unwrap();
        assert_eq!(
            pipeline.service.get_task(&task.id).await.unwrap().status,
            TaskStatus::Pending
        );
    }

    // Final attempt: no budget left, the pushed error is terminal.
    pipeline
        .service
        .exchange(ExchangeRequest {
            pushes: Vec::new(),
            pull_count: 1,
        })
        .await
        .unwrap();
    pipeline
        .service
        .exchange(ExchangeRequest {
            pushes: vec![ExchangePush {
                task_id: task.id.clone(),
                result: None,
                error: Some("final crash".to_string()),
            }],
            pull_count: 0,
        })
        .await
        .unwrap();

    let done = pipeline.service.get_task(&task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.retry_count, MAX_RETRIES);
    assert_eq!(done.error.as_deref(), Some("final crash"));
}

#[tokio::test]
async fn test_worker_and_exchange_share_the_queue() {
    let pipeline = make_pipeline(SimEmbeddingProvider::new(42));

    pipeline
        .service
        .create_task("alice", store_payload("for the worker"))
        .await
        .unwrap();
    pipeline
        .service
        .create_task("alice", store_payload("for the consumer"))
        .await
        .unwrap();

    // Worker takes the first, an external consumer pulls the second.
    assert_eq!(pipeline.worker.tick().await.unwrap().processed, 1);
    let pulled = pipeline
        .service
        .exchange(ExchangeRequest {
            pushes: Vec::new(),
            pull_count: 10,
        })
        .await
        .unwrap();
    assert_eq!(pulled.tasks.len(), 1);

    let tasks = pipeline.service.list_tasks(Some("alice"), 10).await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks
        .iter()
        .all(|t| t.status == TaskStatus::Completed || t.status == TaskStatus::Processing));
}
