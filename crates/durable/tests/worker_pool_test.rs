//! Worker pool behaviour against the in-memory store
//!
//! Run with: cargo test -p docket-durable --test worker_pool_test

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docket_core::{
    HandlerError, HandlerRegistry, QueuedJob, RetryPolicy, StatusWrite, TaskHandler, TaskKind,
    TaskOutput, TaskStatus,
};
use docket_durable::persistence::{InMemoryStore, StatusStore, TaskQueue};
use docket_durable::worker::{PollerConfig, WorkerPool, WorkerPoolConfig};
use serde_json::{json, Value};
use uuid::Uuid;

// ============================================
// Helpers
// ============================================

fn fast_config() -> WorkerPoolConfig {
    WorkerPoolConfig::new()
        .with_worker_id("test-worker")
        .with_max_concurrency(2)
        .with_poller(
            PollerConfig::new()
                .with_min_interval(Duration::from_millis(10))
                .with_max_interval(Duration::from_millis(50)),
        )
        .with_store_retry(
            RetryPolicy::exponential().with_initial_interval(Duration::from_millis(5)),
        )
        .with_shutdown_timeout(Duration::from_secs(5))
}

fn pool(store: &Arc<InMemoryStore>, registry: HandlerRegistry, config: WorkerPoolConfig) -> WorkerPool {
    WorkerPool::new(store.clone(), store.clone(), Arc::new(registry), config)
}

fn fallback_registry() -> HandlerRegistry {
    HandlerRegistry::generative(None, RetryPolicy::no_retry(), Duration::from_secs(1))
}

/// Publish like ingestion does: enqueue, then record "queued"
async fn submit(store: &InMemoryStore, kind: TaskKind, payload: Value) -> Uuid {
    let job = QueuedJob {
        task_id: Uuid::now_v7(),
        kind,
        payload,
        correlation_id: format!("corr-{}", Uuid::now_v7()),
    };
    store.publish(job.clone()).await.unwrap();
    store.upsert(StatusWrite::queued(&job)).await.unwrap();
    job.task_id
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Handler that sleeps and records the peak number of concurrent runs.
///
/// With a store attached it also records the peak number of `working`
/// records seen while it runs.
#[derive(Default)]
struct SlowHandler {
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    store: Option<Arc<InMemoryStore>>,
    peak_working: AtomicUsize,
}

impl SlowHandler {
    fn observing(store: &Arc<InMemoryStore>) -> Self {
        Self {
            store: Some(store.clone()),
            ..Self::default()
        }
    }

    fn sample_working(&self) {
        if let Some(store) = &self.store {
            let working = store.count_by_status(TaskStatus::Working);
            self.peak_working.fetch_max(working, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl TaskHandler for SlowHandler {
    async fn run(&self, payload: &Value) -> Result<TaskOutput, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.sample_working();
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.sample_working();
        self.running.fetch_sub(1, Ordering::SeqCst);

        Ok(TaskOutput {
            provider: "test".to_string(),
            model: "slow".to_string(),
            output: payload["topic"].as_str().unwrap_or_default().to_string(),
            note: None,
        })
    }
}

struct FailingHandler;

#[async_trait]
impl TaskHandler for FailingHandler {
    async fn run(&self, _payload: &Value) -> Result<TaskOutput, HandlerError> {
        Err(HandlerError::Unprocessable("contacts are unreadable".to_string()))
    }
}

struct PanickingHandler;

#[async_trait]
impl TaskHandler for PanickingHandler {
    async fn run(&self, _payload: &Value) -> Result<TaskOutput, HandlerError> {
        panic!("boom");
    }
}

// ============================================
// Tests
// ============================================

#[test_log::test(tokio::test)]
async fn test_summarize_completes_through_fallback() {
    let store = Arc::new(InMemoryStore::new());
    let text = "The quick brown fox jumps over the lazy dog repeatedly across the meadow";
    let task_id = submit(&store, TaskKind::Summarize, json!({ "text": text })).await;

    let pool = pool(&store, fallback_registry(), fast_config());
    pool.start().unwrap();
    wait_until("completion", || store.count_by_status(TaskStatus::Completed) == 1).await;
    pool.shutdown().await.unwrap();

    let record = store.get(task_id).await.unwrap().unwrap();
    assert_eq!(record.status, TaskStatus::Completed);
    assert_eq!(
        record.result,
        Some(json!({"provider": "fallback", "model": "local", "output": text}))
    );
    assert!(record.error.is_none());
    assert_eq!(store.acknowledged_count(), 1);
}

#[test_log::test(tokio::test)]
async fn test_concurrency_is_bounded() {
    let store = Arc::new(InMemoryStore::new());
    let handler = Arc::new(SlowHandler::observing(&store));
    let registry = HandlerRegistry::new().with_handler(TaskKind::Checklist, handler.clone());

    for i in 0..6 {
        submit(&store, TaskKind::Checklist, json!({ "topic": format!("t{}", i) })).await;
    }

    let pool = pool(&store, registry, fast_config());
    pool.start().unwrap();
    wait_until("all completed", || store.count_by_status(TaskStatus::Completed) == 6).await;
    pool.shutdown().await.unwrap();

    assert_eq!(handler.calls.load(Ordering::SeqCst), 6);
    assert!(handler.peak.load(Ordering::SeqCst) <= 2);
    // Jobs between their working and terminal writes never outnumber workers
    let peak_working = handler.peak_working.load(Ordering::SeqCst);
    assert!(peak_working >= 1);
    assert!(peak_working <= 2, "saw {} working records", peak_working);
    assert_eq!(store.acknowledged_count(), 6);
}

#[test_log::test(tokio::test)]
async fn test_handler_error_marks_failed_and_acknowledges() {
    let store = Arc::new(InMemoryStore::new());
    let registry = HandlerRegistry::new().with_handler(TaskKind::ExtractContacts, Arc::new(FailingHandler));
    let task_id = submit(&store, TaskKind::ExtractContacts, json!({"text": "???"})).await;

    let pool = pool(&store, registry, fast_config());
    pool.start().unwrap();
    wait_until("failure", || store.count_by_status(TaskStatus::Failed) == 1).await;
    pool.shutdown().await.unwrap();

    let record = store.get(task_id).await.unwrap().unwrap();
    assert!(record.result.is_none());
    assert_eq!(
        record.error.as_deref(),
        Some("unprocessable payload: contacts are unreadable")
    );
    assert_eq!(store.acknowledged_count(), 1);
}

#[test_log::test(tokio::test)]
async fn test_handler_panic_marks_failed() {
    let store = Arc::new(InMemoryStore::new());
    let registry = HandlerRegistry::new().with_handler(TaskKind::DraftEmail, Arc::new(PanickingHandler));
    let task_id = submit(&store, TaskKind::DraftEmail, json!({"topic": "offsite"})).await;

    let pool = pool(&store, registry, fast_config());
    pool.start().unwrap();
    wait_until("failure", || store.count_by_status(TaskStatus::Failed) == 1).await;
    pool.shutdown().await.unwrap();

    let record = store.get(task_id).await.unwrap().unwrap();
    assert_eq!(record.error.as_deref(), Some("handler aborted: boom"));
    assert_eq!(store.acknowledged_count(), 1);
}

#[test_log::test(tokio::test)]
async fn test_missing_handler_marks_failed() {
    let store = Arc::new(InMemoryStore::new());
    let task_id = submit(&store, TaskKind::Checklist, json!({"topic": "x"})).await;

    let pool = pool(&store, HandlerRegistry::new(), fast_config());
    pool.start().unwrap();
    wait_until("failure", || store.count_by_status(TaskStatus::Failed) == 1).await;
    pool.shutdown().await.unwrap();

    let record = store.get(task_id).await.unwrap().unwrap();
    assert!(record.error.unwrap().contains("checklist"));
}

#[test_log::test(tokio::test)]
async fn test_crashed_worker_job_is_redelivered_after_lease() {
    let store = Arc::new(InMemoryStore::new());
    let task_id = submit(&store, TaskKind::Checklist, json!({"topic": "release"})).await;

    // A worker claims the job and dies without acknowledging
    let lost = store
        .claim("crashed-worker", Duration::from_millis(200))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lost.attempt, 1);

    let pool = pool(&store, fallback_registry(), fast_config());
    pool.start().unwrap();
    wait_until("redelivery", || store.count_by_status(TaskStatus::Completed) == 1).await;
    pool.shutdown().await.unwrap();

    let record = store.get(task_id).await.unwrap().unwrap();
    assert_eq!(record.result.unwrap()["output"], "- Step 1\n- Step 2\n- Step 3");
    assert_eq!(store.acknowledged_count(), 1);
}

#[test_log::test(tokio::test)]
async fn test_failed_status_write_releases_job_for_redelivery() {
    let store = Arc::new(InMemoryStore::new());
    let task_id = submit(&store, TaskKind::Summarize, json!({"text": "short"})).await;

    // No store retries: the first "working" write fails and the job goes back
    store.fail_next_upserts(1);
    let config = fast_config().with_store_retry(RetryPolicy::no_retry());

    let pool = pool(&store, fallback_registry(), config);
    pool.start().unwrap();
    wait_until("completion", || store.count_by_status(TaskStatus::Completed) == 1).await;
    pool.shutdown().await.unwrap();

    let record = store.get(task_id).await.unwrap().unwrap();
    assert_eq!(record.result.unwrap()["output"], "short");
    assert_eq!(store.acknowledged_count(), 1);
}

#[test_log::test(tokio::test)]
async fn test_skip_terminal_redelivery() {
    let store = Arc::new(InMemoryStore::new());
    let handler = Arc::new(SlowHandler::default());
    let registry = HandlerRegistry::new().with_handler(TaskKind::Checklist, handler.clone());

    let job = QueuedJob {
        task_id: Uuid::now_v7(),
        kind: TaskKind::Checklist,
        payload: json!({"topic": "done already"}),
        correlation_id: "corr".to_string(),
    };
    store.publish(job.clone()).await.unwrap();
    store
        .upsert(StatusWrite::completed(&job, json!({"output": "first run"})))
        .await
        .unwrap();

    // First delivery finished the work but its lease lapsed before the ack
    store.claim("slow-worker", Duration::ZERO).await.unwrap().unwrap();

    let config = fast_config().with_skip_terminal_redelivery(true);
    let pool = pool(&store, registry, config);
    pool.start().unwrap();
    wait_until("acknowledgement", || store.acknowledged_count() == 1).await;
    pool.shutdown().await.unwrap();

    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    let record = store.get(job.task_id).await.unwrap().unwrap();
    assert_eq!(record.result, Some(json!({"output": "first run"})));
}

#[test_log::test(tokio::test)]
async fn test_failed_redelivery_check_runs_the_job() {
    let store = Arc::new(InMemoryStore::new());
    let handler = Arc::new(SlowHandler::default());
    let registry = HandlerRegistry::new().with_handler(TaskKind::Checklist, handler.clone());

    let job = QueuedJob {
        task_id: Uuid::now_v7(),
        kind: TaskKind::Checklist,
        payload: json!({"topic": "rerun"}),
        correlation_id: "corr".to_string(),
    };
    store.publish(job.clone()).await.unwrap();
    store
        .upsert(StatusWrite::completed(&job, json!({"output": "first run"})))
        .await
        .unwrap();
    store.claim("slow-worker", Duration::ZERO).await.unwrap().unwrap();

    // The terminal-status lookup fails, so the executor cannot tell the
    // task is done and must run it rather than drop the delivery
    store.fail_next_gets(1);
    let config = fast_config().with_skip_terminal_redelivery(true);
    let pool = pool(&store, registry, config);
    pool.start().unwrap();
    wait_until("acknowledgement", || store.acknowledged_count() == 1).await;
    pool.shutdown().await.unwrap();

    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.pending_count(), 0);
    assert_eq!(store.claimed_count(), 0);
    let record = store.get(job.task_id).await.unwrap().unwrap();
    assert_eq!(record.status, TaskStatus::Completed);
}

#[test_log::test(tokio::test)]
async fn test_shutdown_waits_for_in_flight_jobs() {
    let store = Arc::new(InMemoryStore::new());
    let handler = Arc::new(SlowHandler::default());
    let registry = HandlerRegistry::new().with_handler(TaskKind::Checklist, handler.clone());
    submit(&store, TaskKind::Checklist, json!({"topic": "x"})).await;

    let pool = pool(&store, registry, fast_config());
    pool.start().unwrap();
    wait_until("job start", || handler.calls.load(Ordering::SeqCst) == 1).await;

    pool.shutdown().await.unwrap();
    assert_eq!(pool.active_count(), 0);
    assert_eq!(store.count_by_status(TaskStatus::Completed), 1);
}
