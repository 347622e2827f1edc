use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use finp2p_common::time::current_time_ms;
use tokio::sync::{Mutex, Notify, Semaphore};
use tracing::{debug, warn};

use crate::record::{ConfirmationInput, ConfirmationStatus};
use crate::store::ConfirmationRecordStore;

/// Dispatch urgency (spec §4.5). Ordered so `High < Medium < Low`: the
/// derived `Ord` is exactly the "smaller runs first" comparison the queue
/// needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    High = 0,
    Medium = 1,
    Low = 2,
}

/// Bound before a task is considered failed for good.
const DEFAULT_MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF_BASE_MS: u64 = 1_000;
const IDLE_POLL: Duration = Duration::from_millis(100);
/// Confirmation task timeout (spec §5, §7): aborts a hung record write
/// rather than holding the worker slot forever.
const DEFAULT_PROCESSING_TIMEOUT_MS: u64 = 30_000;

#[derive(Clone)]
struct QueuedTask {
    task_id: String,
    input: ConfirmationInput,
    priority: Priority,
    retry_count: u32,
    max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct ConfirmationResult {
    pub task_id: String,
    pub transfer_id: String,
    pub outcome: ConfirmationOutcome,
    pub completed_at: u64,
}

#[derive(Debug, Clone)]
pub enum ConfirmationOutcome {
    Success { confirmation_id: String },
    Failed { reason: String },
}

#[derive(Default)]
struct ProcessorState {
    queue: VecDeque<QueuedTask>,
    active: HashMap<String, ()>,
    completed: HashMap<String, ConfirmationResult>,
}

pub struct ProcessorConfig {
    pub max_concurrency: usize,
    pub batch_size: usize,
    pub default_max_retries: u32,
    pub processing_timeout_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { max_concurrency: 4, batch_size: 4, default_max_retries: DEFAULT_MAX_RETRIES, processing_timeout_ms: DEFAULT_PROCESSING_TIMEOUT_MS }
    }
}

type ConfirmationCallback = dyn Fn(ConfirmationResult) + Send + Sync;

/// Parallel Confirmation Processor (spec §4.5, component C5): a priority
/// queue feeding a bounded worker pool, with per-task retry/backoff and
/// graceful or forced shutdown.
///
/// Grounded on the worker-pool shape of `atlas-mempool`'s queued-job
/// pattern (see `finp2p-ledger::manager`'s per-key reservation queue),
/// generalized here to a single shared priority queue instead of one
/// queue per key.
pub struct ParallelConfirmationProcessor {
    config: ProcessorConfig,
    store: Arc<ConfirmationRecordStore>,
    state: Arc<Mutex<ProcessorState>>,
    semaphore: Arc<Semaphore>,
    notify: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
    loop_started: AtomicBool,
    on_confirmation_created: Option<Arc<ConfirmationCallback>>,
}

impl ParallelConfirmationProcessor {
    pub fn new(store: Arc<ConfirmationRecordStore>, config: ProcessorConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            config,
            store,
            state: Arc::new(Mutex::new(ProcessorState::default())),
            semaphore,
            notify: Arc::new(Notify::new()),
            shutting_down: Arc::new(AtomicBool::new(false)),
            loop_started: AtomicBool::new(false),
            on_confirmation_created: None,
        }
    }

    pub fn with_callback(mut self, callback: Arc<ConfirmationCallback>) -> Self {
        self.on_confirmation_created = Some(callback);
        self
    }

    /// Enqueues a confirmation task at `priority`, inserted at the first
    /// position whose existing priority is strictly worse (spec §4.5: a
    /// stable priority-ordered insert, not a heap). Returns the task id
    /// (equal to the transfer id: retries of the same task keep it).
    pub async fn add_task(&self, input: ConfirmationInput, priority: Priority) -> finp2p_common::Result<String> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(finp2p_common::FinP2PError::Other("processor is shutting down".into()));
        }
        let task_id = input.transfer_id.clone();
        let task = QueuedTask { task_id: task_id.clone(), input, priority, retry_count: 0, max_retries: self.config.default_max_retries };

        {
            let mut state = self.state.lock().await;
            let insert_at = state.queue.iter().position(|existing| existing.priority > priority).unwrap_or(state.queue.len());
            state.queue.insert(insert_at, task);
        }
        self.notify.notify_waiters();
        self.ensure_loop_started();
        Ok(task_id)
    }

    pub async fn get_result(&self, task_id: &str) -> Option<ConfirmationResult> {
        self.state.lock().await.completed.get(task_id).cloned()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active.len()
    }

    /// Stops accepting new tasks. `force` drops whatever is still queued
    /// immediately; otherwise waits (up to `timeout`) for in-flight tasks
    /// to finish before clearing the remainder of the queue.
    pub async fn shutdown(&self, force: bool, timeout: Duration) {
        self.shutting_down.store(true, Ordering::SeqCst);
        if force {
            self.state.lock().await.queue.clear();
            self.notify.notify_waiters();
            return;
        }
        let deadline = Instant::now() + timeout;
        loop {
            if self.state.lock().await.active.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                warn!("confirmation processor shutdown timed out with active tasks remaining");
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.state.lock().await.queue.clear();
    }

    fn ensure_loop_started(&self) {
        if self.loop_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let state = self.state.clone();
        let store = self.store.clone();
        let semaphore = self.semaphore.clone();
        let notify = self.notify.clone();
        let shutting_down = self.shutting_down.clone();
        let batch_size = self.config.batch_size;
        let processing_timeout_ms = self.config.processing_timeout_ms;
        let callback = self.on_confirmation_created.clone();
        tokio::spawn(async move {
            run_dispatch_loop(state, store, semaphore, notify, shutting_down, batch_size, processing_timeout_ms, callback).await;
        });
    }
}

async fn run_dispatch_loop(
    state: Arc<Mutex<ProcessorState>>,
    store: Arc<ConfirmationRecordStore>,
    semaphore: Arc<Semaphore>,
    notify: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
    batch_size: usize,
    processing_timeout_ms: u64,
    callback: Option<Arc<ConfirmationCallback>>,
) {
    loop {
        let drained = {
            let mut guard = state.lock().await;
            let mut batch = Vec::new();
            while batch.len() < batch_size {
                let Some(permit) = Arc::clone(&semaphore).try_acquire_owned().ok() else { break };
                let Some(task) = guard.queue.pop_front() else {
                    drop(permit);
                    break;
                };
                guard.active.insert(task.task_id.clone(), ());
                batch.push((task, permit));
            }
            let done = shutting_down.load(Ordering::SeqCst) && guard.queue.is_empty() && guard.active.is_empty() && batch.is_empty();
            (batch, done)
        };
        let (batch, done) = drained;

        for (task, permit) in batch {
            let state = state.clone();
            let store = store.clone();
            let notify = notify.clone();
            let callback = callback.clone();
            tokio::spawn(async move {
                process_task(state, store, notify, callback, task, processing_timeout_ms).await;
                drop(permit);
            });
        }

        if done {
            return;
        }

        tokio::select! {
            _ = notify.notified() => {}
            _ = tokio::time::sleep(IDLE_POLL) => {}
        }
    }
}

async fn process_task(
    state: Arc<Mutex<ProcessorState>>,
    store: Arc<ConfirmationRecordStore>,
    notify: Arc<Notify>,
    callback: Option<Arc<ConfirmationCallback>>,
    mut task: QueuedTask,
    processing_timeout_ms: u64,
) {
    let outcome = match tokio::time::timeout(Duration::from_millis(processing_timeout_ms), store.create_confirmation_record(&task.input, ConfirmationStatus::Confirmed, None)).await {
        Ok(result) => result,
        Err(_) => Err(finp2p_common::FinP2PError::Timeout(format!("confirmation record write timed out after {processing_timeout_ms}ms"))),
    };

    match outcome {
        Ok(record) => {
            let result = ConfirmationResult {
                task_id: task.task_id.clone(),
                transfer_id: task.input.transfer_id.clone(),
                outcome: ConfirmationOutcome::Success { confirmation_id: record.id },
                completed_at: current_time_ms(),
            };
            {
                let mut guard = state.lock().await;
                guard.active.remove(&task.task_id);
                guard.completed.insert(task.task_id.clone(), result.clone());
            }
            if let Some(cb) = callback {
                cb(result);
            }
            notify.notify_waiters();
        }
        Err(e) => {
            task.retry_count += 1;
            if task.retry_count < task.max_retries {
                state.lock().await.active.remove(&task.task_id);
                let backoff = Duration::from_millis(RETRY_BACKOFF_BASE_MS * 2u64.pow(task.retry_count));
                debug!(task_id = %task.task_id, retry = task.retry_count, ?backoff, "confirmation task failed, retrying");
                let state2 = state.clone();
                let notify2 = notify.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(backoff).await;
                    let mut guard = state2.lock().await;
                    let insert_at = guard.queue.iter().position(|existing| existing.priority > task.priority).unwrap_or(guard.queue.len());
                    guard.queue.insert(insert_at, task);
                    drop(guard);
                    notify2.notify_waiters();
                });
            } else {
                let result = ConfirmationResult {
                    task_id: task.task_id.clone(),
                    transfer_id: task.input.transfer_id.clone(),
                    outcome: ConfirmationOutcome::Failed { reason: e.to_string() },
                    completed_at: current_time_ms(),
                };
                let mut guard = state.lock().await;
                guard.active.remove(&task.task_id);
                guard.completed.insert(task.task_id.clone(), result);
                drop(guard);
                notify.notify_waiters();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finp2p_common::crypto::RouterSigner;
    use finp2p_store::Store;
    use std::sync::Mutex as StdMutex;

    fn processor(config: ProcessorConfig) -> ParallelConfirmationProcessor {
        let store = Arc::new(ConfirmationRecordStore::new(Store::local(), "router-a", RouterSigner::generate()));
        ParallelConfirmationProcessor::new(store, config)
    }

    fn input(transfer_id: &str) -> ConfirmationInput {
        ConfirmationInput {
            transfer_id: transfer_id.to_string(),
            from_account: "alice".into(),
            to_account: "bob".into(),
            asset_id: "asset-1".into(),
            amount: 10,
        }
    }

    #[tokio::test]
    async fn task_completes_and_is_retrievable() {
        let processor = processor(ProcessorConfig::default());
        let id = processor.add_task(input("t1"), Priority::Medium).await.unwrap();
        for _ in 0..50 {
            if processor.get_result(&id).await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let result = processor.get_result(&id).await.unwrap();
        assert!(matches!(result.outcome, ConfirmationOutcome::Success { .. }));
    }

    /// Scenario S5 (spec §8): with concurrency pinned to 1, a high-priority
    /// task queued after a low-priority one is still processed first.
    ///
    /// Builds the queue with the dispatch loop held off (direct access to
    /// the private `loop_started` flag from this nested test module) so the
    /// assertion exercises the priority-insertion logic deterministically
    /// instead of racing the background worker.
    #[tokio::test]
    async fn high_priority_task_processed_before_queued_low_priority_task() {
        let order: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let order_clone = order.clone();
        let store = Arc::new(ConfirmationRecordStore::new(Store::local(), "router-a", RouterSigner::generate()));
        let processor = ParallelConfirmationProcessor::new(store, ProcessorConfig { max_concurrency: 1, batch_size: 1, ..ProcessorConfig::default() })
            .with_callback(Arc::new(move |result: ConfirmationResult| {
                order_clone.lock().unwrap().push(result.transfer_id);
            }));

        processor.loop_started.store(true, Ordering::SeqCst);
        processor.add_task(input("low"), Priority::Low).await.unwrap();
        processor.add_task(input("high"), Priority::High).await.unwrap();
        assert_eq!(processor.pending_count().await, 2);

        processor.loop_started.store(false, Ordering::SeqCst);
        processor.ensure_loop_started();

        for _ in 0..100 {
            if order.lock().unwrap().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let seen = order.lock().unwrap().clone();
        assert_eq!(seen, vec!["high".to_string(), "low".to_string()]);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_tasks() {
        let processor = processor(ProcessorConfig::default());
        processor.shutdown(true, Duration::from_millis(10)).await;
        let err = processor.add_task(input("t1"), Priority::Medium).await.unwrap_err();
        assert!(matches!(err, finp2p_common::FinP2PError::Other(_)));
    }
}
