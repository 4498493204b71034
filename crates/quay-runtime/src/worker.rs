//! Task-completion callback workers.
//!
//! A bounded pool drains a queue of completed task guids. Each job claims
//! the task (COMPLETED -> RESOLVING), POSTs the task JSON to its
//! completion callback URL, and removes the task once the callback has
//! been delivered or permanently rejected. Transient callback failures
//! are re-enqueued with backoff up to an attempt budget.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use metrics::counter;
use reqwest::StatusCode;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use quay_core::Error;
use quay_models::TaskState;
use quay_store::Store;

use crate::shutdown::Shutdown;

/// Default number of concurrent callback workers.
pub const DEFAULT_POOL_SIZE: usize = 20;
/// Default queue capacity; overflow drops the oldest pending job.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
/// Default delivery attempt budget per task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(16);

/// Tuning for the worker pool.
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Number of concurrent workers (bounds outstanding POSTs).
    pub workers: usize,
    /// Queue capacity; overflow drops the oldest pending job.
    pub queue_capacity: usize,
    /// Delivery attempts per task before it is removed anyway.
    pub max_attempts: u32,
    /// Per-request timeout for callback POSTs.
    pub request_timeout: Duration,
    /// Base delay for the doubling retry backoff.
    pub retry_base_delay: Duration,
    /// How long shutdown waits for in-flight POSTs.
    pub drain_deadline: Duration,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            request_timeout: Duration::from_secs(10),
            retry_base_delay: RETRY_BASE_DELAY,
            drain_deadline: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
struct Job {
    task_guid: String,
    attempt: u32,
}

struct QueueInner {
    jobs: Mutex<VecDeque<Job>>,
    notify: Notify,
    capacity: usize,
    accepting: AtomicBool,
}

/// Handle used by HTTP handlers and the completion listener to hand a
/// completed task to the pool. Enqueue never blocks.
#[derive(Clone)]
pub struct CallbackQueue {
    inner: Arc<QueueInner>,
}

impl CallbackQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                jobs: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                capacity: capacity.max(1),
                accepting: AtomicBool::new(true),
            }),
        }
    }

    /// Queues a completed task for callback delivery.
    pub fn enqueue(&self, task_guid: impl Into<String>) {
        self.push(Job {
            task_guid: task_guid.into(),
            attempt: 0,
        });
    }

    fn push(&self, job: Job) {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return;
        }
        let mut jobs = lock(&self.inner.jobs);
        if jobs.len() >= self.inner.capacity {
            jobs.pop_front();
            counter!("quay_callback_jobs_dropped_total").increment(1);
            tracing::warn!("Callback queue full; dropping oldest pending job");
        }
        jobs.push_back(job);
        drop(jobs);
        self.inner.notify.notify_one();
    }

    /// Stops accepting new jobs.
    fn refuse(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    async fn dequeue(&self, shutdown: &mut Shutdown) -> Option<Job> {
        loop {
            if let Some(job) = lock(&self.inner.jobs).pop_front() {
                return Some(job);
            }
            if shutdown.is_triggered() || !self.inner.accepting.load(Ordering::SeqCst) {
                return None;
            }
            tokio::select! {
                () = self.inner.notify.notified() => {}
                () = shutdown.triggered() => return None,
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock(&self.inner.jobs).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// The running worker pool.
pub struct CallbackWorkerPool {
    queue: CallbackQueue,
    handles: Vec<JoinHandle<()>>,
    drain_deadline: Duration,
}

impl CallbackWorkerPool {
    /// Spawns the workers.
    #[must_use]
    pub fn start(store: Arc<dyn Store>, config: &CallbackConfig, shutdown: &Shutdown) -> Self {
        let queue = CallbackQueue::new(config.queue_capacity);
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();

        let handles = (0..config.workers.max(1))
            .map(|worker| {
                let worker_loop = WorkerLoop {
                    store: Arc::clone(&store),
                    client: client.clone(),
                    queue: queue.clone(),
                    max_attempts: config.max_attempts.max(1),
                    retry_base_delay: config.retry_base_delay,
                };
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    tracing::debug!(worker, "Callback worker started");
                    let queue = worker_loop.queue.clone();
                    while let Some(job) = queue.dequeue(&mut shutdown).await {
                        worker_loop.process(job).await;
                    }
                    tracing::debug!(worker, "Callback worker stopped");
                })
            })
            .collect();

        Self {
            queue,
            handles,
            drain_deadline: config.drain_deadline,
        }
    }

    /// The enqueue handle.
    #[must_use]
    pub fn queue(&self) -> CallbackQueue {
        self.queue.clone()
    }

    /// Refuses new enqueues and waits for in-flight deliveries up to the
    /// drain deadline; jobs still queued after that are abandoned.
    pub async fn drain(self) {
        self.queue.refuse();
        let joined = futures_join(self.handles);
        if tokio::time::timeout(self.drain_deadline, joined).await.is_err() {
            tracing::warn!("Callback workers did not drain before the deadline");
        }
    }
}

async fn futures_join(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

struct WorkerLoop {
    store: Arc<dyn Store>,
    client: reqwest::Client,
    queue: CallbackQueue,
    max_attempts: u32,
    retry_base_delay: Duration,
}

impl WorkerLoop {
    async fn process(&self, job: Job) {
        let task = match self.store.task_by_guid(&job.task_guid).await {
            Ok(task) => task,
            Err(Error::ResourceNotFound { .. }) => return,
            Err(err) => {
                tracing::warn!(task_guid = %job.task_guid, error = %err, "Dropping callback job: task fetch failed");
                return;
            }
        };
        // tasks without a callback stay in COMPLETED for client polling
        let Some(url) = task.completion_callback_url.clone() else {
            return;
        };

        if job.attempt == 0 {
            if task.state != TaskState::Completed {
                return;
            }
            // the conditional RESOLVING transition arbitrates between
            // workers; losing it means another worker owns this task
            match self.store.resolving_task(&job.task_guid).await {
                Ok(()) => {}
                Err(Error::InvalidStateTransition { .. } | Error::ResourceConflict { .. }) => {
                    tracing::debug!(task_guid = %job.task_guid, "Task already being resolved elsewhere");
                    return;
                }
                Err(err) => {
                    tracing::warn!(task_guid = %job.task_guid, error = %err, "Dropping callback job: resolving failed");
                    return;
                }
            }
        } else if task.state != TaskState::Resolving {
            // a retried job still owns the RESOLVING claim from its first
            // attempt; anything else means the task moved on without us
            return;
        }

        match self.client.post(&url).json(&task).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(task_guid = %job.task_guid, "Completion callback delivered");
                self.remove(&job.task_guid).await;
            }
            Ok(response) if retryable_status(response.status()) => {
                self.retry(job, &format!("status {}", response.status())).await;
            }
            Ok(response) => {
                // the client rejected the callback permanently
                tracing::info!(
                    task_guid = %job.task_guid,
                    status = %response.status(),
                    "Completion callback rejected; removing task"
                );
                self.remove(&job.task_guid).await;
            }
            Err(err) => {
                self.retry(job, &err.to_string()).await;
            }
        }
    }

    async fn retry(&self, job: Job, reason: &str) {
        let attempt = job.attempt + 1;
        if attempt >= self.max_attempts {
            tracing::warn!(
                task_guid = %job.task_guid,
                attempts = attempt,
                "Callback attempts exhausted; removing task"
            );
            self.remove(&job.task_guid).await;
            return;
        }

        counter!("quay_callback_retries_total").increment(1);
        tracing::debug!(task_guid = %job.task_guid, attempt, reason, "Retrying completion callback");

        // the task stays parked in RESOLVING while we wait; the retried
        // job skips the claim step and POSTs again
        let queue = self.queue.clone();
        let delay = backoff_delay(self.retry_base_delay, attempt);
        let retried = Job {
            task_guid: job.task_guid,
            attempt,
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.push(retried);
        });
    }

    async fn remove(&self, task_guid: &str) {
        if let Err(err) = self.store.resolve_task(task_guid).await {
            tracing::warn!(task_guid = %task_guid, error = %err, "Failed to remove resolved task");
        }
    }
}

fn retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1u32 << attempt.min(6));
    exp.min(RETRY_MAX_DELAY)
}
