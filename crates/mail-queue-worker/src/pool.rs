use crate::config::WorkerConfig;
use crate::engine::EmailEngine;
use crate::executor::TaskExecutor;
use crate::observer::TaskObserver;
use mail_queue_core::{TaskEnvelope, TaskRecord, TaskState};
use mail_queue_persistence::Broker;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Failure recorded for envelopes still queued when the pool shuts down
pub const SHUTDOWN_BEFORE_START: &str = "Worker shut down before task started";

/// A fixed number of worker slots pulling envelopes from the broker.
pub struct WorkerPool {
    config: WorkerConfig,
    worker_id: String,
    broker: Arc<dyn Broker>,
    engine: Arc<EmailEngine>,
    executor: Arc<TaskExecutor>,
    observers: Vec<Arc<dyn TaskObserver>>,
    active_tasks: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(config: WorkerConfig, broker: Arc<dyn Broker>, engine: Arc<EmailEngine>) -> Self {
        let worker_id = config.generate_worker_id();
        let executor = Arc::new(TaskExecutor::new(
            engine.clone(),
            config.time_limit(),
            config.soft_time_limit(),
        ));

        WorkerPool {
            config,
            worker_id,
            broker,
            engine,
            executor,
            observers: Vec::new(),
            active_tasks: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::Acquire)
    }

    /// Spawn one loop per worker slot
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let slots = self.config.concurrency.max(1);
        info!("Starting worker {} (concurrency: {})", self.worker_id, slots);

        (0..slots)
            .map(|slot| {
                let pool = self.clone();
                tokio::spawn(async move { pool.run_slot(slot).await })
            })
            .collect()
    }

    async fn run_slot(&self, slot: usize) {
        let slot_id = format!("{}-{}", self.worker_id, slot);
        debug!("Worker slot {} ready", slot_id);

        loop {
            let envelope = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,
                next = self.broker.dequeue() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            self.process(&slot_id, envelope).await;
        }

        debug!("Worker slot {} stopped", slot_id);
    }

    /// Execute one envelope and notify observers of the terminal record.
    pub async fn process(&self, slot_id: &str, envelope: TaskEnvelope) {
        let task_id = envelope.task_id;
        self.active_tasks.fetch_add(1, Ordering::AcqRel);
        let started = Instant::now();

        info!(
            worker = slot_id,
            kind = envelope.job.kind().as_str(),
            "Executing task {}",
            task_id
        );

        let record = match self.executor.execute(&envelope, &self.observers).await {
            Ok(record) => Some(record),
            Err(e) => {
                error!("Task {} did not finish cleanly: {}", task_id, e);
                match self.engine.mark_failed(&envelope, &e.to_string()).await {
                    Ok(record) => Some(record),
                    Err(store_err) => {
                        error!("Failed to record failure for task {}: {}", task_id, store_err);
                        None
                    }
                }
            }
        };

        if let Some(record) = record {
            self.notify(&record, started.elapsed());
        }

        self.active_tasks.fetch_sub(1, Ordering::AcqRel);
    }

    fn notify(&self, record: &TaskRecord, elapsed: Duration) {
        match record.state {
            TaskState::Completed => {
                for observer in &self.observers {
                    observer.on_success(record, elapsed);
                }
            }
            TaskState::Failed => {
                let error = record.error.as_deref().unwrap_or("Task failed");
                for observer in &self.observers {
                    observer.on_failure(record, error, elapsed);
                }
            }
            state => warn!("Task {} left in non-terminal state {}", record.id, state.as_str()),
        }
    }

    /// Stop taking new work
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Stop taking new work and wait for in-flight tasks, up to the configured timeout.
    ///
    /// Envelopes still queued afterwards are marked failed. Close the broker first so
    /// nothing new arrives behind the drain.
    pub async fn shutdown_gracefully(&self, handles: Vec<JoinHandle<()>>) {
        self.shutdown();
        info!("Waiting for active tasks to complete...");

        let timeout = Duration::from_secs(self.config.graceful_shutdown_timeout_secs);
        match tokio::time::timeout(timeout, futures::future::join_all(handles)).await {
            Ok(_) => info!("All tasks completed, shutting down"),
            Err(_) => warn!(
                "Shutdown deadline exceeded, {} tasks still active",
                self.active_tasks()
            ),
        }

        let abandoned = self.abandon_queued().await;
        if abandoned > 0 {
            warn!("Marked {} queued tasks failed at shutdown", abandoned);
        }
    }

    /// Fail every envelope left in the broker, returning how many were recorded.
    pub async fn abandon_queued(&self) -> usize {
        let mut abandoned = 0;
        for envelope in self.broker.drain() {
            match self.engine.mark_failed(&envelope, SHUTDOWN_BEFORE_START).await {
                Ok(record) => {
                    abandoned += 1;
                    self.notify(&record, Duration::ZERO);
                }
                Err(e) => error!(
                    "Failed to record shutdown for task {}: {}",
                    envelope.task_id, e
                ),
            }
        }
        abandoned
    }
}
