use crate::engine::{EmailEngine, EngineError};
use crate::observer::TaskObserver;
use mail_queue_core::{TaskEnvelope, TaskRecord};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Task time limit exceeded after {}s", .0.as_secs())]
    TimeLimitExceeded(Duration),

    #[error("Task panicked during execution")]
    Panicked,

    #[error("Task was cancelled")]
    Cancelled,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Runs the engine for one envelope under the soft and hard time limits.
pub struct TaskExecutor {
    engine: Arc<EmailEngine>,
    time_limit: Duration,
    soft_time_limit: Option<Duration>,
}

impl TaskExecutor {
    pub fn new(
        engine: Arc<EmailEngine>,
        time_limit: Duration,
        soft_time_limit: Option<Duration>,
    ) -> Self {
        TaskExecutor {
            engine,
            time_limit,
            soft_time_limit,
        }
    }

    /// Execute a task with limits and panic recovery.
    ///
    /// Passing the soft limit only warns and tells `observers`; the task keeps running.
    /// On any error the engine future has fully stopped before this returns, so
    /// the caller is the only writer left for the task's record.
    pub async fn execute(
        &self,
        envelope: &TaskEnvelope,
        observers: &[Arc<dyn TaskObserver>],
    ) -> Result<TaskRecord, ExecutionError> {
        let task_id = envelope.task_id;
        let engine = self.engine.clone();
        let owned = envelope.clone();
        let mut handle = tokio::spawn(async move { engine.execute(&owned).await });

        let hard = tokio::time::sleep(self.time_limit);
        tokio::pin!(hard);
        let soft = tokio::time::sleep(self.soft_time_limit.unwrap_or(self.time_limit));
        tokio::pin!(soft);
        let mut soft_pending = self.soft_time_limit.is_some();

        loop {
            tokio::select! {
                joined = &mut handle => {
                    return match joined {
                        Ok(result) => result.map_err(ExecutionError::from),
                        Err(e) if e.is_panic() => {
                            error!("Task {} panicked: {:?}", task_id, e);
                            Err(ExecutionError::Panicked)
                        }
                        Err(_) => {
                            error!("Task {} was cancelled", task_id);
                            Err(ExecutionError::Cancelled)
                        }
                    };
                }
                _ = &mut soft, if soft_pending => {
                    soft_pending = false;
                    let limit = self.soft_time_limit.unwrap_or_default();
                    warn!("Task {} passed its soft time limit of {:?}", task_id, limit);
                    for observer in observers {
                        observer.on_soft_time_limit(task_id, limit);
                    }
                }
                _ = &mut hard => {
                    handle.abort();
                    let _ = (&mut handle).await;
                    error!("Task {} timed out after {:?}", task_id, self.time_limit);
                    return Err(ExecutionError::TimeLimitExceeded(self.time_limit));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StepDelays;
    use crate::transport::{MailTransport, SimulatedTransport, TransportError};
    use async_trait::async_trait;
    use mail_queue_core::{EmailJob, TaskId, TaskState};
    use mail_queue_persistence::{MemoryRecordStore, TaskRecordStore};
    use parking_lot::Mutex;
    use uuid::Uuid;

    struct PanickingTransport;

    #[async_trait]
    impl MailTransport for PanickingTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), TransportError> {
            panic!("transport blew up");
        }
    }

    #[derive(Default)]
    struct SoftLimitLog {
        hits: Mutex<Vec<(TaskId, Duration)>>,
    }

    impl TaskObserver for SoftLimitLog {
        fn on_success(&self, _record: &TaskRecord, _elapsed: Duration) {}

        fn on_failure(&self, _record: &TaskRecord, _error: &str, _elapsed: Duration) {}

        fn on_soft_time_limit(&self, task_id: TaskId, limit: Duration) {
            self.hits.lock().push((task_id, limit));
        }
    }

    fn envelope() -> TaskEnvelope {
        TaskEnvelope::new(
            Uuid::new_v4(),
            EmailJob::SingleEmail {
                recipient: "a@b.com".to_string(),
                subject: "Hi".to_string(),
                body: "Test".to_string(),
            },
        )
    }

    fn executor(
        transport: Arc<dyn MailTransport>,
        limit: Duration,
        soft: Option<Duration>,
    ) -> (TaskExecutor, Arc<MemoryRecordStore>) {
        let store = Arc::new(MemoryRecordStore::new(chrono::Duration::hours(1)));
        let engine = Arc::new(EmailEngine::new(store.clone(), transport, StepDelays::none()));
        (TaskExecutor::new(engine, limit, soft), store)
    }

    #[tokio::test]
    async fn test_executor_success() {
        let transport = Arc::new(SimulatedTransport::instant());
        let (executor, store) = executor(transport, Duration::from_secs(5), None);
        let envelope = envelope();

        let record = executor.execute(&envelope, &[]).await.unwrap();
        assert_eq!(record.state, TaskState::Completed);

        let stored = store.get(&envelope.task_id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_executor_time_limit() {
        let slow = SimulatedTransport::new(Duration::from_secs(10), Duration::from_secs(10), 0.0);
        let (executor, store) = executor(
            Arc::new(slow),
            Duration::from_secs(2),
            Some(Duration::from_secs(1)),
        );
        let envelope = envelope();

        let err = executor.execute(&envelope, &[]).await.unwrap_err();
        assert!(matches!(err, ExecutionError::TimeLimitExceeded(_)));
        assert_eq!(err.to_string(), "Task time limit exceeded after 2s");

        // The engine stopped mid-send; the record still shows the last step it published
        let stored = store.get(&envelope.task_id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Sending);
    }

    #[tokio::test]
    async fn test_executor_recovers_from_panic() {
        let transport = Arc::new(PanickingTransport);
        let (executor, store) = executor(transport, Duration::from_secs(5), None);
        let envelope = envelope();

        let err = executor.execute(&envelope, &[]).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Panicked));
        assert_eq!(err.to_string(), "Task panicked during execution");

        // The engine got as far as sending before the panic
        let stored = store.get(&envelope.task_id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Sending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_limit_reported_once_and_task_finishes() {
        let slow = SimulatedTransport::new(Duration::from_secs(4), Duration::from_secs(4), 0.0);
        let (executor, _store) = executor(
            Arc::new(slow),
            Duration::from_secs(10),
            Some(Duration::from_secs(1)),
        );
        let log = Arc::new(SoftLimitLog::default());
        let observers: Vec<Arc<dyn TaskObserver>> = vec![log.clone()];
        let envelope = envelope();

        let record = executor.execute(&envelope, &observers).await.unwrap();
        assert_eq!(record.state, TaskState::Completed);
        assert_eq!(
            log.hits.lock().clone(),
            vec![(envelope.task_id, Duration::from_secs(1))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_soft_limit_report_for_fast_tasks() {
        let (executor, _store) = executor(
            Arc::new(SimulatedTransport::instant()),
            Duration::from_secs(10),
            Some(Duration::from_secs(1)),
        );
        let log = Arc::new(SoftLimitLog::default());
        let observers: Vec<Arc<dyn TaskObserver>> = vec![log.clone()];

        executor.execute(&envelope(), &observers).await.unwrap();
        assert!(log.hits.lock().is_empty());
    }
}
