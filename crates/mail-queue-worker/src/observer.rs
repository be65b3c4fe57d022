use mail_queue_core::{TaskId, TaskRecord};
use std::time::Duration;
use tracing::{error, info};

/// Hooks invoked by the worker pool once a task reaches a terminal state.
pub trait TaskObserver: Send + Sync {
    fn on_success(&self, record: &TaskRecord, elapsed: Duration);

    fn on_failure(&self, record: &TaskRecord, error: &str, elapsed: Duration);

    /// A running task passed its soft time limit. Called at most once per execution.
    fn on_soft_time_limit(&self, _task_id: TaskId, _limit: Duration) {}
}

/// Logs terminal transitions.
pub struct LoggingObserver;

impl TaskObserver for LoggingObserver {
    fn on_success(&self, record: &TaskRecord, elapsed: Duration) {
        info!(
            kind = record.kind.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Task {} completed successfully",
            record.id
        );
    }

    fn on_failure(&self, record: &TaskRecord, error: &str, elapsed: Duration) {
        error!(
            kind = record.kind.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Task {} failed: {}",
            record.id,
            error
        );
    }
}
