use mail_queue_core::{Progress, TaskId, TaskOutcome, TaskRecord, TaskState};
use mail_queue_persistence::{PersistenceError, TaskRecordStore};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatusError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Failed to retrieve task status: {0}")]
    Store(#[from] PersistenceError),
}

/// What a poller sees for one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatusView {
    pub task_id: TaskId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskStatusView {
    /// Only running tasks expose progress, only terminal ones their result or error.
    pub fn from_record(record: TaskRecord) -> Self {
        let mut view = TaskStatusView {
            task_id: record.id,
            status: record.state.as_str(),
            progress: None,
            result: None,
            error: None,
        };

        match record.state {
            TaskState::Completed => view.result = record.result,
            TaskState::Failed => {
                view.error = Some(record.error.unwrap_or_else(|| "Task failed".to_string()))
            }
            state if state.is_running() => view.progress = record.progress,
            _ => {}
        }
        view
    }
}

pub struct StatusService {
    store: Arc<dyn TaskRecordStore>,
}

impl StatusService {
    pub fn new(store: Arc<dyn TaskRecordStore>) -> Self {
        StatusService { store }
    }

    pub async fn get(&self, task_id: &TaskId) -> Result<TaskStatusView, StatusError> {
        let record = self
            .store
            .get(task_id)
            .await?
            .ok_or(StatusError::NotFound(*task_id))?;

        Ok(TaskStatusView::from_record(record))
    }
}
