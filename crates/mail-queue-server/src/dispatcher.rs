use crate::admission::{Admission, AdmissionController};
use crate::metrics::ServiceMetrics;
use mail_queue_core::{EmailJob, TaskEnvelope, TaskId, TaskRecord, ValidationError};
use mail_queue_persistence::{Broker, PersistenceError, TaskRecordStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Email queue is full. Please try again later.")]
    Rejected { current_depth: usize },

    #[error("Failed to start email task: {0}")]
    Infrastructure(#[from] PersistenceError),
}

/// Accepts jobs: validate, admit, write the pending record, enqueue.
pub struct TaskDispatcher {
    store: Arc<dyn TaskRecordStore>,
    broker: Arc<dyn Broker>,
    admission: AdmissionController,
    metrics: Arc<ServiceMetrics>,
}

impl TaskDispatcher {
    pub fn new(
        store: Arc<dyn TaskRecordStore>,
        broker: Arc<dyn Broker>,
        admission: AdmissionController,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        TaskDispatcher {
            store,
            broker,
            admission,
            metrics,
        }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Returns as soon as the envelope is queued; nothing here waits on a worker.
    pub async fn submit(&self, job: EmailJob) -> Result<TaskId, DispatchError> {
        job.validate(self.admission.config().max_bulk_recipients)?;

        let kind = job.kind();
        if let Admission::Rejected { current_depth } = self.admission.admit(kind).await {
            self.metrics.inc_rejected(kind);
            return Err(DispatchError::Rejected { current_depth });
        }

        let task_id = Uuid::new_v4();
        let mut record = TaskRecord::pending(task_id, &job);
        self.store.put(&record).await?;

        let recipients = job.recipient_count();
        if let Err(e) = self.broker.enqueue(TaskEnvelope::new(task_id, job)).await {
            // No worker will ever pick this task up
            if record.fail(format!("Failed to enqueue task: {}", e)).is_ok() {
                if let Err(store_err) = self.store.put(&record).await {
                    warn!("Could not mark task {} failed: {}", task_id, store_err);
                }
            }
            return Err(e.into());
        }
        self.metrics.inc_submitted(kind);

        info!(
            kind = kind.as_str(),
            recipients, "Email task started: {}", task_id
        );
        Ok(task_id)
    }
}
