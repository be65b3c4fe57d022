//! Per-task state machines.
//!
//! Every progress update and terminal transition is written to the record store
//! before the engine moves on, so the store is the only place a poller looks.

use crate::config::StepDelays;
use crate::transport::MailTransport;
use chrono::Utc;
use mail_queue_core::{
    has_deliverable_shape, BulkEmailResult, EmailJob, FailedEntry, Progress, SentEntry,
    SingleEmailResult, TaskEnvelope, TaskError, TaskOutcome, TaskRecord, TaskState,
};
use mail_queue_persistence::{PersistenceError, TaskRecordStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Faults that stop the engine itself, as opposed to a task ending in `Failed`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Record store error: {0}")]
    Store(#[from] PersistenceError),

    #[error("Task state error: {0}")]
    Task(#[from] TaskError),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

pub struct EmailEngine {
    store: Arc<dyn TaskRecordStore>,
    transport: Arc<dyn MailTransport>,
    delays: StepDelays,
}

impl EmailEngine {
    pub fn new(
        store: Arc<dyn TaskRecordStore>,
        transport: Arc<dyn MailTransport>,
        delays: StepDelays,
    ) -> Self {
        EmailEngine {
            store,
            transport,
            delays,
        }
    }

    /// Run the task to a terminal record.
    ///
    /// `Ok` carries either a `Completed` or a `Failed` record. `Err` means the
    /// store could not be written and the task outcome is unknown to pollers.
    pub async fn execute(&self, envelope: &TaskEnvelope) -> EngineResult<TaskRecord> {
        let record = self.load(envelope).await?;
        if record.is_terminal() {
            warn!("Task {} already finished, skipping redelivery", envelope.task_id);
            return Ok(record);
        }

        match &envelope.job {
            EmailJob::SingleEmail {
                recipient,
                subject,
                body,
            } => self.run_single(record, recipient, subject, body).await,
            EmailJob::BulkEmail {
                recipients,
                subject,
                body,
            } => self.run_bulk(record, recipients, subject, body).await,
        }
    }

    /// Record a failure raised outside the state machine (time limit, panic).
    /// Terminal records are returned untouched.
    pub async fn mark_failed(
        &self,
        envelope: &TaskEnvelope,
        reason: &str,
    ) -> EngineResult<TaskRecord> {
        let record = self.load(envelope).await?;
        if record.is_terminal() {
            return Ok(record);
        }
        self.fail(record, reason.to_string()).await
    }

    async fn load(&self, envelope: &TaskEnvelope) -> EngineResult<TaskRecord> {
        match self.store.get(&envelope.task_id).await? {
            Some(record) => Ok(record),
            None => {
                warn!("No record for task {}, starting a fresh one", envelope.task_id);
                Ok(TaskRecord::pending(envelope.task_id, &envelope.job))
            }
        }
    }

    async fn run_single(
        &self,
        mut record: TaskRecord,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> EngineResult<TaskRecord> {
        let task_id = record.id;
        info!("Starting email task {} to {}", task_id, recipient);

        let progress = Progress::step(1, "Validating email address");
        self.publish(&mut record, TaskState::Processing, progress).await?;
        self.pause(self.delays.validate_ms).await;
        if !recipient.contains('@') {
            error!("Invalid email address: {}", recipient);
            return self.fail(record, format!("Invalid email address: {}", recipient)).await;
        }

        let progress = Progress::step(2, "Preparing email content");
        self.publish(&mut record, TaskState::Processing, progress).await?;
        self.pause(self.delays.prepare_ms).await;

        let progress = Progress::step(3, "Connecting to email server");
        self.publish(&mut record, TaskState::Connecting, progress).await?;
        self.pause(self.delays.connect_ms).await;
        if let Err(e) = self.transport.connect().await {
            error!("Task {} could not connect: {}", task_id, e);
            return self.fail(record, e.to_string()).await;
        }

        self.publish(&mut record, TaskState::Sending, Progress::step(4, "Sending email"))
            .await?;
        if let Err(e) = self.transport.send(recipient, subject, body).await {
            error!("Unexpected error sending email for task {}: {}", task_id, e);
            return self.fail(record, e.to_string()).await;
        }

        self.publish(&mut record, TaskState::Finalizing, Progress::step(5, "Verifying delivery"))
            .await?;
        self.pause(self.delays.finalize_ms).await;

        record.complete(TaskOutcome::SingleEmail(SingleEmailResult {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            sent_at: Utc::now(),
            delivery_confirmed: true,
            message: "Email sent successfully!".to_string(),
        }))?;
        self.store.put(&record).await?;

        info!("Email sent successfully to {}", recipient);
        Ok(record)
    }

    async fn run_bulk(
        &self,
        mut record: TaskRecord,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> EngineResult<TaskRecord> {
        let task_id = record.id;
        let total = recipients.len() as u32;
        info!("Starting bulk email task {} for {} recipients", task_id, total);

        let progress = Progress::new(0, total, "Starting bulk email send");
        self.publish(&mut record, TaskState::Processing, progress).await?;

        let mut sent_emails = Vec::new();
        let mut failed_emails = Vec::new();

        for (index, email) in recipients.iter().enumerate() {
            let current = index as u32 + 1;
            let message = format!("Sending email {}/{} to {}", current, total, email);
            self.publish(&mut record, TaskState::Processing, Progress::new(current, total, message))
                .await?;

            if !has_deliverable_shape(email) {
                warn!("Invalid email format: {}", email);
                failed_emails.push(FailedEntry {
                    email: email.clone(),
                    reason: "Invalid email format".to_string(),
                    failed_at: Utc::now(),
                });
                continue;
            }

            match self.transport.send(email, subject, body).await {
                Ok(()) => {
                    info!("Email {}/{} sent to {}", current, total, email);
                    sent_emails.push(SentEntry {
                        email: email.clone(),
                        sent_at: Utc::now(),
                    });
                }
                Err(e) => {
                    error!("Error sending email to {}: {}", email, e);
                    failed_emails.push(FailedEntry {
                        email: email.clone(),
                        reason: e.to_string(),
                        failed_at: Utc::now(),
                    });
                }
            }

            self.pause(self.delays.between_recipients_ms).await;
        }

        let result = BulkEmailResult::new(subject.to_string(), sent_emails, failed_emails);
        info!(
            "Bulk email task {} completed: {}/{} sent ({} success rate)",
            task_id,
            result.summary.sent_count,
            result.summary.total_emails,
            result.success_rate_label()
        );

        record.complete(TaskOutcome::BulkEmail(result))?;
        self.store.put(&record).await?;
        Ok(record)
    }

    async fn publish(
        &self,
        record: &mut TaskRecord,
        state: TaskState,
        progress: Progress,
    ) -> EngineResult<()> {
        record.advance(state, progress)?;
        self.store.put(record).await?;
        Ok(())
    }

    async fn fail(&self, mut record: TaskRecord, reason: String) -> EngineResult<TaskRecord> {
        record.fail(reason)?;
        self.store.put(&record).await?;
        Ok(record)
    }

    async fn pause(&self, millis: u64) {
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}
