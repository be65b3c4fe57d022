use crate::{validate_address, Progress, Result, TaskError, TaskOutcome, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task
pub type TaskId = Uuid;

/// Which procedure a task runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    SingleEmail,
    BulkEmail,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::SingleEmail => "single_email",
            TaskKind::BulkEmail => "bulk_email",
        }
    }
}

/// Work descriptor handed from the dispatcher to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmailJob {
    SingleEmail {
        recipient: String,
        subject: String,
        body: String,
    },
    BulkEmail {
        recipients: Vec<String>,
        subject: String,
        body: String,
    },
}

impl EmailJob {
    pub fn kind(&self) -> TaskKind {
        match self {
            EmailJob::SingleEmail { .. } => TaskKind::SingleEmail,
            EmailJob::BulkEmail { .. } => TaskKind::BulkEmail,
        }
    }

    pub fn subject(&self) -> &str {
        match self {
            EmailJob::SingleEmail { subject, .. } | EmailJob::BulkEmail { subject, .. } => subject,
        }
    }

    pub fn recipient_count(&self) -> usize {
        match self {
            EmailJob::SingleEmail { .. } => 1,
            EmailJob::BulkEmail { recipients, .. } => recipients.len(),
        }
    }

    /// Submission-time shape checks.
    ///
    /// A single recipient must be a plausible address. A bulk list must be non-empty,
    /// within `max_recipients` and free of blank entries; the syntax of each bulk
    /// address is judged per recipient while the task runs.
    pub fn validate(&self, max_recipients: usize) -> std::result::Result<(), ValidationError> {
        match self {
            EmailJob::SingleEmail { recipient, .. } => validate_address(recipient),
            EmailJob::BulkEmail { recipients, .. } => {
                if recipients.is_empty() {
                    return Err(ValidationError::EmptyRecipientList);
                }
                if recipients.len() > max_recipients {
                    return Err(ValidationError::TooManyRecipients {
                        max: max_recipients,
                        actual: recipients.len(),
                    });
                }
                if let Some(position) = recipients.iter().position(|r| r.trim().is_empty()) {
                    return Err(ValidationError::BlankRecipient(position));
                }
                Ok(())
            }
        }
    }
}

/// What the broker carries between submission and pickup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: TaskId,
    pub job: EmailJob,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskEnvelope {
    pub fn new(task_id: TaskId, job: EmailJob) -> Self {
        TaskEnvelope {
            task_id,
            job,
            enqueued_at: Utc::now(),
        }
    }
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Accepted, waiting for a worker
    Pending,
    /// Validating or preparing (single), or walking the recipient list (bulk)
    Processing,
    Connecting,
    Sending,
    Finalizing,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Processing => "PROCESSING",
            TaskState::Connecting => "CONNECTING",
            TaskState::Sending => "SENDING",
            TaskState::Finalizing => "FINALIZING",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            TaskState::Processing
                | TaskState::Connecting
                | TaskState::Sending
                | TaskState::Finalizing
        )
    }

    fn rank(&self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::Processing => 1,
            TaskState::Connecting => 2,
            TaskState::Sending => 3,
            TaskState::Finalizing => 4,
            TaskState::Completed | TaskState::Failed => 5,
        }
    }

    /// Forward-only; a running state may repeat itself for step or recipient updates.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            TaskState::Pending => false,
            TaskState::Failed => true,
            next => next.rank() >= self.rank(),
        }
    }
}

/// Stored state of one task, keyed by its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    pub state: TaskState,
    pub subject: String,
    pub recipient_count: usize,
    pub progress: Option<Progress>,
    pub result: Option<TaskOutcome>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Stamped by the record store on every write
    pub expires_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Initial record written at submission.
    pub fn pending(id: TaskId, job: &EmailJob) -> Self {
        let now = Utc::now();
        TaskRecord {
            id,
            kind: job.kind(),
            state: TaskState::Pending,
            subject: job.subject().to_string(),
            recipient_count: job.recipient_count(),
            progress: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(TaskError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(TaskError::from)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires| expires <= now)
    }

    /// Move to a running state with fresh progress.
    pub fn advance(&mut self, state: TaskState, progress: Progress) -> Result<()> {
        self.check_transition(state)?;

        if let Some(previous) = &self.progress {
            if progress.total == previous.total && progress.current < previous.current {
                return Err(TaskError::ProgressRegression {
                    previous: previous.current,
                    next: progress.current,
                });
            }
        }

        self.state = state;
        self.progress = Some(progress);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn complete(&mut self, outcome: TaskOutcome) -> Result<()> {
        self.check_transition(TaskState::Completed)?;
        self.state = TaskState::Completed;
        self.result = Some(outcome);
        self.error = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.check_transition(TaskState::Failed)?;
        self.state = TaskState::Failed;
        self.error = Some(error.into());
        self.result = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn check_transition(&self, next: TaskState) -> Result<()> {
        if self.state.can_transition_to(next) {
            Ok(())
        } else {
            Err(TaskError::InvalidTransition {
                from: self.state.as_str(),
                to: next.as_str(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SingleEmailResult, DEFAULT_MAX_BULK_RECIPIENTS};

    fn single(recipient: &str) -> EmailJob {
        EmailJob::SingleEmail {
            recipient: recipient.to_string(),
            subject: "Hi".to_string(),
            body: "Test".to_string(),
        }
    }

    fn bulk(count: usize) -> EmailJob {
        EmailJob::BulkEmail {
            recipients: (0..count).map(|i| format!("user{}@example.com", i)).collect(),
            subject: "News".to_string(),
            body: "Hello".to_string(),
        }
    }

    fn outcome() -> TaskOutcome {
        TaskOutcome::SingleEmail(SingleEmailResult {
            recipient: "a@b.com".to_string(),
            subject: "Hi".to_string(),
            sent_at: Utc::now(),
            delivery_confirmed: true,
            message: "Email sent successfully!".to_string(),
        })
    }

    #[test]
    fn test_pending_record() {
        let id = Uuid::new_v4();
        let record = TaskRecord::pending(id, &bulk(3));

        assert_eq!(record.id, id);
        assert_eq!(record.kind, TaskKind::BulkEmail);
        assert_eq!(record.state, TaskState::Pending);
        assert_eq!(record.recipient_count, 3);
        assert!(record.progress.is_none());
        assert!(record.result.is_none());
        assert!(record.error.is_none());
    }

    #[test]
    fn test_single_validation() {
        assert!(single("a@b.com").validate(DEFAULT_MAX_BULK_RECIPIENTS).is_ok());
        assert_eq!(
            single("not-an-address").validate(DEFAULT_MAX_BULK_RECIPIENTS),
            Err(ValidationError::InvalidAddress("not-an-address".to_string()))
        );
    }

    #[test]
    fn test_bulk_validation_limits() {
        assert_eq!(bulk(0).validate(100), Err(ValidationError::EmptyRecipientList));
        assert!(bulk(100).validate(100).is_ok());
        assert_eq!(
            bulk(101).validate(100),
            Err(ValidationError::TooManyRecipients { max: 100, actual: 101 })
        );
    }

    #[test]
    fn test_bulk_validation_defers_address_syntax() {
        let job = EmailJob::BulkEmail {
            recipients: vec!["good@x.com".to_string(), "bad-address".to_string()],
            subject: "Hi".to_string(),
            body: "Test".to_string(),
        };
        assert!(job.validate(100).is_ok());

        let blank = EmailJob::BulkEmail {
            recipients: vec!["good@x.com".to_string(), "  ".to_string()],
            subject: "Hi".to_string(),
            body: "Test".to_string(),
        };
        assert_eq!(blank.validate(100), Err(ValidationError::BlankRecipient(1)));
    }

    #[test]
    fn test_forward_transitions() {
        let mut record = TaskRecord::pending(Uuid::new_v4(), &single("a@b.com"));

        record.advance(TaskState::Processing, Progress::step(1, "Validating")).unwrap();
        record.advance(TaskState::Processing, Progress::step(2, "Preparing")).unwrap();
        record.advance(TaskState::Connecting, Progress::step(3, "Connecting")).unwrap();
        record.advance(TaskState::Sending, Progress::step(4, "Sending")).unwrap();
        record.advance(TaskState::Finalizing, Progress::step(5, "Verifying")).unwrap();
        record.complete(outcome()).unwrap();

        assert_eq!(record.state, TaskState::Completed);
        assert!(record.result.is_some());
        assert!(record.error.is_none());
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut record = TaskRecord::pending(Uuid::new_v4(), &single("a@b.com"));
        record.advance(TaskState::Sending, Progress::step(4, "Sending")).unwrap();

        let err = record
            .advance(TaskState::Connecting, Progress::step(3, "Connecting"))
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidTransition { from: "SENDING", to: "CONNECTING" }));
    }

    #[test]
    fn test_progress_regression_rejected() {
        let mut record = TaskRecord::pending(Uuid::new_v4(), &bulk(4));
        record.advance(TaskState::Processing, Progress::new(3, 4, "third")).unwrap();

        let err = record
            .advance(TaskState::Processing, Progress::new(2, 4, "second"))
            .unwrap_err();
        assert!(matches!(err, TaskError::ProgressRegression { previous: 3, next: 2 }));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut record = TaskRecord::pending(Uuid::new_v4(), &single("a@b.com"));
        record.fail("Invalid email address").unwrap();

        assert_eq!(record.error.as_deref(), Some("Invalid email address"));
        assert!(record.complete(outcome()).is_err());
        assert!(record.fail("again").is_err());
        assert!(record
            .advance(TaskState::Processing, Progress::step(1, "Validating"))
            .is_err());
    }

    #[test]
    fn test_record_bytes() {
        let mut record = TaskRecord::pending(Uuid::new_v4(), &single("a@b.com"));
        record.advance(TaskState::Processing, Progress::step(1, "Validating")).unwrap();

        let bytes = record.to_bytes().unwrap();
        let decoded = TaskRecord::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_expiry() {
        let mut record = TaskRecord::pending(Uuid::new_v4(), &single("a@b.com"));
        let now = Utc::now();
        assert!(!record.is_expired(now));

        record.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(record.is_expired(now));
    }
}
