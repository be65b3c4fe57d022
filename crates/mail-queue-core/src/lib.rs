mod address;
mod error;
mod progress;
mod result;
mod task;

pub use address::{has_deliverable_shape, is_plausible_address, validate_address};
pub use error::{Result, TaskError, ValidationError};
pub use progress::{percent, success_rate, Progress, SINGLE_EMAIL_STEPS};
pub use result::{
    BulkEmailResult, BulkSummary, FailedEntry, SentEntry, SingleEmailResult, TaskOutcome,
};
pub use task::{EmailJob, TaskEnvelope, TaskId, TaskKind, TaskRecord, TaskState};

/// Upper bound on recipients accepted in one bulk submission.
pub const DEFAULT_MAX_BULK_RECIPIENTS: usize = 100;
