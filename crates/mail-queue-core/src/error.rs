use thiserror::Error;

/// Request shape problems caught before a task exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Email list cannot be empty")]
    EmptyRecipientList,

    #[error("Cannot send more than {max} emails at once (got {actual})")]
    TooManyRecipients { max: usize, actual: usize },

    #[error("Recipient at position {0} is blank")]
    BlankRecipient(usize),
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task in invalid state: cannot move from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Progress regressed from {previous} to {next}")]
    ProgressRegression { previous: u32, next: u32 },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TaskError>;
