// src/error.rs
use thiserror::Error;

/// Input errors that reject a matching request before any scoring happens.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Column '{column}' does not exist in dataset '{dataset}'")]
    UnknownColumn { dataset: String, column: String },

    #[error("Column '{column}' is declared twice in dataset '{dataset}'")]
    DuplicateColumn { dataset: String, column: String },

    #[error("Column '{column}' in dataset '{dataset}' is not numeric")]
    NonNumericColumn { dataset: String, column: String },

    #[error("Failed to fetch values for column '{column}' in dataset '{dataset}': {source}")]
    ValueFetch {
        dataset: String,
        column: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid match request: {0}")]
    InvalidRequest(String),
}

/// Errors surfaced to a feedback submitter. Learner failures are never among
/// them: once the record is stored the submission has succeeded.
#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Invalid feedback: {0}")]
    InvalidFeedback(String),

    #[error("Failed to persist feedback record: {0}")]
    Persistence(#[from] anyhow::Error),
}
