// src/errors.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GradingError {
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("API request failed with status {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Unexpected response structure: {0}")]
    UnexpectedResponse(String),

    #[error("Received empty text response from model")]
    EmptyResponse,

    #[error("Rubric '{0}' not found")]
    RubricNotFound(String),

    #[error("Batch '{0}' not found")]
    BatchNotFound(String),

    #[error("Grade '{0}' not found")]
    GradeNotFound(String),

    #[error("A batch needs at least one document")]
    EmptyBatch,

    #[error("Invalid rubric: {0}")]
    InvalidRubric(String),

    #[error("Grading job submission rejected: {0}")]
    Submission(String),

    #[error("Grading job failed: {0}")]
    JobFailed(String),

    #[error("Grading job '{job_id}' did not finish within {waited_ms}ms")]
    JobTimeout { job_id: String, waited_ms: u64 },

    #[error("Batch deadline passed before the document finished grading")]
    BatchTimeout,

    #[error("Malformed grading result: {0}")]
    MalformedResult(String),

    #[error("Failed to persist grade: {0}")]
    Persistence(String),

    #[error("Grading job '{job_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend '{0}' not found")]
    ProviderNotFound(String),
}

pub type Result<T> = std::result::Result<T, GradingError>;

/// Why a single document in a batch did not produce a grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    SubmissionError,
    JobFailed,
    JobTimeout,
    BatchTimeout,
    MalformedResultError,
    PersistenceError,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureReason::SubmissionError => "SubmissionError",
            FailureReason::JobFailed => "JobFailed",
            FailureReason::JobTimeout => "JobTimeout",
            FailureReason::BatchTimeout => "BatchTimeout",
            FailureReason::MalformedResultError => "MalformedResultError",
            FailureReason::PersistenceError => "PersistenceError",
        };
        write!(f, "{}", name)
    }
}

impl GradingError {
    /// True for errors the HTTP layer reports as 404.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GradingError::RubricNotFound(_)
                | GradingError::BatchNotFound(_)
                | GradingError::GradeNotFound(_)
        )
    }

    /// True for caller mistakes the HTTP layer reports as 400.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, GradingError::EmptyBatch | GradingError::InvalidRubric(_))
    }
}
